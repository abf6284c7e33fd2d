use anyhow::Result;
use chrono::{Datelike, NaiveDateTime};
use once_cell::sync::Lazy;
use polars::prelude::*;
use regex::Regex;
use std::collections::HashSet;
use tracing::{info, warn};

use super::timestamp_parser::TimestampParser;
use crate::models::{
    BookRecord, BookTable, Metadata, NormalizationReport, OrderRecord, OrderTable, UserRecord,
    UserTable,
};

static DIGIT_GROUPS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("digit group regex"));
static NON_NUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^0-9.\-]").expect("non numeric regex"));

const NULL_MARKERS: [&str; 4] = ["", "nan", "none", "null"];

/// Typed order columns before null filtering.
#[derive(Debug)]
struct RawOrder {
    order_id: Option<String>,
    user_id: Option<String>,
    book_id: Option<String>,
    quantity: Option<i64>,
    unit_price: Option<f64>,
    timestamp: Option<NaiveDateTime>,
    source_file: String,
    extra: Metadata,
}

/// Equality key for exact-duplicate detection; prices compare bitwise.
#[derive(PartialEq, Eq, Hash)]
struct OrderKey {
    ids: [Option<String>; 3],
    quantity: Option<i64>,
    unit_price: Option<u64>,
    timestamp: Option<NaiveDateTime>,
    source_file: String,
    extra: Metadata,
}

impl RawOrder {
    fn key(&self) -> OrderKey {
        OrderKey {
            ids: [
                self.order_id.clone(),
                self.user_id.clone(),
                self.book_id.clone(),
            ],
            quantity: self.quantity,
            unit_price: self.unit_price.map(f64::to_bits),
            timestamp: self.timestamp,
            source_file: self.source_file.clone(),
            extra: self.extra.clone(),
        }
    }
}

/// A frame with every column cast to text, columns taken out by name.
struct TextFrame {
    height: usize,
    columns: Vec<(String, Vec<Option<String>>)>,
}

impl TextFrame {
    fn from_dataframe(df: &DataFrame) -> Result<Self> {
        let mut columns = Vec::with_capacity(df.width());

        for column in df.get_columns() {
            let name = column.name().to_string();
            let as_text = match column.cast(&DataType::String) {
                Ok(c) => c,
                Err(e) => {
                    warn!("Skipping column '{}' that cannot be read as text: {}", name, e);
                    continue;
                }
            };

            let values: Vec<Option<String>> = as_text
                .str()?
                .into_iter()
                .map(|v| v.map(|s| s.to_string()))
                .collect();
            columns.push((name, values));
        }

        Ok(TextFrame {
            height: df.height(),
            columns,
        })
    }

    fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|(n, _)| n == name)
    }

    fn take(&mut self, name: &str) -> Vec<Option<String>> {
        match self.columns.iter().position(|(n, _)| n == name) {
            Some(idx) => self.columns.remove(idx).1,
            None => vec![None; self.height],
        }
    }

    /// Remaining non-null cells of a row, in column order.
    fn metadata(&self, row: usize) -> Metadata {
        self.columns
            .iter()
            .filter_map(|(name, values)| {
                values[row].as_ref().map(|v| (name.clone(), v.clone()))
            })
            .collect()
    }
}

pub fn is_null_marker(value: &str) -> bool {
    NULL_MARKERS.contains(&value.trim().to_lowercase().as_str())
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Trimmed identifier text; integral numbers lose any `.0` so ids read as
/// floats, integers or strings compare equal.
pub fn normalize_id(raw: Option<&str>) -> Option<String> {
    let text = raw?.trim();
    if is_null_marker(text) {
        return None;
    }

    let integral = text.strip_suffix(".0").unwrap_or(text);
    match integral.parse::<i64>() {
        Ok(v) => Some(v.to_string()),
        Err(_) => Some(text.to_string()),
    }
}

/// Non-negative whole quantities; `"3.0"` is accepted as 3.
pub fn clean_quantity(raw: Option<&str>) -> Option<i64> {
    let text = raw?.trim();

    if let Ok(v) = text.parse::<i64>() {
        return (v >= 0).then_some(v);
    }

    let v: f64 = text.parse().ok()?;
    if v.is_finite() && v.fract() == 0.0 && v >= 0.0 {
        Some(v as i64)
    } else {
        None
    }
}

pub struct RuleNormalizer {
    eur_to_usd: f64,
    timestamps: TimestampParser,
}

impl RuleNormalizer {
    pub fn new(eur_to_usd: f64) -> Self {
        RuleNormalizer {
            eur_to_usd,
            timestamps: TimestampParser::new(),
        }
    }

    pub fn with_timestamp_parser(mut self, timestamps: TimestampParser) -> Self {
        self.timestamps = timestamps;
        self
    }

    /// Clean a free-form price cell into USD with 2 decimals.
    ///
    /// A `€` sign or `eur` anywhere marks the value as EUR. Strings with two
    /// or more digit groups are read as cents notation (`"50¢50"` is 50.50,
    /// `"22$75¢"` is 22.75); otherwise every character except digits,
    /// `,`, `.` and `-` is stripped and `,` is the decimal separator.
    ///
    /// Cents notation keeps the last two digits of the second group, so
    /// `"19.999"` is 19.99 and `"1,234.56"` is 1.34. Negative and
    /// unparsable values are `None`, never zero.
    pub fn clean_price(&self, raw: Option<&str>) -> Option<f64> {
        let raw = raw?.trim();
        if is_null_marker(raw) {
            return None;
        }

        let is_eur = raw.contains('€') || raw.to_lowercase().contains("eur");

        let matches: Vec<regex::Match> = DIGIT_GROUPS.find_iter(raw).collect();
        if let Some(first) = matches.first() {
            if raw[..first.start()].contains('-') {
                return None;
            }
        }

        let groups: Vec<&str> = matches.iter().map(|m| m.as_str()).collect();
        let numeric = if groups.len() >= 2 {
            let minor = groups[1];
            let minor = if minor.len() <= 2 {
                minor
            } else {
                &minor[minor.len() - 2..]
            };
            format!("{}.{}", groups[0], minor)
        } else {
            let text = raw.replace(',', ".");
            NON_NUMERIC
                .replace_all(&text, "")
                .trim_end_matches('.')
                .to_string()
        };

        if numeric.is_empty() || numeric == "." {
            return None;
        }

        let value: f64 = numeric.parse().ok()?;
        if !value.is_finite() || value < 0.0 {
            return None;
        }

        let usd = if is_eur { value * self.eur_to_usd } else { value };
        Some(round2(usd))
    }

    pub fn parse_timestamp(&self, raw: Option<&str>) -> Option<NaiveDateTime> {
        self.timestamps.parse(raw?)
    }

    /// Type, filter and enrich an order frame whose columns already carry
    /// canonical names.
    ///
    /// Exact duplicates and rows missing a timestamp, quantity or unit price
    /// are removed before `paid_price` and the date parts are derived.
    pub fn normalize_orders(
        &self,
        df: &DataFrame,
        source_file: &str,
    ) -> Result<(OrderTable, NormalizationReport)> {
        let mut report = NormalizationReport {
            rows_in: df.height(),
            ..Default::default()
        };

        if df.height() == 0 {
            return Ok((OrderTable::default(), report));
        }

        let mut frame = TextFrame::from_dataframe(df)?;
        for required in ["quantity", "unit_price", "timestamp"] {
            if !frame.has_column(required) {
                warn!("Orders from {} have no '{}' column", source_file, required);
            }
        }

        let order_ids = frame.take("order_id");
        let user_ids = frame.take("user_id");
        let book_ids = frame.take("book_id");
        let quantities = frame.take("quantity");
        let prices = frame.take("unit_price");
        let timestamps = frame.take("timestamp");
        let sources = frame.take("source_file");

        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(frame.height);

        for row in 0..frame.height {
            let raw = RawOrder {
                order_id: normalize_id(order_ids[row].as_deref()),
                user_id: normalize_id(user_ids[row].as_deref()),
                book_id: normalize_id(book_ids[row].as_deref()),
                quantity: clean_quantity(quantities[row].as_deref()),
                unit_price: self.clean_price(prices[row].as_deref()),
                timestamp: self.parse_timestamp(timestamps[row].as_deref()),
                source_file: sources[row]
                    .clone()
                    .unwrap_or_else(|| source_file.to_string()),
                extra: frame.metadata(row),
            };

            if !seen.insert(raw.key()) {
                report.duplicates += 1;
                continue;
            }

            let (Some(timestamp), Some(quantity), Some(unit_price)) =
                (raw.timestamp, raw.quantity, raw.unit_price)
            else {
                if raw.timestamp.is_none() {
                    report.missing_timestamp += 1;
                } else if raw.quantity.is_none() {
                    report.missing_quantity += 1;
                } else {
                    report.missing_unit_price += 1;
                }
                continue;
            };

            let date = timestamp.date();
            records.push(OrderRecord {
                order_id: raw.order_id,
                user_id: raw.user_id,
                book_id: raw.book_id,
                quantity,
                unit_price,
                timestamp,
                paid_price: round2(quantity as f64 * unit_price),
                date,
                year: date.year(),
                month: date.month(),
                day: date.day(),
                source_file: raw.source_file,
                extra: raw.extra,
            });
        }

        report.rows_out = records.len();
        info!(
            "Normalized orders from {}: {} in, {} duplicates, {} bad timestamps, {} bad quantities, {} bad prices, {} kept",
            source_file,
            report.rows_in,
            report.duplicates,
            report.missing_timestamp,
            report.missing_quantity,
            report.missing_unit_price,
            report.rows_out
        );

        Ok((OrderTable { records }, report))
    }

    pub fn normalize_users(&self, df: &DataFrame) -> Result<UserTable> {
        let mut frame = TextFrame::from_dataframe(df)?;

        let user_ids = frame.take("user_id");
        let names = frame.take("name");
        let emails = frame.take("email");
        let phones = frame.take("phone");
        let addresses = frame.take("address");

        let records = (0..frame.height)
            .map(|row| UserRecord {
                user_id: normalize_id(user_ids[row].as_deref()),
                name: names[row].clone(),
                email: emails[row].clone(),
                phone: phones[row].clone(),
                address: addresses[row].clone(),
                extra: frame.metadata(row),
            })
            .collect();

        Ok(UserTable { records })
    }

    pub fn normalize_books(&self, df: &DataFrame) -> Result<BookTable> {
        let mut frame = TextFrame::from_dataframe(df)?;
        let has_author_column = frame.has_column("author");

        let book_ids = frame.take("book_id");
        let authors = frame.take("author");

        let records = (0..frame.height)
            .map(|row| BookRecord {
                book_id: normalize_id(book_ids[row].as_deref()),
                author: authors[row].clone(),
                extra: frame.metadata(row),
            })
            .collect();

        Ok(BookTable {
            records,
            has_author_column,
        })
    }
}
