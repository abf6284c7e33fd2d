use anyhow::{Result, anyhow};
use polars::prelude::*;

use super::data_models::*;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn text_column(name: &str, values: Vec<Option<String>>) -> Column {
    Series::new(name.into(), values).into()
}

/// Spreads per-row metadata into one text column per key, keys in
/// first-seen order. Rows lacking a key get a null.
fn metadata_columns<'a>(rows: impl Iterator<Item = &'a Metadata> + Clone, prefix: &str) -> Vec<Column> {
    let mut keys: Vec<&str> = Vec::new();
    for row in rows.clone() {
        for (key, _) in row {
            if !keys.contains(&key.as_str()) {
                keys.push(key.as_str());
            }
        }
    }

    keys.into_iter()
        .map(|key| {
            let values = rows
                .clone()
                .map(|row| {
                    row.iter()
                        .find(|(k, _)| k.as_str() == key)
                        .map(|(_, v)| v.clone())
                })
                .collect();
            text_column(&format!("{}{}", prefix, key), values)
        })
        .collect()
}

fn order_columns(orders: &[&OrderRecord]) -> Vec<Column> {
    vec![
        text_column("order_id", orders.iter().map(|o| o.order_id.clone()).collect()),
        text_column("user_id", orders.iter().map(|o| o.user_id.clone()).collect()),
        text_column("book_id", orders.iter().map(|o| o.book_id.clone()).collect()),
        Series::new("quantity".into(), orders.iter().map(|o| o.quantity).collect::<Vec<i64>>()).into(),
        Series::new("unit_price".into(), orders.iter().map(|o| o.unit_price).collect::<Vec<f64>>()).into(),
        text_column(
            "timestamp",
            orders
                .iter()
                .map(|o| Some(o.timestamp.format(TIMESTAMP_FORMAT).to_string()))
                .collect(),
        ),
        Series::new("paid_price".into(), orders.iter().map(|o| o.paid_price).collect::<Vec<f64>>()).into(),
        text_column(
            "date",
            orders
                .iter()
                .map(|o| Some(o.date.format(DATE_FORMAT).to_string()))
                .collect(),
        ),
        Series::new("year".into(), orders.iter().map(|o| o.year).collect::<Vec<i32>>()).into(),
        Series::new("month".into(), orders.iter().map(|o| o.month).collect::<Vec<u32>>()).into(),
        Series::new("day".into(), orders.iter().map(|o| o.day).collect::<Vec<u32>>()).into(),
        text_column(
            "source_file",
            orders.iter().map(|o| Some(o.source_file.clone())).collect(),
        ),
    ]
}

fn build(columns: Vec<Column>) -> Result<DataFrame> {
    DataFrame::new(columns).map_err(|e| anyhow!("Failed to create DataFrame: {}", e))
}

impl OrderTable {
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        if self.is_empty() {
            return Ok(DataFrame::empty());
        }

        let orders: Vec<&OrderRecord> = self.records.iter().collect();
        let mut columns = order_columns(&orders);
        columns.extend(metadata_columns(self.records.iter().map(|o| &o.extra), ""));
        build(columns)
    }
}

impl UserTable {
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        if self.is_empty() {
            return Ok(DataFrame::empty());
        }

        let users = &self.records;
        let mut columns = vec![
            text_column("user_id", users.iter().map(|u| u.user_id.clone()).collect()),
            text_column("name", users.iter().map(|u| u.name.clone()).collect()),
            text_column("email", users.iter().map(|u| u.email.clone()).collect()),
            text_column("phone", users.iter().map(|u| u.phone.clone()).collect()),
            text_column("address", users.iter().map(|u| u.address.clone()).collect()),
        ];
        columns.extend(metadata_columns(users.iter().map(|u| &u.extra), ""));
        build(columns)
    }
}

impl BookTable {
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        if self.is_empty() {
            return Ok(DataFrame::empty());
        }

        let books = &self.records;
        let mut columns = vec![text_column(
            "book_id",
            books.iter().map(|b| b.book_id.clone()).collect(),
        )];
        if self.has_author_column {
            columns.push(text_column(
                "author",
                books.iter().map(|b| b.author.clone()).collect(),
            ));
        }
        columns.extend(metadata_columns(books.iter().map(|b| &b.extra), ""));
        build(columns)
    }
}

impl MergedTable {
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        if self.is_empty() {
            return Ok(DataFrame::empty());
        }

        let rows = &self.records;
        let orders: Vec<&OrderRecord> = rows.iter().map(|r| &r.order).collect();
        let mut columns = order_columns(&orders);
        columns.extend(metadata_columns(rows.iter().map(|r| &r.order.extra), ""));
        columns.extend([
            text_column("name", rows.iter().map(|r| r.name.clone()).collect()),
            text_column("email", rows.iter().map(|r| r.email.clone()).collect()),
            text_column("phone", rows.iter().map(|r| r.phone.clone()).collect()),
            text_column("address", rows.iter().map(|r| r.address.clone()).collect()),
        ]);
        columns.extend(metadata_columns(rows.iter().map(|r| &r.user_extra), "user_"));
        if self.has_author_column {
            columns.push(text_column(
                "author",
                rows.iter().map(|r| r.author.clone()).collect(),
            ));
        }
        columns.extend(metadata_columns(rows.iter().map(|r| &r.book_extra), "book_"));
        build(columns)
    }
}

impl AnalysisResult {
    /// Daily revenue as a `date`/`revenue` frame, ascending by date.
    pub fn daily_revenue_frame(&self) -> Result<DataFrame> {
        let dates: Vec<String> = self
            .daily_revenue
            .iter()
            .map(|d| d.date.format(DATE_FORMAT).to_string())
            .collect();
        let revenue: Vec<f64> = self.daily_revenue.iter().map(|d| d.revenue).collect();

        build(vec![
            Series::new("date".into(), dates).into(),
            Series::new("revenue".into(), revenue).into(),
        ])
    }

    /// Top days as a `rank`/`date`/`revenue` frame with display strings.
    pub fn top5_days_frame(&self) -> Result<DataFrame> {
        let ranks: Vec<u32> = self.top5_days.iter().map(|d| d.rank as u32).collect();
        let dates: Vec<String> = self
            .top5_days
            .iter()
            .map(|d| d.date.format(DATE_FORMAT).to_string())
            .collect();
        let revenue: Vec<String> = self.top5_days.iter().map(|d| d.revenue.clone()).collect();

        build(vec![
            Series::new("rank".into(), ranks).into(),
            Series::new("date".into(), dates).into(),
            Series::new("revenue".into(), revenue).into(),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_order(with_genre: bool) -> MergedRecord {
        let timestamp = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let mut book_extra = vec![("title".to_string(), "Dune".to_string())];
        if with_genre {
            book_extra.push(("genre".to_string(), "sf".to_string()));
        }

        MergedRecord {
            order: OrderRecord {
                order_id: Some("1".to_string()),
                user_id: Some("7".to_string()),
                book_id: Some("3".to_string()),
                quantity: 2,
                unit_price: 5.5,
                timestamp,
                paid_price: 11.0,
                date: timestamp.date(),
                year: 2024,
                month: 1,
                day: 1,
                source_file: "orders.parquet".to_string(),
                extra: vec![("shipping".to_string(), "express".to_string())],
            },
            name: Some("Ann".to_string()),
            email: None,
            phone: None,
            address: None,
            author: Some("Herbert".to_string()),
            user_extra: Vec::new(),
            book_extra,
        }
    }

    #[test]
    fn test_merged_frame_columns() {
        let table = MergedTable {
            records: vec![sample_order(false), sample_order(true)],
            has_author_column: true,
        };

        let df = table.to_dataframe().unwrap();
        assert_eq!(df.height(), 2);

        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(names.contains(&"paid_price".to_string()));
        assert!(names.contains(&"shipping".to_string()));
        assert!(names.contains(&"book_title".to_string()));
        assert!(names.contains(&"book_genre".to_string()));
        assert!(names.contains(&"author".to_string()));

        // The first row has no genre
        let genre = df.column("book_genre").unwrap().str().unwrap();
        assert_eq!(genre.get(0), None);
        assert_eq!(genre.get(1), Some("sf"));
    }

    #[test]
    fn test_empty_table_frame() {
        let df = OrderTable::default().to_dataframe().unwrap();
        assert_eq!(df.height(), 0);
    }
}
