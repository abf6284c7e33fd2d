use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(\d{1,2}):(\d{2})(?::(\d{2})(?:\.(\d{1,9}))?)?(am|pm)?$")
        .expect("time regex")
});

static ORDINAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(\d{1,2})(st|nd|rd|th)$").expect("ordinal regex"));

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Meridiem {
    Am,
    Pm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DatePart {
    Number { value: u32, digits: usize },
    Month(u32),
}

#[derive(Debug, Clone, Copy, Default)]
struct TimeOfDay {
    hour: u32,
    minute: u32,
    second: u32,
    nanos: u32,
}

/// Parses the free-form order timestamps found in the sales exports, e.g.
/// `09:19:51 P.M., 12-Dec-2024`, `15-December-2024, 08:44:59 P.M.` or
/// `04:49:37 P.M.,03/11/25`.
///
/// Parsing is permissive first: date and time may come in any order, months
/// may be names or numbers and unknown words are skipped. Strings the
/// permissive pass rejects get one strict ISO-8601 attempt.
#[derive(Debug, Clone)]
pub struct TimestampParser {
    reference_year: i32,
}

impl TimestampParser {
    pub fn new() -> Self {
        Self::with_reference_year(Utc::now().year())
    }

    /// Two-digit years resolve into `[reference_year - 50, reference_year + 49]`.
    pub fn with_reference_year(reference_year: i32) -> Self {
        TimestampParser { reference_year }
    }

    pub fn parse(&self, raw: &str) -> Option<NaiveDateTime> {
        let text = clean_timestamp_text(raw);
        if text.is_empty() {
            return None;
        }

        self.parse_permissive(&text).or_else(|| parse_iso(&text))
    }

    fn parse_permissive(&self, text: &str) -> Option<NaiveDateTime> {
        let mut parts: Vec<DatePart> = Vec::new();
        let mut time: Option<TimeOfDay> = None;
        let mut meridiem: Option<Meridiem> = None;

        for token in text.split_whitespace() {
            if token.contains(':') {
                // A second clock reading is ambiguous
                if time.is_some() {
                    return None;
                }
                let caps = TIME_RE.captures(token)?;
                time = Some(TimeOfDay {
                    hour: caps[1].parse().ok()?,
                    minute: caps[2].parse().ok()?,
                    second: caps.get(3).map_or(Ok(0), |m| m.as_str().parse()).ok()?,
                    nanos: caps.get(4).map_or(Some(0), |m| fraction_to_nanos(m.as_str()))?,
                });
                if let Some(m) = caps.get(5) {
                    meridiem = parse_meridiem(m.as_str());
                }
                continue;
            }

            if let Some(m) = parse_meridiem(token) {
                meridiem = Some(m);
                continue;
            }

            // Timezone offsets such as +0100 carry no date information
            if token.starts_with('+') || token.starts_with('-') {
                continue;
            }

            let pieces: Vec<&str> = token
                .split(['-', '/', '.'])
                .filter(|p| !p.is_empty())
                .collect();

            for piece in &pieces {
                if piece.chars().all(|c| c.is_ascii_digit()) {
                    if piece.len() == 8 && pieces.len() == 1 {
                        // Compact YYYYMMDD
                        parts.push(number_part(&piece[0..4])?);
                        parts.push(number_part(&piece[4..6])?);
                        parts.push(number_part(&piece[6..8])?);
                    } else if piece.len() > 4 {
                        return None;
                    } else {
                        parts.push(number_part(piece)?);
                    }
                } else if let Some(month) = month_from_name(piece) {
                    parts.push(DatePart::Month(month));
                } else if let Some(caps) = ORDINAL_RE.captures(piece) {
                    parts.push(number_part(&caps[1])?);
                }
                // Anything else (weekdays, "at", zone names) is noise
            }
        }

        let date = self.resolve_date(&parts)?;
        let time = time.unwrap_or_default();
        let hour = apply_meridiem(time.hour, meridiem)?;
        let time_of_day = NaiveTime::from_hms_nano_opt(hour, time.minute, time.second, time.nanos)?;

        Some(date.and_time(time_of_day))
    }

    fn resolve_date(&self, parts: &[DatePart]) -> Option<NaiveDate> {
        let months: Vec<u32> = parts
            .iter()
            .filter_map(|p| match p {
                DatePart::Month(m) => Some(*m),
                _ => None,
            })
            .collect();
        let numbers: Vec<(u32, usize)> = parts
            .iter()
            .filter_map(|p| match p {
                DatePart::Number { value, digits } => Some((*value, *digits)),
                _ => None,
            })
            .collect();

        let (year, month, day) = match months.as_slice() {
            [month] => {
                if numbers.len() != 2 {
                    return None;
                }
                let year_idx = numbers.iter().position(|&(v, d)| looks_like_year(v, d));
                match year_idx {
                    Some(i) => (self.expand_year(numbers[i]), *month, numbers[1 - i].0),
                    None => (self.expand_year(numbers[1]), *month, numbers[0].0),
                }
            }
            [] => {
                let [a, b, c] = numbers.as_slice() else {
                    return None;
                };
                if looks_like_year(a.0, a.1) {
                    // Y-M-D unless only Y-D-M yields a valid month
                    if b.0 > 12 && c.0 <= 12 {
                        (self.expand_year(*a), c.0, b.0)
                    } else {
                        (self.expand_year(*a), b.0, c.0)
                    }
                } else if a.0 > 12 {
                    (self.expand_year(*c), b.0, a.0)
                } else {
                    (self.expand_year(*c), a.0, b.0)
                }
            }
            _ => return None,
        };

        NaiveDate::from_ymd_opt(year, month, day)
    }

    fn expand_year(&self, (value, digits): (u32, usize)) -> i32 {
        let value = value as i32;
        if digits > 2 {
            return value;
        }

        let century = self.reference_year - self.reference_year.rem_euclid(100);
        let mut year = century + value;
        if year > self.reference_year + 49 {
            year -= 100;
        } else if year < self.reference_year - 50 {
            year += 100;
        }
        year
    }
}

impl Default for TimestampParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Unify AM/PM markers, turn `;` and `,` into spaces and collapse runs of
/// whitespace.
pub fn clean_timestamp_text(raw: &str) -> String {
    let unified = raw
        .replace("A.M.", "AM")
        .replace("P.M.", "PM")
        .replace("a.m.", "AM")
        .replace("p.m.", "PM")
        .replace("Am", "AM")
        .replace("Pm", "PM")
        .replace([';', ','], " ");

    unified.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_iso(text: &str) -> Option<NaiveDateTime> {
    let iso = text.replace(' ', "T");

    if let Ok(dt) = DateTime::parse_from_rfc3339(&iso) {
        return Some(dt.naive_local());
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&iso, format) {
            return Some(dt);
        }
    }

    NaiveDate::parse_from_str(&iso, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn number_part(digits: &str) -> Option<DatePart> {
    Some(DatePart::Number {
        value: digits.parse().ok()?,
        digits: digits.len(),
    })
}

fn looks_like_year(value: u32, digits: usize) -> bool {
    digits >= 3 || value > 31
}

fn parse_meridiem(token: &str) -> Option<Meridiem> {
    match token.to_ascii_lowercase().as_str() {
        "am" => Some(Meridiem::Am),
        "pm" => Some(Meridiem::Pm),
        _ => None,
    }
}

fn apply_meridiem(hour: u32, meridiem: Option<Meridiem>) -> Option<u32> {
    match meridiem {
        None => Some(hour),
        Some(_) if hour > 12 => None,
        Some(Meridiem::Am) => Some(hour % 12),
        Some(Meridiem::Pm) => Some(hour % 12 + 12),
    }
}

fn month_from_name(token: &str) -> Option<u32> {
    let lower = token.to_ascii_lowercase();
    if lower.len() < 3 || !lower.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    if lower == "sept" {
        return Some(9);
    }

    MONTHS
        .iter()
        .position(|name| *name == lower || (lower.len() == 3 && name.starts_with(&lower)))
        .map(|idx| idx as u32 + 1)
}

fn fraction_to_nanos(fraction: &str) -> Option<u32> {
    let padded = format!("{:0<9}", fraction);
    padded[..9].parse().ok()
}
