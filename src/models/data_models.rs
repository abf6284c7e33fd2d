use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Source columns without a typed slot, kept as text in source column order.
pub type Metadata = Vec<(String, String)>;

/// A cleaned order row. Only rows with a parsed timestamp, quantity and
/// unit price survive normalization, so the pricing and date fields are
/// never null here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: Option<String>,
    pub user_id: Option<String>,
    pub book_id: Option<String>,
    pub quantity: i64,
    pub unit_price: f64,
    pub timestamp: NaiveDateTime,
    pub paid_price: f64,
    pub date: NaiveDate,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub source_file: String,
    pub extra: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookRecord {
    pub book_id: Option<String>,
    pub author: Option<String>,
    pub extra: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub extra: Metadata,
}

/// One order with its user identity and book author attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedRecord {
    pub order: OrderRecord,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub author: Option<String>,
    pub user_extra: Metadata,
    pub book_extra: Metadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderTable {
    pub records: Vec<OrderRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserTable {
    pub records: Vec<UserRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookTable {
    pub records: Vec<BookRecord>,
    pub has_author_column: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergedTable {
    pub records: Vec<MergedRecord>,
    pub has_author_column: bool,
}

macro_rules! impl_table_len {
    ($($table:ty),*) => {
        $(
            impl $table {
                pub fn len(&self) -> usize {
                    self.records.len()
                }

                pub fn is_empty(&self) -> bool {
                    self.records.is_empty()
                }
            }
        )*
    };
}

impl_table_len!(OrderTable, UserTable, BookTable, MergedTable);

/// Row counts from one order normalization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizationReport {
    pub rows_in: usize,
    pub duplicates: usize,
    pub missing_timestamp: usize,
    pub missing_quantity: usize,
    pub missing_unit_price: usize,
    pub rows_out: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRevenue {
    pub date: NaiveDate,
    pub revenue: f64,
}

/// A ranked day. `revenue` is a display string (`1,234.56`) and is never
/// used for arithmetic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopDay {
    pub rank: usize,
    pub date: NaiveDate,
    pub revenue: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub daily_revenue: Vec<DailyRevenue>,
    pub top5_days: Vec<TopDay>,
    pub unique_users: usize,
    pub unique_author_sets: usize,
    pub most_popular_author_set: String,
    pub best_buyer_aliases: Vec<String>,
}

/// Everything produced for one dataset folder.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DatasetResults {
    pub dataset: String,
    pub orders: OrderTable,
    pub order_report: NormalizationReport,
    pub books: BookTable,
    pub users: UserTable,
    pub merged: MergedTable,
    /// `None` when any input table was empty and analytics were skipped.
    pub analysis: Option<AnalysisResult>,
}
