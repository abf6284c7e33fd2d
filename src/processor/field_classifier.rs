use anyhow::Result;
use polars::prelude::*;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Which source table a frame came from. Decides how ambiguous names such
/// as `id` are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Orders,
    Users,
    Books,
}

pub struct FieldClassifier {
    field_mappings: HashMap<String, String>,
}

/// Trim, lowercase, spaces and hyphens to `_`, colons removed.
pub fn standardize_column_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .replace(' ', "_")
        .replace('-', "_")
        .replace(':', "")
}

impl FieldClassifier {
    pub fn for_table(kind: TableKind) -> Self {
        let mut field_mappings = HashMap::new();

        match kind {
            TableKind::Orders => {
                field_mappings.insert("id".to_string(), "order_id".to_string());
            }
            TableKind::Users => {
                field_mappings.insert("id".to_string(), "user_id".to_string());
                field_mappings.insert("id_user".to_string(), "user_id".to_string());
            }
            TableKind::Books => {
                field_mappings.insert("id".to_string(), "book_id".to_string());
                field_mappings.insert("id_book".to_string(), "book_id".to_string());
            }
        }

        FieldClassifier { field_mappings }
    }

    pub fn classify_field(&self, field_name: &str) -> String {
        let standardized = standardize_column_name(field_name);

        match self.field_mappings.get(&standardized) {
            Some(canonical) => canonical.clone(),
            None => standardized,
        }
    }

    pub fn map_to_canonical_schema(&self, df: &mut DataFrame) -> Result<()> {
        let column_names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();

        for col_name in column_names {
            let canonical_name = self.classify_field(&col_name);
            if canonical_name == col_name {
                continue;
            }

            // Two source columns can collapse onto one name; keep the first
            if df.column(&canonical_name).is_ok() {
                warn!(
                    "Column '{}' maps to existing column '{}', keeping original name",
                    col_name, canonical_name
                );
                continue;
            }

            debug!("Renaming column '{}' -> '{}'", col_name, canonical_name);
            df.rename(&col_name, canonical_name.into())?;
        }

        Ok(())
    }
}
