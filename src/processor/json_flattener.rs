use anyhow::{Result, anyhow};
use polars::prelude::*;
use serde_json::Value;
use tracing::{info, warn};

/// Flattens hierarchical documents (the book catalogues ship as YAML or
/// JSON) into a text frame, one row per document.
pub struct JsonFlattener;

impl JsonFlattener {
    pub fn new() -> Self {
        JsonFlattener
    }

    /// Pick the record list out of a parsed document: either a top-level
    /// sequence, a mapping whose only value is a sequence, or a single
    /// mapping treated as one record.
    pub fn documents(&self, root: Value) -> Result<Vec<Value>> {
        match root {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => Ok(items),
            Value::Object(mut map) => {
                if map.len() == 1 && map.values().all(Value::is_array) {
                    if let Some(Value::Array(items)) = map.values_mut().next().map(Value::take) {
                        return Ok(items);
                    }
                }
                Ok(vec![Value::Object(map)])
            }
            other => Err(anyhow!(
                "Expected a list of records, found a scalar document: {}",
                other
            )),
        }
    }

    pub fn flatten_to_dataframe(&self, items: &[Value]) -> Result<DataFrame> {
        let mut records = Vec::with_capacity(items.len());
        let mut failed_count = 0;

        for (index, item) in items.iter().enumerate() {
            match self.flatten_record(item) {
                Ok(record) => records.push(record),
                Err(e) => {
                    failed_count += 1;
                    warn!("Skipping record at index {}: {}", index, e);
                }
            }
        }

        info!(
            "Flattened {} records, {} skipped out of {} total",
            records.len(),
            failed_count,
            items.len()
        );

        self.records_to_dataframe(records)
    }

    /// Nested mappings become `parent.child` keys. Arrays of scalars are
    /// joined with `", "`, other arrays are kept as JSON text and nulls are
    /// left out.
    pub fn flatten_record(&self, item: &Value) -> Result<Vec<(String, String)>> {
        let Value::Object(map) = item else {
            return Err(anyhow!("record is not a mapping"));
        };

        let mut record = Vec::new();
        for (key, value) in map {
            flatten_into(key, value, &mut record);
        }
        Ok(record)
    }

    fn records_to_dataframe(&self, records: Vec<Vec<(String, String)>>) -> Result<DataFrame> {
        if records.is_empty() {
            return Ok(DataFrame::empty());
        }

        let mut fields: Vec<&str> = Vec::new();
        for record in &records {
            for (key, _) in record {
                if !fields.contains(&key.as_str()) {
                    fields.push(key.as_str());
                }
            }
        }

        let mut series_vec = Vec::with_capacity(fields.len());
        for field in fields.iter() {
            let values: Vec<Option<String>> = records
                .iter()
                .map(|record| {
                    record
                        .iter()
                        .find(|(k, _)| k.as_str() == *field)
                        .map(|(_, v)| v.clone())
                })
                .collect();

            let series = Series::new((*field).into(), values);
            series_vec.push(series.into());
        }

        DataFrame::new(series_vec).map_err(|e| anyhow!("Failed to create DataFrame: {}", e))
    }
}

impl Default for JsonFlattener {
    fn default() -> Self {
        Self::new()
    }
}

fn flatten_into(key: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Null => {}
        Value::Object(map) => {
            for (child, child_value) in map {
                flatten_into(&format!("{}.{}", key, child), child_value, out);
            }
        }
        Value::Array(items) => {
            let scalars: Option<Vec<String>> = items.iter().map(scalar_text).collect();
            let text = match scalars {
                Some(parts) => parts.join(", "),
                None => value.to_string(),
            };
            out.push((key.to_string(), text));
        }
        _ => {
            if let Some(text) = scalar_text(value) {
                out.push((key.to_string(), text));
            }
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                // Format as integer if it's a whole number
                if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                    Some((f as i64).to_string())
                } else {
                    Some(f.to_string())
                }
            } else {
                Some(n.to_string())
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_nested_record() {
        let flattener = JsonFlattener::new();

        let book = json!({
            "id": 7,
            "title": "The Hobbit",
            "author": "Tolkien",
            "publisher": { "name": "Allen & Unwin", "year": 1937 },
            "genres": ["fantasy", "children"],
            "price": 12.5,
            "isbn": null
        });

        let record = flattener.flatten_record(&book).unwrap();
        let get = |k: &str| {
            record
                .iter()
                .find(|(key, _)| key == k)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(get("id"), Some("7"));
        assert_eq!(get("publisher.name"), Some("Allen & Unwin"));
        assert_eq!(get("publisher.year"), Some("1937"));
        assert_eq!(get("genres"), Some("fantasy, children"));
        assert_eq!(get("price"), Some("12.5"));
        assert_eq!(get("isbn"), None);
    }

    #[test]
    fn test_documents_shapes() {
        let flattener = JsonFlattener::new();

        let list = json!([{ "id": 1 }, { "id": 2 }]);
        assert_eq!(flattener.documents(list).unwrap().len(), 2);

        let wrapped = json!({ "books": [{ "id": 1 }, { "id": 2 }, { "id": 3 }] });
        assert_eq!(flattener.documents(wrapped).unwrap().len(), 3);

        let single = json!({ "id": 1, "author": "A" });
        assert_eq!(flattener.documents(single).unwrap().len(), 1);

        assert!(flattener.documents(Value::Null).unwrap().is_empty());
        assert!(flattener.documents(json!("just text")).is_err());
    }

    #[test]
    fn test_flatten_to_dataframe_unions_fields() {
        let flattener = JsonFlattener::new();

        let items = vec![
            json!({ "id": 1, "author": "Tolkien" }),
            json!("not a record"),
            json!({ "id": 2, "title": "Narnia" }),
        ];

        let df = flattener.flatten_to_dataframe(&items).unwrap();
        assert_eq!(df.height(), 2);

        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        // Keys come out of each mapping in sorted order
        assert_eq!(names, vec!["author", "id", "title"]);

        let authors = df.column("author").unwrap().str().unwrap();
        assert_eq!(authors.get(0), Some("Tolkien"));
        assert_eq!(authors.get(1), None);
    }
}
