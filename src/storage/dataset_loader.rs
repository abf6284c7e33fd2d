use anyhow::{Context, Result, anyhow};
use polars::prelude::*;
use serde_json::Value;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::DatasetFiles;
use crate::processor::JsonFlattener;

/// Raw frames for one dataset folder, columns still named as in the files.
#[derive(Debug, Clone)]
pub struct DatasetFrames {
    pub orders: DataFrame,
    pub orders_file: String,
    pub users: DataFrame,
    pub books: DataFrame,
}

pub struct DatasetLoader {
    files: DatasetFiles,
    flattener: JsonFlattener,
}

impl DatasetLoader {
    pub fn new(files: DatasetFiles) -> Self {
        DatasetLoader {
            files,
            flattener: JsonFlattener::new(),
        }
    }

    /// Read the three tables of a folder. A missing folder is an empty
    /// dataset, not an error.
    pub fn load(&self, folder: &Path) -> Result<DatasetFrames> {
        if !folder.is_dir() {
            warn!("Dataset folder not found, using empty tables: {:?}", folder);
            return Ok(DatasetFrames {
                orders: DataFrame::empty(),
                orders_file: self.files.orders.clone(),
                users: DataFrame::empty(),
                books: DataFrame::empty(),
            });
        }

        let orders = self.read_table(&folder.join(&self.files.orders))?;
        let users = self.read_table(&folder.join(&self.files.users))?;
        let books = self.read_table(&folder.join(&self.files.books))?;

        info!(
            "Loaded {:?}: {} orders, {} users, {} books",
            folder,
            orders.height(),
            users.height(),
            books.height()
        );

        Ok(DatasetFrames {
            orders,
            orders_file: self.files.orders.clone(),
            users,
            books,
        })
    }

    /// Read one file, picking the reader from its extension. A missing file
    /// gives an empty frame.
    pub fn read_table(&self, path: &Path) -> Result<DataFrame> {
        if !path.exists() {
            warn!("File not found, using an empty table: {:?}", path);
            return Ok(DataFrame::empty());
        }

        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();

        debug!("Reading {:?} as {}", path, extension);

        match extension.as_str() {
            "parquet" => {
                let file = File::open(path)
                    .with_context(|| format!("Failed to open Parquet file: {:?}", path))?;

                ParquetReader::new(file)
                    .finish()
                    .map_err(|e| anyhow!("Polars Parquet read error in {:?}: {}", path, e))
            }
            "csv" => CsvReadOptions::default()
                .with_has_header(true)
                // Every column as text; typing happens in the normalizer
                .with_infer_schema_length(Some(0))
                .try_into_reader_with_file_path(Some(PathBuf::from(path)))
                .with_context(|| format!("Failed to open CSV file: {:?}", path))?
                .finish()
                .map_err(|e| anyhow!("Polars CSV read error in {:?}: {}", path, e)),
            "yaml" | "yml" => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read YAML file: {:?}", path))?;
                let root: Value = serde_yaml::from_str(&text)
                    .with_context(|| format!("Failed to parse YAML file: {:?}", path))?;
                self.flatten(root, path)
            }
            "json" => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read JSON file: {:?}", path))?;
                let root: Value = serde_json::from_str(&text)
                    .with_context(|| format!("Failed to parse JSON file: {:?}", path))?;
                self.flatten(root, path)
            }
            _ => Err(anyhow!(
                "Unsupported file format '{}' for {:?}. Supported: parquet, csv, yaml, yml, json",
                extension,
                path
            )),
        }
    }

    fn flatten(&self, root: Value, path: &Path) -> Result<DataFrame> {
        let documents = self
            .flattener
            .documents(root)
            .with_context(|| format!("Unexpected document layout in {:?}", path))?;
        self.flattener.flatten_to_dataframe(&documents)
    }
}
