use anyhow::{Context, Result, bail};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_EUR_TO_USD: f64 = 1.2;
pub const ENV_PREFIX: &str = "SALES_PIPELINE";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// USD paid per EUR when normalizing EUR-marked prices.
    pub eur_to_usd: f64,
    /// Whether rows without any author count as one author set.
    pub count_empty_author_set: bool,
    pub files: DatasetFiles,
}

/// File names looked up inside every dataset folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetFiles {
    pub orders: String,
    pub users: String,
    pub books: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            eur_to_usd: DEFAULT_EUR_TO_USD,
            count_empty_author_set: false,
            files: DatasetFiles::default(),
        }
    }
}

impl Default for DatasetFiles {
    fn default() -> Self {
        Self {
            orders: "orders.parquet".to_string(),
            users: "users.csv".to_string(),
            books: "books.yaml".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Load from an optional TOML file, then `SALES_PIPELINE__*` environment
    /// overrides (e.g. `SALES_PIPELINE__EUR_TO_USD=1.1`,
    /// `SALES_PIPELINE__FILES__ORDERS=orders.csv`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .context("Failed to build pipeline configuration")?;

        let config: PipelineConfig = settings
            .try_deserialize()
            .context("Failed to parse pipeline configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.eur_to_usd.is_finite() || self.eur_to_usd <= 0.0 {
            bail!("eur_to_usd must be a positive number, got {}", self.eur_to_usd);
        }

        for (kind, name) in [
            ("orders", &self.files.orders),
            ("users", &self.files.users),
            ("books", &self.files.books),
        ] {
            if name.trim().is_empty() {
                bail!("File name for {} cannot be empty", kind);
            }
        }

        Ok(())
    }
}
