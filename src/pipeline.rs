use anyhow::{Context, Result};
use polars::prelude::DataFrame;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::config::PipelineConfig;
use crate::models::DatasetResults;
use crate::processor::{AnalyticsEngine, FieldClassifier, RecordMerger, RuleNormalizer, TableKind};
use crate::storage::{DatasetFrames, DatasetLoader};

/// Load → normalize → merge → analyze, one dataset folder at a time.
pub struct SalesPipeline {
    loader: DatasetLoader,
    normalizer: RuleNormalizer,
    merger: RecordMerger,
    analytics: AnalyticsEngine,
}

fn canonical(mut df: DataFrame, kind: TableKind) -> Result<DataFrame> {
    FieldClassifier::for_table(kind)
        .map_to_canonical_schema(&mut df)
        .with_context(|| format!("Failed to map {:?} columns", kind))?;
    Ok(df)
}

fn dataset_name(folder: &Path) -> String {
    folder
        .file_name()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| folder.display().to_string())
}

impl SalesPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        SalesPipeline {
            loader: DatasetLoader::new(config.files.clone()),
            normalizer: RuleNormalizer::new(config.eur_to_usd),
            merger: RecordMerger::new(),
            analytics: AnalyticsEngine::new(config.count_empty_author_set),
        }
    }

    pub fn process_dataset(&self, folder: &Path) -> Result<DatasetResults> {
        let name = dataset_name(folder);
        info!("=== Processing dataset: {} ===", name);

        let frames = self
            .loader
            .load(folder)
            .with_context(|| format!("Failed to load dataset '{}'", name))?;

        self.process_frames(&name, frames)
    }

    /// Run every stage after loading. Frames may use source column names.
    pub fn process_frames(&self, dataset: &str, frames: DatasetFrames) -> Result<DatasetResults> {
        let orders_df = canonical(frames.orders, TableKind::Orders)?;
        let users_df = canonical(frames.users, TableKind::Users)?;
        let books_df = canonical(frames.books, TableKind::Books)?;

        let (orders, order_report) = self
            .normalizer
            .normalize_orders(&orders_df, &frames.orders_file)
            .with_context(|| format!("Failed to normalize orders of '{}'", dataset))?;
        let users = self.merger.dedup_users(
            self.normalizer
                .normalize_users(&users_df)
                .with_context(|| format!("Failed to normalize users of '{}'", dataset))?,
        );
        let books = self.merger.dedup_books(
            self.normalizer
                .normalize_books(&books_df)
                .with_context(|| format!("Failed to normalize books of '{}'", dataset))?,
        );

        let merged = self.merger.merge(&orders, &users, &books);

        let analysis = if merged.is_empty() {
            warn!("Dataset '{}' has nothing to analyze", dataset);
            None
        } else {
            Some(self.analytics.analyze(&merged))
        };

        Ok(DatasetResults {
            dataset: dataset.to_string(),
            orders,
            order_report,
            books,
            users,
            merged,
            analysis,
        })
    }

    /// Process each folder independently. Failures are logged and the
    /// folder is skipped.
    pub fn process_datasets(&self, folders: &[PathBuf]) -> Vec<DatasetResults> {
        let mut results = Vec::with_capacity(folders.len());

        for folder in folders {
            match self.process_dataset(folder) {
                Ok(result) => results.push(result),
                Err(e) => error!("Failed to process {:?}: {:#}", folder, e),
            }
        }

        info!(
            "Processed {}/{} datasets successfully",
            results.len(),
            folders.len()
        );
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;
    use std::fs::File;
    use std::io::Write;

    fn write_orders(dir: &Path) {
        let mut df = DataFrame::new(vec![
            Series::new("id".into(), vec![1i64, 2, 2, 3, 4]).into(),
            Series::new("user_id".into(), vec![1i64, 1, 1, 2, 2]).into(),
            Series::new("book_id".into(), vec![10i64, 10, 10, 20, 20]).into(),
            Series::new("quantity".into(), vec!["1", "1", "1", "1", "1"]).into(),
            Series::new(
                "unit_price".into(),
                vec!["$10.00", "20 USD", "20 USD", "5", "free"],
            )
            .into(),
            Series::new(
                "timestamp".into(),
                vec![
                    "2024-01-01 09:00:00",
                    "2024-01-01 18:30:00",
                    "2024-01-01 18:30:00",
                    "2024-01-02 12:00:00",
                    "2024-01-03 12:00:00",
                ],
            )
            .into(),
        ])
        .unwrap();

        let mut file = File::create(dir.join("orders.parquet")).unwrap();
        ParquetWriter::new(&mut file).finish(&mut df).unwrap();
    }

    fn write_text(dir: &Path, name: &str, content: &str) {
        let mut file = File::create(dir.join(name)).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    fn sample_dataset() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        write_orders(dir.path());
        write_text(
            dir.path(),
            "users.csv",
            "id,name,email,phone,address\n1,Ann,ann@mail.com,111,Main St\n2,Bob,bob@mail.com,222,Side St\n",
        );
        write_text(
            dir.path(),
            "books.yaml",
            "- id: 10\n  author: Tolkien; Lewis\n  price: 9.99\n- id: 20\n  author: Lewis, Tolkien\n",
        );
        dir
    }

    #[test]
    fn test_process_dataset_end_to_end() {
        let dir = sample_dataset();
        let pipeline = SalesPipeline::new(PipelineConfig::default());

        let results = pipeline.process_dataset(dir.path()).unwrap();

        assert_eq!(results.order_report.rows_in, 5);
        assert_eq!(results.order_report.duplicates, 1);
        assert_eq!(results.order_report.missing_unit_price, 1);
        assert_eq!(results.orders.len(), 3);
        assert_eq!(results.merged.len(), 3);

        let analysis = results.analysis.unwrap();
        let revenue: Vec<f64> = analysis.daily_revenue.iter().map(|d| d.revenue).collect();
        assert_eq!(revenue, vec![30.0, 5.0]);
        assert_eq!(analysis.top5_days[0].revenue, "30.00");
        assert_eq!(analysis.unique_users, 2);
        assert_eq!(analysis.unique_author_sets, 1);
        assert_eq!(analysis.most_popular_author_set, "Lewis, Tolkien");
        assert_eq!(analysis.best_buyer_aliases, vec!["1"]);

        // Book price never reaches the merged rows
        assert!(
            results.merged.records[0]
                .book_extra
                .iter()
                .all(|(k, _)| k != "price")
        );
    }

    #[test]
    fn test_missing_users_skip_analysis() {
        let dir = sample_dataset();
        std::fs::remove_file(dir.path().join("users.csv")).unwrap();

        let pipeline = SalesPipeline::new(PipelineConfig::default());
        let results = pipeline.process_dataset(dir.path()).unwrap();

        assert_eq!(results.orders.len(), 3);
        assert!(results.users.is_empty());
        assert!(results.merged.is_empty());
        assert!(results.analysis.is_none());
    }

    #[test]
    fn test_failing_dataset_does_not_stop_others() {
        let good = sample_dataset();
        let bad = tempfile::tempdir().unwrap();
        write_text(bad.path(), "books.yaml", "just a scalar");

        let pipeline = SalesPipeline::new(PipelineConfig::default());
        let results = pipeline.process_datasets(&[bad.path().to_path_buf(), good.path().to_path_buf()]);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].orders.len(), 3);
    }

    #[test]
    fn test_missing_folder_gives_empty_results() {
        let pipeline = SalesPipeline::new(PipelineConfig::default());
        let results = pipeline.process_datasets(&[PathBuf::from("/nonexistent/dataset")]);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].dataset, "dataset");
        assert!(results[0].orders.is_empty());
        assert!(results[0].merged.is_empty());
        assert!(results[0].analysis.is_none());
        assert_eq!(results[0].order_report.rows_in, 0);
    }
}
