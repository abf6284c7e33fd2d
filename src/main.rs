use anyhow::{Context, Result};
use sales_pipeline::{PipelineConfig, SalesPipeline};
use std::env;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const CONFIG_ENV: &str = "SALES_PIPELINE_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/pipeline.toml";

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load environment variables
    dotenv::dotenv().ok();

    let config_path = env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = PipelineConfig::load(Some(Path::new(&config_path)))
        .with_context(|| format!("Failed to load pipeline configuration from {}", config_path))?;

    info!(
        "Loaded configuration: EUR→USD {}, files {}/{}/{}",
        config.eur_to_usd, config.files.orders, config.files.users, config.files.books
    );

    let folders: Vec<PathBuf> = env::args().skip(1).map(PathBuf::from).collect();
    if folders.is_empty() {
        warn!("No dataset folders given. Usage: sales-pipeline <DATASET_DIR>...");
        return Ok(());
    }

    info!("🚀 Starting sales pipeline over {} datasets", folders.len());

    let pipeline = SalesPipeline::new(config);
    let results = pipeline.process_datasets(&folders);

    info!("\n=== Sales Pipeline Summary ===");
    for result in &results {
        let report = &result.order_report;
        info!(
            "{}: {} orders kept of {}, {} users, {} books, {} merged rows",
            result.dataset,
            report.rows_out,
            report.rows_in,
            result.users.len(),
            result.books.len(),
            result.merged.len()
        );

        match &result.analysis {
            Some(analysis) => {
                for day in &analysis.top5_days {
                    info!("  #{} {} ${}", day.rank, day.date, day.revenue);
                }
                info!("  Unique users: {}", analysis.unique_users);
                info!("  Unique author sets: {}", analysis.unique_author_sets);
                info!("  Most popular author set: {}", analysis.most_popular_author_set);
                info!("  Best buyer ids: {:?}", analysis.best_buyer_aliases);
            }
            None => warn!("  No analysis for {}: an input table was empty", result.dataset),
        }
    }

    info!(
        "✅ Successfully processed {} out of {} datasets",
        results.len(),
        folders.len()
    );

    if results.is_empty() {
        warn!("⚠️ No datasets were processed successfully");
    }

    Ok(())
}
