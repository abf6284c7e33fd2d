use anyhow::Result;
use polars::prelude::*;
use sales_pipeline::PipelineConfig;
use sales_pipeline::pipeline::SalesPipeline;
use sales_pipeline::storage::DatasetFrames;

fn sample_frames() -> Result<DatasetFrames> {
    let orders = DataFrame::new(vec![
        Series::new("ID".into(), vec!["1", "2", "2", "3", "4", "5"]).into(),
        Series::new("User ID".into(), vec!["7", "3", "3", "9", "7", "9"]).into(),
        Series::new("Book-ID".into(), vec!["10", "20", "20", "10", "30", "20"]).into(),
        Series::new("Quantity".into(), vec!["2", "1", "1", "3", "1", "x"]).into(),
        Series::new(
            "Unit Price".into(),
            vec!["$25.00", "€20", "€20", "12¢50", "40 USD", "$5"],
        )
        .into(),
        Series::new(
            "Timestamp".into(),
            vec![
                "09:19:51 P.M., 12-Dec-2024",
                "15-December-2024, 08:44:59 P.M.",
                "15-December-2024, 08:44:59 P.M.",
                "04:49:37 P.M.,03/11/25",
                "2024-12-12T10:00:00",
                "2024-12-13 11:00:00",
            ],
        )
        .into(),
    ])?;

    let users = DataFrame::new(vec![
        Series::new("id".into(), vec!["7", "3", "9"]).into(),
        Series::new("name".into(), vec!["Ann Lee", "Ann L.", "Bob Ray"]).into(),
        Series::new(
            "email".into(),
            vec!["ann@mail.com", "ann@mail.com", "bob@mail.com"],
        )
        .into(),
        Series::new("phone".into(), vec!["555-0100", "555-0100", "555-0199"]).into(),
        Series::new("address".into(), vec!["1 Main St", "1 Main St", "9 Side St"]).into(),
    ])?;

    let books = DataFrame::new(vec![
        Series::new("id".into(), vec!["10", "20", "30"]).into(),
        Series::new(
            "author".into(),
            vec!["Tolkien; Lewis", "Lewis, Tolkien", "Rowling"],
        )
        .into(),
        Series::new("price".into(), vec!["9.99", "12.00", "8.50"]).into(),
    ])?;

    Ok(DatasetFrames {
        orders,
        orders_file: "sample_orders.parquet".to_string(),
        users,
        books,
    })
}

fn main() -> Result<()> {
    println!("=== FULL PIPELINE TEST ===\n");

    let frames = sample_frames()?;
    let input_orders = frames.orders.height();
    println!("1. Sample input: {} orders, {} users, {} books", input_orders, frames.users.height(), frames.books.height());

    let pipeline = SalesPipeline::new(PipelineConfig::default());
    let results = pipeline.process_frames("sample", frames)?;

    println!("\n2. Order normalization:");
    println!("   {:?}", results.order_report);
    let mut orders_df = results.orders.to_dataframe()?;
    println!("{}", orders_df.head(Some(5)));

    println!("\n3. Merged rows: {}", results.merged.len());
    let merged_df = results.merged.to_dataframe()?;
    println!("   Columns: {:?}", merged_df.get_column_names());

    println!("\n4. Analysis:");
    match &results.analysis {
        Some(analysis) => {
            println!("{}", analysis.daily_revenue_frame()?);
            println!("{}", analysis.top5_days_frame()?);
            println!("   Unique users: {}", analysis.unique_users);
            println!("   Unique author sets: {}", analysis.unique_author_sets);
            println!("   Most popular author set: {}", analysis.most_popular_author_set);
            println!("   Best buyer ids: {:?}", analysis.best_buyer_aliases);
        }
        None => println!("   ⚠️  No analysis produced"),
    }

    println!("\n=== PIPELINE SUMMARY ===");
    println!("Input orders: {}", input_orders);
    println!("Kept orders: {}", results.orders.len());
    if input_orders != results.orders.len() {
        println!(
            "⚠️  {} orders dropped (duplicates or unparseable cells)",
            input_orders - results.orders.len()
        );
    }

    // Parquet buffer size as a sanity check of the export path
    let mut buf = Vec::new();
    ParquetWriter::new(&mut buf).finish(&mut orders_df)?;
    println!("Orders parquet size: {} bytes", buf.len());

    Ok(())
}
