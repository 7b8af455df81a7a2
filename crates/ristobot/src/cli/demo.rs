use crate::cli::{connect_store, load_embedder, print_rows, Cli, DemoArgs};
use anyhow::Result;
use ristobot_core::pipeline::{BOOK_ID_FIELD, SENTENCE_FIELD, WORD_COUNT_FIELD};
use ristobot_core::{BookDemo, BookDemoConfig, DemoReport, EmbeddingService};
use tracing::info;

pub async fn run(cli: &Cli, args: &DemoArgs) -> Result<()> {
    let embedder = load_embedder(cli.model_dir.as_deref())?;
    let store = connect_store(cli).await?;

    let config = BookDemoConfig {
        collection: args.collection.clone(),
        search_text: args.search.clone(),
        dim: embedder.dimension(),
        top_k: args.top_k,
        search_level: args.level,
        drop_existing: args.drop_existing,
        seed: args.seed,
        ..BookDemoConfig::default()
    };

    let report = BookDemo::new(store.as_dyn(), &embedder, config).run().await?;
    store.close();

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&report_json(&report))?);
    } else {
        print_report(&report);
    }

    let total: f64 = report.timings.iter().map(|t| t.elapsed.as_secs_f64()).sum();
    info!("Demo finished in {:.4} seconds", total);
    Ok(())
}

fn print_report(report: &DemoReport) {
    println!("Inserted {} entities into `{}`", report.insert.insert_count, report.collection);
    println!();
    println!("{:>4}  {:<10}  {:<12}  {}", "RANK", "ID", "DISTANCE", "SENTENCE");
    println!("{}", "─".repeat(50));
    for (i, hit) in report.hits.iter().enumerate() {
        let sentence = if i == 0 {
            report.matched_sentence.as_deref().unwrap_or("-")
        } else {
            "-"
        };
        println!("{:>4}  {:<10}  {:<12.6}  {}", i + 1, hit.id, hit.distance, sentence);
    }
    println!();

    let columns: Vec<String> = [BOOK_ID_FIELD, WORD_COUNT_FIELD, SENTENCE_FIELD]
        .iter()
        .map(|c| c.to_string())
        .collect();
    print_rows(&report.rows, &columns);
    println!();

    println!("{:<20}  {}", "STEP", "SECONDS");
    println!("{}", "─".repeat(32));
    for t in &report.timings {
        println!("{:<20}  {:.4}", t.step, t.elapsed.as_secs_f64());
    }
}

fn report_json(report: &DemoReport) -> serde_json::Value {
    let hits: Vec<_> = report
        .hits
        .iter()
        .map(|h| serde_json::json!({"id": h.id, "distance": h.distance}))
        .collect();
    let timings: Vec<_> = report
        .timings
        .iter()
        .map(|t| serde_json::json!({"step": t.step, "seconds": t.elapsed.as_secs_f64()}))
        .collect();
    serde_json::json!({
        "collection": report.collection,
        "insert_count": report.insert.insert_count,
        "ids": report.insert.ids,
        "hits": hits,
        "matched_sentence": report.matched_sentence,
        "rows": report.rows,
        "timings": timings,
    })
}
