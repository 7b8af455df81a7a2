use crate::cli::{
    cell_text, connect_store, load_embedder, require_milvus, truncate, Cli, SearchArgs,
};
use anyhow::{Context, Result};
use ristobot_core::{EmbeddingService, SearchParams, SearchRequest};

pub async fn run(cli: &Cli, args: &SearchArgs) -> Result<()> {
    require_milvus(cli, "search")?;
    let embedder = load_embedder(cli.model_dir.as_deref())?;
    let store = connect_store(cli).await?;
    let db = store.as_dyn();

    let schema = db.describe_collection(&args.collection).await?;
    let anns_field = match &args.field {
        Some(field) => field.clone(),
        None => schema
            .vector_fields()
            .next()
            .map(|f| f.name.clone())
            .with_context(|| format!("`{}` has no vector field", args.collection))?,
    };
    let output_fields: Vec<String> = schema
        .fields
        .iter()
        .filter(|f| !f.is_primary && !f.data_type.is_vector())
        .map(|f| f.name.clone())
        .collect();

    let request = SearchRequest {
        vector: embedder.embed(&args.text)?,
        anns_field,
        params: SearchParams::new(args.metric).with_level(args.level),
        limit: args.limit,
        output_fields: output_fields.clone(),
    };
    let hits = db.search(&args.collection, &request).await?;
    store.close();

    if args.format == "json" {
        let results: Vec<_> = hits
            .iter()
            .map(|h| serde_json::json!({"id": h.id, "distance": h.distance, "fields": h.fields}))
            .collect();
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("(no results)");
        return Ok(());
    }
    println!("{:>4}  {:<20}  {:<12}  {}", "RANK", "ID", "DISTANCE", "FIELDS");
    println!("{}", "─".repeat(80));
    for (i, hit) in hits.iter().enumerate() {
        let fields: Vec<String> = output_fields
            .iter()
            .filter_map(|f| hit.fields.get(f).map(|v| format!("{}={}", f, cell_text(v))))
            .collect();
        println!(
            "{:>4}  {:<20}  {:<12.6}  {}",
            i + 1,
            hit.id,
            hit.distance,
            truncate(&fields.join(" "), 40)
        );
    }
    Ok(())
}
