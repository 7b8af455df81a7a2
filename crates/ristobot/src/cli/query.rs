use crate::cli::{connect_store, print_rows, require_milvus, Cli, QueryArgs};
use anyhow::Result;
use ristobot_core::Filter;

pub async fn run(cli: &Cli, args: &QueryArgs) -> Result<()> {
    require_milvus(cli, "query")?;
    let store = connect_store(cli).await?;
    let db = store.as_dyn();

    // Validate locally so a typo fails before the round trip.
    let filter = Filter::new(args.expr.as_str());
    filter.conditions()?;

    let output_fields = if args.output_fields.is_empty() {
        let schema = db.describe_collection(&args.collection).await?;
        schema
            .fields
            .iter()
            .filter(|f| !f.data_type.is_vector())
            .map(|f| f.name.clone())
            .collect()
    } else {
        args.output_fields.clone()
    };

    let rows = db.query(&args.collection, &filter, &output_fields).await?;
    store.close();

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        print_rows(&rows, &output_fields);
    }
    Ok(())
}
