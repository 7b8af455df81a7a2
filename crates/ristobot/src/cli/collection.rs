use crate::cli::{connect_store, require_milvus, Cli, CollectionArgs, DropArgs};
use anyhow::Result;

pub async fn describe(cli: &Cli, args: &CollectionArgs) -> Result<()> {
    require_milvus(cli, "describe")?;
    let store = connect_store(cli).await?;
    let schema = store.as_dyn().describe_collection(&args.collection).await?;
    store.close();

    println!("Collection: {}", args.collection);
    if let Some(description) = &schema.description {
        println!("Description: {}", description);
    }
    println!("Auto id: {}", schema.auto_id);
    println!();
    println!(
        "{:<16}  {:<12}  {:<8}  {:<10}  {}",
        "FIELD", "TYPE", "PRIMARY", "PARAMS", "DESCRIPTION"
    );
    println!("{}", "─".repeat(70));
    for f in &schema.fields {
        let params = match (f.dim(), f.max_length()) {
            (Some(dim), _) => format!("dim={}", dim),
            (_, Some(max)) => format!("max={}", max),
            _ => "-".to_string(),
        };
        println!(
            "{:<16}  {:<12}  {:<8}  {:<10}  {}",
            f.name,
            format!("{:?}", f.data_type),
            if f.is_primary { "yes" } else { "" },
            params,
            f.description.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

pub async fn drop_collection(cli: &Cli, args: &DropArgs) -> Result<()> {
    require_milvus(cli, "drop")?;
    if !args.yes {
        use inquire::Confirm;
        let confirmed = Confirm::new(&format!(
            "Drop collection `{}` and all its data?",
            args.collection
        ))
        .with_default(false)
        .prompt()?;
        if !confirmed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let store = connect_store(cli).await?;
    store.as_dyn().drop_collection(&args.collection).await?;
    store.close();
    println!("Dropped `{}`", args.collection);
    Ok(())
}

pub async fn list(cli: &Cli) -> Result<()> {
    let store = connect_store(cli).await?;
    let names = store.as_dyn().list_collections().await?;
    store.close();

    if names.is_empty() {
        println!("(no collections)");
    }
    for name in names {
        println!("{}", name);
    }
    Ok(())
}
