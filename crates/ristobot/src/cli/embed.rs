use crate::cli::{connect_store, load_embedder, Cli, EmbedArgs};
use anyhow::Result;
use ristobot_core::{EmbeddingService, SentenceEmbedConfig, SentenceEmbedDemo};

pub async fn run(cli: &Cli, args: &EmbedArgs) -> Result<()> {
    let embedder = load_embedder(cli.model_dir.as_deref())?;
    let store = connect_store(cli).await?;

    let mut config = SentenceEmbedConfig {
        collection: args.collection.clone(),
        dim: embedder.dimension(),
        ..SentenceEmbedConfig::default()
    };
    if !args.sentences.is_empty() {
        config.sentences = args.sentences.clone();
    }

    let report = SentenceEmbedDemo::new(store.as_dyn(), &embedder, config).run().await?;
    store.close();

    println!(
        "Inserted {} entities into `{}`",
        report.insert.insert_count, report.collection
    );
    for id in &report.insert.ids {
        println!("  id {}", id);
    }
    Ok(())
}
