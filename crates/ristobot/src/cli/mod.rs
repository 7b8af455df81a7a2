pub mod collection;
pub mod config_cmd;
pub mod demo;
pub mod embed;
pub mod query;
pub mod search;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use ristobot_core::*;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "ristobot")]
#[command(version, about = "Embed sentences into Milvus, then search and query them back")]
pub struct Cli {
    /// Path to the INI file holding the connection settings
    #[arg(
        long,
        global = true,
        env = "RISTOBOT_CONFIG",
        default_value = "config.ini"
    )]
    pub config: PathBuf,

    /// INI section with `uri` and `token`
    #[arg(
        long,
        global = true,
        env = "RISTOBOT_SECTION",
        default_value = DEFAULT_SECTION
    )]
    pub section: String,

    /// Directory holding a local sentence-transformers ONNX export.
    /// Without it the default model is downloaded on first use.
    #[arg(long, global = true, env = "RISTOBOT_MODEL_DIR")]
    pub model_dir: Option<PathBuf>,

    /// Backend to run against
    #[arg(
        long,
        global = true,
        env = "RISTOBOT_STORE",
        value_enum,
        default_value_t = StoreKind::Milvus
    )]
    pub store: StoreKind,

    /// HTTP request timeout in seconds (none by default)
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// The Milvus service named in the config file
    Milvus,
    /// An in-process store that lives for one command (dry run for
    /// `demo` and `embed`; it starts empty, so there is nothing to search)
    Memory,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create `book`, insert mela/pera/banana, index, load, search and query
    Demo(DemoArgs),
    /// Recreate `ristobot` and insert three embedded sentences
    Embed(EmbedArgs),
    /// Vector search an existing collection with the embedding of a text
    Search(SearchArgs),
    /// Query an existing collection with a boolean filter expression
    Query(QueryArgs),
    /// Show a collection's schema
    Describe(CollectionArgs),
    /// Drop a collection
    Drop(DropArgs),
    /// List collections
    List,
    /// Configuration commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the resolved connection settings with the token masked
    Show,
}

#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Collection to create
    #[arg(long, default_value = "book")]
    pub collection: String,
    /// Text whose embedding is searched for
    #[arg(long, default_value = "pera")]
    pub search: String,
    /// Number of candidates to return
    #[arg(long, default_value = "1")]
    pub top_k: usize,
    /// AUTOINDEX accuracy level (1-5)
    #[arg(long, default_value = "2", value_parser = clap::value_parser!(u8).range(1..=5))]
    pub level: u8,
    /// Drop the collection first if it already exists
    #[arg(long)]
    pub drop_existing: bool,
    /// Seed for the random word counts
    #[arg(long)]
    pub seed: Option<u64>,
    /// Output format: text (default) | json
    #[arg(long, default_value = "text")]
    pub format: String,
}

#[derive(Args, Debug)]
pub struct EmbedArgs {
    /// Collection to recreate
    #[arg(long, default_value = "ristobot")]
    pub collection: String,
    /// Sentences to embed instead of the built-in three
    #[arg(long = "sentence")]
    pub sentences: Vec<String>,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Text to embed and search for
    pub text: String,
    #[arg(long, default_value = "book")]
    pub collection: String,
    /// Vector field to search (defaults to the collection's first vector field)
    #[arg(long)]
    pub field: Option<String>,
    #[arg(long, default_value = "3")]
    pub limit: usize,
    /// Metric the index was built with: L2 | IP | COSINE
    #[arg(long, default_value = "L2", value_parser = parse_metric)]
    pub metric: MetricType,
    /// AUTOINDEX accuracy level (1-5)
    #[arg(long, default_value = "2", value_parser = clap::value_parser!(u8).range(1..=5))]
    pub level: u8,
    /// Output format: table (default) | json
    #[arg(long, default_value = "table")]
    pub format: String,
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Filter expression, e.g. `book_id == 1` or `book_id in [0, 2]`
    pub expr: String,
    #[arg(long, default_value = "book")]
    pub collection: String,
    /// Fields to return (comma separated); defaults to every scalar field
    #[arg(long, value_delimiter = ',')]
    pub output_fields: Vec<String>,
    /// Output format: table (default) | json
    #[arg(long, default_value = "table")]
    pub format: String,
}

#[derive(Args, Debug)]
pub struct CollectionArgs {
    #[arg(default_value = "book")]
    pub collection: String,
}

#[derive(Args, Debug)]
pub struct DropArgs {
    pub collection: String,
    /// Do not ask for confirmation
    #[arg(long, short = 'y')]
    pub yes: bool,
}

fn parse_metric(s: &str) -> std::result::Result<MetricType, String> {
    MetricType::parse(s)
        .ok_or_else(|| format!("unknown metric `{}` (expected L2, IP or COSINE)", s))
}

// --- Store and model helpers ---

/// The backend a command runs against.
pub enum Store {
    Milvus(MilvusClient),
    Memory(MemoryStore),
}

impl Store {
    pub fn as_dyn(&self) -> &dyn VectorStore {
        match self {
            Store::Milvus(client) => client as &dyn VectorStore,
            Store::Memory(store) => store as &dyn VectorStore,
        }
    }

    pub fn close(self) {
        if let Store::Milvus(client) = self {
            client.disconnect();
        }
    }
}

/// Resolve `uri`/`token` from the config file, with env overrides applied.
pub fn load_connection(cli: &Cli) -> anyhow::Result<ConnectionConfig> {
    let config = ConnectionConfig::load(&cli.config, &cli.section)
        .with_context(|| {
            format!(
                "Failed to read connection settings from {}",
                cli.config.display()
            )
        })?;
    Ok(config.with_env_overrides())
}

/// Commands that read an existing collection cannot run on the in-process
/// store, which starts empty on every invocation.
pub fn require_milvus(cli: &Cli, command: &str) -> anyhow::Result<()> {
    if cli.store == StoreKind::Memory {
        anyhow::bail!(
            "`{}` works on an existing collection, but the in-process store starts empty \
             on every run; use --store milvus",
            command
        );
    }
    Ok(())
}

pub async fn connect_store(cli: &Cli) -> anyhow::Result<Store> {
    match cli.store {
        StoreKind::Memory => {
            info!("Using the in-process store; nothing is sent to Milvus");
            Ok(Store::Memory(MemoryStore::new()))
        }
        StoreKind::Milvus => {
            let config = load_connection(cli)?;
            let timeout = cli.timeout_secs.map(Duration::from_secs);
            let client = MilvusClient::connect_with("default", &config, timeout)
                .await
                .with_context(|| {
                    format!(
                        "Failed to connect to Milvus at {}\nCheck `uri` and `token` in [{}]",
                        config.uri, config.section
                    )
                })?;
            Ok(Store::Milvus(client))
        }
    }
}

pub fn load_embedder(model_dir: Option<&Path>) -> anyhow::Result<FastEmbedService> {
    let service = match model_dir {
        Some(dir) => {
            info!("Loading embedding model from {}", dir.display());
            FastEmbedService::from_dir(dir)
                .with_context(|| format!("Failed to load the model in {}", dir.display()))?
        }
        None => {
            warn!("No --model-dir given; using the default model (downloaded on first use)");
            FastEmbedService::new().context("Failed to initialize the embedding model")?
        }
    };
    info!(
        "Embedding model loaded: {} (dim {})",
        service.model_name(),
        service.dimension()
    );
    Ok(service)
}

// --- Table printing helpers ---

pub fn print_rows(rows: &[Row], columns: &[String]) {
    if rows.is_empty() {
        println!("(no results)");
        return;
    }
    let header: Vec<String> = columns.iter().map(|c| format!("{:<16}", c.to_uppercase())).collect();
    println!("{}", header.join("  ").trim_end());
    println!("{}", "─".repeat(18 * columns.len()));
    for row in rows {
        let cells: Vec<String> = columns
            .iter()
            .map(|c| {
                let cell = row.get(c).map(cell_text).unwrap_or_else(|| "-".into());
                format!("{:<16}", truncate(&cell, 40))
            })
            .collect();
        println!("{}", cells.join("  ").trim_end());
    }
}

/// Vectors are summarized; everything else prints as-is.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::FloatVector(v) => format!("[{} floats]", v.len()),
        other => other.to_string(),
    }
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}…", s.chars().take(max - 1).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["ristobot", "demo"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("config.ini"));
        assert_eq!(cli.section, "milvus_ristobot");
        assert_eq!(cli.store, StoreKind::Milvus);
        assert_eq!(cli.timeout_secs, None);
        match cli.command {
            Commands::Demo(args) => {
                assert_eq!(args.collection, "book");
                assert_eq!(args.search, "pera");
                assert_eq!(args.top_k, 1);
                assert_eq!(args.level, 2);
                assert!(!args.drop_existing);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "ristobot",
            "search",
            "pera",
            "--store",
            "memory",
            "--metric",
            "cosine",
            "--section",
            "milvus_local",
            "--timeout-secs",
            "5",
        ])
        .unwrap();
        assert_eq!(cli.store, StoreKind::Memory);
        assert_eq!(cli.timeout_secs, Some(5));
        assert_eq!(cli.section, "milvus_local");
        match cli.command {
            Commands::Search(args) => {
                assert_eq!(args.text, "pera");
                assert_eq!(args.metric, MetricType::Cosine);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_rejects_bad_metric_and_level() {
        assert!(Cli::try_parse_from(["ristobot", "search", "x", "--metric", "hamming"]).is_err());
        assert!(Cli::try_parse_from(["ristobot", "demo", "--level", "9"]).is_err());
    }

    #[test]
    fn test_output_fields_split_on_commas() {
        let cli = Cli::try_parse_from([
            "ristobot",
            "query",
            "book_id == 1",
            "--output-fields",
            "book_id,sentence",
        ])
        .unwrap();
        match cli.command {
            Commands::Query(args) => {
                assert_eq!(args.expr, "book_id == 1");
                assert_eq!(args.output_fields, vec!["book_id", "sentence"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_memory_store_rejected_for_existing_collections() {
        let cli = Cli::try_parse_from(["ristobot", "--store", "memory", "query", "book_id == 1"])
            .unwrap();
        let err = require_milvus(&cli, "query").unwrap_err();
        assert!(err.to_string().contains("--store milvus"));

        let cli = Cli::try_parse_from(["ristobot", "query", "book_id == 1"]).unwrap();
        assert!(require_milvus(&cli, "query").is_ok());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("banana", 10), "banana");
        assert_eq!(truncate("The embeddings can then be indexed", 10), "The embed…");
    }

    #[test]
    fn test_cell_text_summarizes_vectors() {
        assert_eq!(cell_text(&Value::FloatVector(vec![0.0; 384])), "[384 floats]");
        assert_eq!(cell_text(&Value::Int(7)), "7");
    }
}
