mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use tracing::error;

#[tokio::main]
async fn main() {
    // Initialize tracing; `log` records from ristobot-core are bridged in.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Demo(ref args) => cli::demo::run(&cli, args).await,
        Commands::Embed(ref args) => cli::embed::run(&cli, args).await,
        Commands::Search(ref args) => cli::search::run(&cli, args).await,
        Commands::Query(ref args) => cli::query::run(&cli, args).await,
        Commands::Describe(ref args) => cli::collection::describe(&cli, args).await,
        Commands::Drop(ref args) => cli::collection::drop_collection(&cli, args).await,
        Commands::List => cli::collection::list(&cli).await,
        Commands::Config(ref cmd) => cli::config_cmd::run(&cli, cmd),
    }
}
