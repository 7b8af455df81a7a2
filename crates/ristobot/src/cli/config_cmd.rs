use crate::cli::{load_connection, Cli, ConfigCommands};
use anyhow::Result;

pub fn run(cli: &Cli, cmd: &ConfigCommands) -> Result<()> {
    match cmd {
        ConfigCommands::Show => show(cli),
    }
}

fn show(cli: &Cli) -> Result<()> {
    let config = load_connection(cli)?;
    let source = config
        .source
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".into());

    println!("file:    {}", source);
    println!("section: [{}]", config.section);
    println!("uri:     {}", config.uri);
    println!("token:   {}", config.masked_token());
    println!("store:   {:?}", cli.store);
    match &cli.model_dir {
        Some(dir) => println!("model:   {}", dir.display()),
        None => println!("model:   (default, downloaded on first use)"),
    }
    Ok(())
}
