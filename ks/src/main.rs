use std::sync::Arc;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;

use kvstore::cli::{Cli, Command};
use kvstore::config::Config;
use kvstore::{FileBackend, StoreBackend};

fn setup_logging() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    let store_path = cli.store.unwrap_or(config.store_path);

    info!("kvstore starting at {}", store_path.display());
    let backend: Arc<dyn StoreBackend> = Arc::new(FileBackend::open(&store_path)?);

    match cli.command {
        Command::Get { key, pretty } => match backend.get(&key)? {
            Some(raw) => {
                if pretty && let Ok(value) = serde_json::from_str::<serde_json::Value>(&raw) {
                    println!("{}", serde_json::to_string_pretty(&value)?);
                } else {
                    println!("{}", raw);
                }
            }
            None => {
                eprintln!("{} Key not found: {}", "✗".red(), key);
                std::process::exit(1);
            }
        },
        Command::Set { key, value } => {
            let parsed: serde_json::Value =
                serde_json::from_str(&value).context(format!("Value for '{}' is not valid JSON", key))?;
            backend.set(&key, &serde_json::to_string(&parsed)?)?;
            println!("{} Stored: {}", "✓".green(), key.cyan());
        }
        Command::Remove { key } => {
            backend.remove(&key)?;
            println!("{} Removed: {}", "✓".green(), key);
        }
        Command::List => {
            let keys = backend.keys()?;
            if keys.is_empty() {
                println!("No keys found");
            } else {
                for key in keys {
                    println!("{}", key);
                }
            }
        }
    }

    Ok(())
}
