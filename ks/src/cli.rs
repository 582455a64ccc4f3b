//! CLI argument parsing for kvstore

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ks")]
#[command(author, version, about = "Inspect and edit a key-value store directory", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Store directory (overrides config)
    #[arg(short, long)]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the value stored under a key
    Get {
        /// Key to read
        #[arg(required = true)]
        key: String,

        /// Pretty-print JSON values
        #[arg(short, long)]
        pretty: bool,
    },

    /// Store a JSON value under a key
    Set {
        /// Key to write
        #[arg(required = true)]
        key: String,

        /// JSON value (validated before writing)
        #[arg(required = true)]
        value: String,
    },

    /// Remove a key
    Remove {
        /// Key to remove
        #[arg(required = true)]
        key: String,
    },

    /// List all keys
    List,
}
