//! CLI command definitions and subcommands

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ChronoFlow - daily tasks with a Pomodoro timer
#[derive(Parser)]
#[command(
    name = "cf",
    about = "Plan the day's tasks and run a Pomodoro countdown for each",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Store directory, overriding the config
    #[arg(short, long, global = true, help = "Store directory")]
    pub store: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Add a task
    Add {
        /// Short title
        title: String,

        /// Free-text details; a URL here is read by `suggest`
        #[arg(short, long, default_value = "")]
        description: String,

        /// Day to schedule (YYYY-MM-DD), today if omitted
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Planned length in minutes (1-120)
        #[arg(short = 'm', long)]
        duration: Option<u32>,

        /// Category label
        #[arg(short = 'g', long)]
        category: Option<String>,

        /// Ask the model for a category first
        #[arg(long)]
        suggest: bool,
    },

    /// List tasks for a day
    List {
        /// Day to show (YYYY-MM-DD), today if omitted
        #[arg(long, conflicts_with = "all")]
        date: Option<NaiveDate>,

        /// Show every day
        #[arg(short, long)]
        all: bool,
    },

    /// Show one task
    Show {
        /// Task ID or unique prefix
        id: String,
    },

    /// Change a task's details
    Edit {
        /// Task ID or unique prefix
        id: String,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(long)]
        date: Option<NaiveDate>,

        /// Planned length in minutes (1-120)
        #[arg(short = 'm', long)]
        duration: Option<u32>,

        #[arg(short = 'g', long)]
        category: Option<String>,
    },

    /// Delete a task
    Delete {
        /// Task ID or unique prefix
        id: String,
    },

    /// Run a task's countdown in the foreground (Ctrl-C pauses)
    Start {
        /// Task ID or unique prefix
        id: String,
    },

    /// Pause a task's countdown, keeping the time left
    Pause {
        /// Task ID or unique prefix
        id: String,
    },

    /// Put a task's countdown back to its full duration
    Reset {
        /// Task ID or unique prefix
        id: String,
    },

    /// Ask the model for a category and tags
    Suggest {
        /// Task ID or unique prefix; the task's title and description are used
        #[arg(conflicts_with = "title")]
        id: Option<String>,

        /// Title to categorize instead of a stored task
        #[arg(short, long)]
        title: Option<String>,

        /// Description to go with --title
        #[arg(short, long, requires = "title")]
        description: Option<String>,

        /// Tags you already have in mind
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Store the suggested category on the task (needs a task ID)
        #[arg(long)]
        apply: bool,
    },
}
