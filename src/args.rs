use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "page-watch")]
#[command(about = "Watches web pages and reports meaningful content changes")]
#[command(version)]
pub struct Args {
    /// JSON file holding the tracked pages
    #[arg(short, long, default_value = "pages.json")]
    pub store: PathBuf,

    /// JSON configuration file (concurrency, timeouts, normalization filters)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Maximum number of concurrent fetches (overrides the config file)
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Per-fetch timeout in seconds (overrides the config file)
    #[arg(short, long)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start tracking a page
    Add {
        url: String,

        /// Display name (derived from the host when omitted)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// List tracked pages
    List,

    /// Stop tracking a page
    Remove { id: Uuid },

    /// Run one check cycle over every tracked page
    Check,

    /// Show the most recent diff recorded for a page
    Diff { id: Uuid },

    /// Print the summarization request for a page's latest change as JSON
    SummaryRequest { id: Uuid },

    /// Normalize a local HTML file and print the canonical text
    Normalize { file: PathBuf },
}
