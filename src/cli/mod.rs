//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "kbscope",
    version,
    about = "Scope-aware hybrid retrieval over a document knowledge base",
    long_about = "kbscope stores documents, embeds them through a fallback chain of embedding \
                  providers, and answers queries with a fused lexical and semantic ranking \
                  annotated with a scope decision, a confidence score and knowledge gaps."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/kbscope/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Configuration profile to apply
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add a document to the knowledge base
    Add {
        /// Document title
        #[arg(short, long)]
        title: String,

        /// File holding the document body
        #[arg(short, long, value_name = "FILE")]
        file: PathBuf,

        /// Category or domain (classified from content when omitted)
        #[arg(short, long)]
        domain: Option<String>,
    },

    /// Mark a document deleted
    Delete {
        /// Document id
        id: i64,
    },

    /// Embed every active document and report index statistics
    Ingest,

    /// Query the knowledge base
    Query {
        /// Search query text
        query: String,

        /// Maximum number of results to return
        #[arg(short, long)]
        limit: Option<usize>,

        /// Restrict the search to one domain
        #[arg(short, long)]
        domain: Option<String>,

        /// Force a search strategy (hybrid, semantic, lexical)
        #[arg(short, long)]
        strategy: Option<String>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show document and index statistics
    Stats,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
