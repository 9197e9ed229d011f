//! Command line definitions for `hopps`.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// hopps - versioned key-value document store
#[derive(Parser, Debug)]
#[command(name = "hopps")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the SQLite database file (created on first use)
    #[arg(long, global = true, default_value = "./hopps.db")]
    pub db: PathBuf,

    /// Absolute directory for rotated log files; logging stays off when unset
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// Log level: trace|debug|info|warn|error
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(flatten)]
    pub limits: LimitArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Overrides for store configuration defaults.
#[derive(Args, Debug, Default)]
pub struct LimitArgs {
    /// Maximum encoded payload size in bytes
    #[arg(long, global = true)]
    pub max_payload_bytes: Option<usize>,

    /// Maximum append attempts before a save reports a conflict
    #[arg(long, global = true)]
    pub max_attempts: Option<u32>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Append a new version of a document
    Save {
        collection: String,
        key: String,
        /// Document body as a JSON value
        payload: String,
        /// Only save if this is still the newest version
        #[arg(long, conflicts_with = "create")]
        base: Option<u64>,
        /// Only save if the document has no versions yet
        #[arg(long)]
        create: bool,
    },

    /// Read one version of a document (latest by default)
    Get {
        collection: String,
        key: String,
        /// Exact version number
        #[arg(long, conflicts_with = "as_of")]
        version: Option<u64>,
        /// Version effective at this epoch-millisecond instant
        #[arg(long)]
        as_of: Option<i64>,
    },

    /// List versions of a document, newest first
    History {
        collection: String,
        key: String,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },

    /// List collection names
    Collections,

    /// Read the commit log in apply order
    Log {
        /// Return entries after this sequence number
        #[arg(long, default_value_t = 0)]
        after: u64,
        #[arg(long)]
        limit: Option<u32>,
    },
}
