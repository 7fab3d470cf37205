use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::constants::DEFAULT_CONFIG_NAME;

/// Command-line arguments for the stream uploader.
#[derive(Parser, Debug)]
#[clap(name = "stream_uploader", about = "Stream recorder output to local disk or cloud storage")]
pub struct Args {
    /// Verbose logging
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Path to configuration YAML file
    #[clap(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommands
    #[clap(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a named channel and stream everything written to it
    Record {
        /// Channel name (default: random UUID)
        #[clap(short, long)]
        name: Option<String>,

        /// Upload destination as JSON, or @path to a JSON file
        #[clap(short, long)]
        destination: String,

        /// Cap on upload throughput in bytes per second
        #[clap(long)]
        max_upload_speed: Option<u64>,
    },

    /// Upload a finished local file
    Upload {
        /// Upload request as JSON, or @path to a JSON file
        #[clap(short, long)]
        request: String,
    },

    /// Create a default configuration file
    InitConfig {
        /// Path to output configuration file
        #[clap(default_value = DEFAULT_CONFIG_NAME)]
        path: PathBuf,
    },
}

/// Resolve a JSON argument: inline JSON, or `@path` naming a file with it.
pub fn read_json_argument(value: &str) -> Result<String> {
    match value.strip_prefix('@') {
        Some(path) => fs::read_to_string(path).context(format!("Failed to read {}", path)),
        None => Ok(value.to_string()),
    }
}
