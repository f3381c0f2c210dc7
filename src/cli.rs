//! Command-line interface definition using clap.
//!
//! This module defines:
//! - [`Args`] - global options and the subcommand
//! - [`Command`] - `detect`, `preview`, `import`, `sessions`
//! - [`OutputStyle`] - how results are printed
//!
//! # Example
//!
//! ```rust
//! use chatload::cli::{Args, Command};
//! use clap::Parser;
//!
//! let args = Args::parse_from(["chatload", "--data-dir", "/tmp/cl", "import", "result.json"]);
//! assert!(matches!(args.command, Command::Import { .. }));
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

/// Stream chat exports from Telegram, Discord, Instagram and WhatsApp
/// into SQLite session stores.
#[derive(Parser, Debug, Clone)]
#[command(name = "chatload")]
#[command(version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    chatload detect result.json
    chatload preview 'WhatsApp Chat with Family.txt'
    chatload import message_1.json
    chatload --data-dir ./data sessions
    chatload -v --output json import big_server.json")]
pub struct Args {
    /// Configuration file (default: <config dir>/chatload/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Where session stores live (overrides the configuration)
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// More logging (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Result output style
    #[arg(short, long, global = true, value_enum, default_value = "text")]
    pub output: OutputStyle,

    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    /// Log level implied by `-v`, if any.
    pub fn log_level(&self) -> Option<&'static str> {
        match self.verbose {
            0 => None,
            1 => Some("debug"),
            _ => Some("trace"),
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the detected export format
    Detect {
        /// Path to the export file
        path: PathBuf,
    },

    /// Count messages and members without importing
    Preview {
        /// Path to the export file
        path: PathBuf,
    },

    /// Import a file into a new session
    Import {
        /// Path to the export file
        path: PathBuf,
    },

    /// List imported sessions
    Sessions,
}

/// How results are written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStyle {
    /// Human-readable lines (default)
    #[default]
    Text,

    /// One JSON document
    Json,
}

impl std::fmt::Display for OutputStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputStyle::Text => write!(f, "text"),
            OutputStyle::Json => write!(f, "json"),
        }
    }
}
