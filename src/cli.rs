//! Command-line interface for mindtrack
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// Personalized guided-meditation audio generator
#[derive(Parser, Debug)]
#[command(
    name = "mindtrack",
    version,
    about = "Personalized guided-meditation audio generator"
)]
pub struct Cli {
    /// Subcommand to execute (default: serve)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Parse a duration string such as `90s`, `15m` or `1h`. Bare numbers are seconds.
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP API
    Serve {
        /// Listen address (overrides server.host)
        #[arg(long, value_name = "HOST")]
        host: Option<String>,

        /// Listen port (overrides server.port)
        #[arg(long, short = 'p', value_name = "PORT")]
        port: Option<u16>,

        /// How long finished sessions stay pollable. Examples: 30m, 1h
        #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
        retention: Option<Duration>,

        /// How often expired sessions are evicted. Examples: 5m, 15m
        #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
        sweep_interval: Option<Duration>,
    },

    /// Generate one meditation locally and print where it was stored
    Generate {
        /// Condition the meditation addresses
        #[arg(long)]
        disease: String,

        /// Symptom the meditation focuses on
        #[arg(long)]
        symptom: String,

        /// Free-form extra guidance for the script
        #[arg(long, default_value = "")]
        instructions: String,

        /// Copy the finished audio here as well
        #[arg(long, short = 'o', value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Check that ffmpeg and ffprobe are usable
    Check,

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print the effective configuration (file + environment)
    Show,
    /// Print the configuration file path
    Path,
}
