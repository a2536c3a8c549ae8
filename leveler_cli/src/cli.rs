//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

/// Keeps the non-blocking file writer alive for the process lifetime.
pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "leveler", version, about = "Bed-leveling calibration CLI")]
pub struct Cli {
    /// Path to settings TOML; defaults are used when the file is absent
    #[arg(long, value_name = "FILE", default_value = "etc/leveler.toml")]
    pub config: PathBuf,

    /// Emit results (and logs) as JSON instead of pretty text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Append JSON-lines logs to this file
    #[arg(long = "log-file", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List mesh profiles found in a printer config dump
    Profiles {
        /// Printer config dump (or .csv mesh grid)
        #[arg(value_name = "FILE")]
        mesh_file: PathBuf,
    },
    /// Deviation statistics and the screws/tape strategy forecast
    Analyze {
        /// Printer config dump (or .csv mesh grid)
        #[arg(value_name = "FILE")]
        mesh_file: PathBuf,
        /// Profile name to analyze (default: first profile found)
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
    },
    /// Run the full calibration workflow and report every stage
    Workflow {
        /// Printer config dump (or .csv mesh grid)
        #[arg(value_name = "FILE")]
        mesh_file: PathBuf,
        /// Profile name to use (default: first profile found)
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
    },
}
