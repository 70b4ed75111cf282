//! CLI module for rawexport
//!
//! This module handles command-line argument parsing and command execution.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod args;
pub mod commands;

pub use args::{BenchArgs, EncoderArgs, ExportArgs, ProbeArgs, ProgressMode};

/// rawexport
///
/// Exports decoded clips as CinemaDNG, still-image sequences or encoded video
/// containers, negotiating hardware and software encoders.
#[derive(Parser, Debug)]
#[command(name = "rawexport")]
#[command(about = "Export clips to CinemaDNG, image sequences and video containers")]
#[command(version)]
#[command(long_about = None)]
pub struct Cli {
    /// Logging level
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    /// Log format (pretty, compact, json)
    #[arg(long, default_value = "compact", global = true)]
    pub log_format: String,

    /// Configuration file
    #[arg(long, env = "RAWEXPORT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export a clip or a directory of clips
    Export(ExportArgs),
    /// Report which encoder each codec negotiates on this machine
    Probe(ProbeArgs),
    /// Time synthetic exports under hardware and software encoders
    Bench(BenchArgs),
}
