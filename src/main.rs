//! rawexport command-line tool
//!
//! # Usage
//!
//! ```bash
//! rawexport export A001_C002.mov --codec prores --prores-profile hq -o out/
//! rawexport export clips/ --codec cdng --naming editor-reel -o out/
//! rawexport probe
//! rawexport bench --codec h264 --frames 120
//! ```

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use raw_export::cli::{commands, Cli, Commands};
use raw_export::utils::logging::{log_system_info, LogFormat, LogLevel, LoggingConfig};
use raw_export::{CancellationToken, ExportError};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = cli.log_level.parse::<LogLevel>().unwrap_or_else(|e| {
        eprintln!("{}; using info", e);
        LogLevel::Info
    });
    let format = cli.log_format.parse::<LogFormat>().unwrap_or_else(|e| {
        eprintln!("{}; using compact", e);
        LogFormat::Compact
    });
    LoggingConfig::new(level, format).initialize();
    log_system_info();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            exit_code(&e)
        }
    }
}

/// Run the command on a blocking worker; Ctrl-C cancels it
async fn run(cli: Cli) -> Result<()> {
    let token = CancellationToken::new();
    let watcher = {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling");
                token.cancel();
            }
        })
    };

    let config = cli.config.clone();
    let job = tokio::task::spawn_blocking(move || {
        let config = config.as_deref();
        match cli.command {
            Commands::Export(args) => {
                info!("Executing export command");
                commands::export(args, config, token).map(|_| ())
            }
            Commands::Probe(args) => {
                info!("Executing probe command");
                commands::probe(args, config).map(|_| ())
            }
            Commands::Bench(args) => {
                info!("Executing bench command");
                commands::bench(args, config, token).map(|_| ())
            }
        }
    });

    let result = job.await.context("Export worker failed")?;
    watcher.abort();
    result
}

/// Map a failure onto the export error code, made positive for the shell
fn exit_code(error: &anyhow::Error) -> ExitCode {
    let code = error
        .chain()
        .find_map(|cause| cause.downcast_ref::<ExportError>())
        .map(|e| e.code().unsigned_abs())
        .unwrap_or(1);
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
