//! Configuration initialization and hierarchy management

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::adapters::toml_config::{AppConfig, ExportDefaults};

/// Values given on the command line; `None` leaves lower layers in place
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub threads: Option<usize>,
    pub hardware_api: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub audio_staging_dir: Option<PathBuf>,
    pub scale_algorithm: Option<String>,
    pub naming: Option<String>,
}

impl ConfigOverrides {
    fn apply(&self, config: &mut AppConfig) -> usize {
        let section = &mut config.export;
        let mut applied = 0;
        let mut set = |present: bool| {
            if present {
                applied += 1;
            }
            present
        };

        if set(self.threads.is_some()) {
            section.threads = self.threads;
        }
        if set(self.hardware_api.is_some()) {
            section.hardware_api = self.hardware_api.clone();
        }
        if set(self.output_dir.is_some()) {
            section.output_dir = self.output_dir.clone();
        }
        if set(self.audio_staging_dir.is_some()) {
            section.audio_staging_dir = self.audio_staging_dir.clone();
        }
        if set(self.scale_algorithm.is_some()) {
            section.scale_algorithm = self.scale_algorithm.clone();
        }
        if set(self.naming.is_some()) {
            section.naming = self.naming.clone();
        }
        applied
    }
}

/// Resolve export defaults with precedence CLI > environment > file > defaults
pub fn initialize_configuration_hierarchy(
    config_path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<ExportDefaults> {
    let mut config = AppConfig::load(config_path).context("Failed to load configuration file")?;
    config
        .apply_process_env()
        .context("Invalid RAWEXPORT_* environment override")?;
    resolve_layers(config, overrides)
}

fn resolve_layers(mut config: AppConfig, overrides: &ConfigOverrides) -> Result<ExportDefaults> {
    let cli_overrides = overrides.apply(&mut config);
    if cli_overrides > 0 {
        debug!("Applied {} CLI configuration overrides", cli_overrides);
    }

    let defaults = config.resolve().context("Invalid configuration value")?;
    info!(
        "Configuration: {} threads, {:?} hardware API, output to {}",
        defaults.threads,
        defaults.hardware_api,
        defaults.output_dir.display()
    );
    Ok(defaults)
}
