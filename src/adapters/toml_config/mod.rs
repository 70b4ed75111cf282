// TOML config adapter - export defaults from a file, overridden by RAWEXPORT_* variables

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::model::{HardwareApi, NamingScheme, ScaleAlgorithm};
use crate::error::{ExportError, ExportResult};

/// Searched in order when no config path is given
pub const DEFAULT_CONFIG_PATHS: [&str; 2] = ["rawexport.toml", "config/rawexport.toml"];

pub const ENV_PREFIX: &str = "RAWEXPORT_";

/// Raw `[export]` table; enum values stay strings until `resolve`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSection {
    pub threads: Option<usize>,
    pub hardware_api: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub audio_staging_dir: Option<PathBuf>,
    pub scale_algorithm: Option<String>,
    pub naming: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub export: ExportSection,
    /// File the values were read from
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// Fully typed defaults after every layer has been applied
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportDefaults {
    pub threads: usize,
    pub hardware_api: HardwareApi,
    pub output_dir: PathBuf,
    pub audio_staging_dir: Option<PathBuf>,
    pub scale_algorithm: ScaleAlgorithm,
    pub naming: NamingScheme,
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            threads: num_cpus::get().max(1),
            hardware_api: HardwareApi::platform_default(),
            output_dir: PathBuf::from("."),
            audio_staging_dir: None,
            scale_algorithm: ScaleAlgorithm::Bicubic,
            naming: NamingScheme::Sequential,
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(content: &str) -> ExportResult<Self> {
        toml::from_str(content).map_err(|e| ExportError::invalid(format!("Failed to parse TOML config: {}", e)))
    }

    /// Read `path`, or the first default location that exists
    pub fn load(path: Option<&Path>) -> ExportResult<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match DEFAULT_CONFIG_PATHS.iter().map(PathBuf::from).find(|p| p.is_file()) {
                Some(path) => path,
                None => {
                    debug!("No config file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let content = fs::read_to_string(&path)
            .map_err(|e| ExportError::io(format!("Failed to read config file {}: {}", path.display(), e)))?;
        let mut config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        config.source = Some(path);
        Ok(config)
    }

    /// Override values from `RAWEXPORT_*` variables supplied by `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> ExportResult<usize>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name)).filter(|v| !v.trim().is_empty());
        let section = &mut self.export;
        let mut applied = 0;

        if let Some(value) = var("THREADS") {
            let threads = value
                .trim()
                .parse::<usize>()
                .map_err(|e| ExportError::invalid(format!("{}THREADS: {}", ENV_PREFIX, e)))?;
            section.threads = Some(threads);
            applied += 1;
        }
        for (name, slot) in [
            ("HARDWARE_API", &mut section.hardware_api),
            ("SCALE_ALGORITHM", &mut section.scale_algorithm),
            ("NAMING", &mut section.naming),
        ] {
            if let Some(value) = var(name) {
                *slot = Some(value);
                applied += 1;
            }
        }
        for (name, slot) in [
            ("OUTPUT_DIR", &mut section.output_dir),
            ("AUDIO_STAGING_DIR", &mut section.audio_staging_dir),
        ] {
            if let Some(value) = var(name) {
                *slot = Some(PathBuf::from(value));
                applied += 1;
            }
        }

        if applied > 0 {
            debug!("Applied {} environment overrides", applied);
        }
        Ok(applied)
    }

    pub fn apply_process_env(&mut self) -> ExportResult<usize> {
        self.apply_env(|name| std::env::var(name).ok())
    }

    pub fn resolve(&self) -> ExportResult<ExportDefaults> {
        let section = &self.export;
        let defaults = ExportDefaults::default();

        if section.threads == Some(0) {
            return Err(ExportError::invalid("threads must be at least 1"));
        }

        Ok(ExportDefaults {
            threads: section.threads.unwrap_or(defaults.threads),
            hardware_api: section
                .hardware_api
                .as_deref()
                .map(HardwareApi::parse)
                .transpose()?
                .unwrap_or(defaults.hardware_api),
            output_dir: section.output_dir.clone().unwrap_or(defaults.output_dir),
            audio_staging_dir: section.audio_staging_dir.clone(),
            scale_algorithm: section
                .scale_algorithm
                .as_deref()
                .map(ScaleAlgorithm::parse)
                .transpose()?
                .unwrap_or(defaults.scale_algorithm),
            naming: section
                .naming
                .as_deref()
                .map(NamingScheme::parse)
                .transpose()?
                .unwrap_or(defaults.naming),
        })
    }
}
