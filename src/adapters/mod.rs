// Adapters - External system implementations

pub mod dng_linear;
pub mod fs_output;
pub mod libav;
pub mod synthetic;
pub mod toml_config;

// Re-export adapters
pub use dng_linear::LinearDngWriter;
pub use fs_output::DirectoryOutput;
pub use libav::{LibavBackend, MediaFileClip};
pub use synthetic::SyntheticClip;
pub use toml_config::{AppConfig, ExportDefaults};
