//! rawexport library
//!
//! Export pipeline for decoded camera-raw clips. A clip is written as a
//! CinemaDNG sequence, a still-image sequence (TIFF, PNG, JPEG 2000), a
//! WAV file, or a single video container (ProRes, H.264, H.265, DNxHR/HD,
//! VP9) with optional audio. Encoders are negotiated at run time, trying the
//! platform's hardware encoder before software fallbacks.

pub mod adapters;
pub mod app;
pub mod audio;
pub mod cli;
pub mod config_initialization;
pub mod domain;
pub mod engine;
pub mod error;
pub mod io;
pub mod ports;
pub mod preset;
pub mod utils;

// Re-export commonly used types
pub use app::{BatchClip, ExportSummary, Exporter, ExporterSettings};
pub use domain::model::{ExportCodec, ExportRequest};
pub use engine::cancel::CancellationToken;
pub use engine::progress::JobControl;
pub use error::{ErrorKind, ExportError, ExportResult};
