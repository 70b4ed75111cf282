// Application layer - Export job orchestration

pub mod export_job;

pub use export_job::{BatchClip, ExportSummary, Exporter, ExporterSettings};
