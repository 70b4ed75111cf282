//! Batch export: shared encoder choice, per-clip naming and batch progress

mod common;

use tempfile::TempDir;

use raw_export::adapters::SyntheticClip;
use raw_export::domain::model::HardwareApi;
use raw_export::{BatchClip, ErrorKind, ExportCodec, ExportRequest, JobControl};

use common::*;

fn h264() -> ExportRequest {
    ExportRequest::new(ExportCodec::H264, "batch").with_hardware_api(HardwareApi::Nvenc)
}

fn flat(name: &str, width: u32, height: u32, frames: u32) -> BatchClip {
    BatchClip::new(name, Box::new(FlatClip::new(width, height, frames, 25.0)))
}

#[test]
fn test_second_clip_reuses_the_cached_encoder() {
    let staging = TempDir::new().unwrap();
    let exporter = exporter(FakeBackend::new().failing("h264_nvenc", -1), staging.path());
    let mut outputs = MemoryOutputs::new();
    let (control, sink) = recorded_control();
    let mut clips = vec![flat("A001", 320, 240, 10), flat("A002", 320, 240, 10)];

    let summaries = exporter
        .export_batch(&mut clips, &h264(), &mut outputs, &control)
        .unwrap();

    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].base_name, "A001");
    assert_eq!(summaries[1].report.files, vec!["A002.mov".to_string()]);
    assert_eq!(outputs.names(), vec!["A001.mov".to_string(), "A002.mov".to_string()]);

    // The failed hardware candidate is not probed again for the second clip
    assert_eq!(
        exporter.backend().open_calls(),
        vec!["h264_nvenc".to_string(), "libx264".to_string(), "libx264".to_string()]
    );
    assert_progress_completes(&sink.values());
    assert_eq!(exporter.backend().live_resources(), 0);
    assert_eq!(outputs.open_handles(), 0);
}

#[test]
fn test_geometry_change_renegotiates() {
    let staging = TempDir::new().unwrap();
    let exporter = exporter(FakeBackend::new().failing("h264_nvenc", -1), staging.path());
    let mut outputs = MemoryOutputs::new();
    let mut clips = vec![flat("A001", 320, 240, 4), flat("A002", 640, 480, 4)];

    exporter
        .export_batch(&mut clips, &h264(), &mut outputs, &JobControl::silent())
        .unwrap();

    assert_eq!(exporter.backend().open_calls().len(), 4);
    assert_eq!(exporter.backend().open_calls()[2], "h264_nvenc");
}

#[test]
fn test_batch_stops_at_first_failure() {
    let staging = TempDir::new().unwrap();
    let exporter = exporter(FakeBackend::new(), staging.path());
    let mut outputs = MemoryOutputs::new();
    let mut clips = vec![
        flat("A001", 320, 240, 4),
        flat("A002", 320, 240, 0),
        flat("A003", 320, 240, 4),
    ];

    let err = exporter
        .export_batch(&mut clips, &h264(), &mut outputs, &JobControl::silent())
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidParameters);
    assert_eq!(outputs.names(), vec!["A001.mov".to_string()]);
    assert_eq!(exporter.backend().live_resources(), 0);
}

#[test]
fn test_empty_batch_is_invalid() {
    let staging = TempDir::new().unwrap();
    let exporter = exporter(FakeBackend::new(), staging.path());
    let err = exporter
        .export_batch(&mut [], &h264(), &mut MemoryOutputs::new(), &JobControl::silent())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameters);
}

#[test]
fn test_cancelled_batch_releases_everything() {
    let staging = TempDir::new().unwrap();
    let exporter = exporter(FakeBackend::new(), staging.path());
    let mut outputs = MemoryOutputs::new();
    let (control, _) = recorded_control();
    let token = control.token.clone();
    let mut clips = vec![
        flat("A001", 320, 240, 4),
        BatchClip::new(
            "A002",
            Box::new(FlatClip::new(320, 240, 8, 25.0).cancelling_at(3, token)),
        ),
        flat("A003", 320, 240, 4),
    ];

    let err = exporter
        .export_batch(&mut clips, &h264(), &mut outputs, &control)
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(outputs.names().len(), 2);
    assert_eq!(exporter.backend().live_resources(), 0);
    assert_eq!(outputs.open_handles(), 0);
}

#[test]
fn test_image_sequence_batch_names_per_clip() {
    let staging = TempDir::new().unwrap();
    let exporter = exporter(FakeBackend::new(), staging.path());
    let mut outputs = MemoryOutputs::new();
    let (control, sink) = recorded_control();
    let mut clips = vec![
        BatchClip::new("A001", Box::new(SyntheticClip::new(32, 16, 3, 25.0))),
        BatchClip::new("B002", Box::new(SyntheticClip::new(32, 16, 2, 25.0))),
    ];

    let request = ExportRequest::new(ExportCodec::Png, "batch");
    let summaries = exporter
        .export_batch(&mut clips, &request, &mut outputs, &control)
        .unwrap();

    assert_eq!(summaries[0].report.files.len(), 3);
    assert_eq!(summaries[1].report.files, vec!["B002_000000.png".to_string(), "B002_000001.png".to_string()]);
    assert_eq!(outputs.names().len(), 5);
    assert_eq!(exporter.backend().open_calls(), vec!["png".to_string(), "png".to_string()]);
    assert_progress_completes(&sink.values());
}
