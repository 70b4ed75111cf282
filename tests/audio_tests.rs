//! Clip audio muxed into containers: transcode, stream copy and degradation

mod common;

use std::fs;

use tempfile::TempDir;

use raw_export::adapters::{LinearDngWriter, SyntheticClip};
use raw_export::audio::AudioStats;
use raw_export::domain::model::HardwareApi;
use raw_export::engine::AudioOutcome;
use raw_export::{ExportCodec, ExportRequest, ExportSummary, Exporter, JobControl};

use common::*;

/// Two seconds of stereo 48 kHz tone under 48 frames at 24 fps
fn tone_clip() -> SyntheticClip {
    SyntheticClip::new(64, 36, 48, 24.0).with_tone(1000.0, 48_000, 2)
}

fn request(codec: ExportCodec) -> ExportRequest {
    ExportRequest::new(codec, "A001")
        .with_hardware_api(HardwareApi::Nvenc)
        .with_force_software()
}

type FakeExporter = Exporter<FakeBackend, LinearDngWriter>;

fn run(backend: FakeBackend, codec: ExportCodec) -> (ExportSummary, FakeExporter, MemoryOutputs, TempDir) {
    let staging = TempDir::new().unwrap();
    let exporter = exporter(backend, staging.path());
    let mut outputs = MemoryOutputs::new();
    let mut clip = tone_clip();
    let summary = exporter
        .export(&mut clip, &request(codec), &mut outputs, &JobControl::silent())
        .unwrap();
    (summary, exporter, outputs, staging)
}

fn muxed_stats(summary: &ExportSummary) -> AudioStats {
    match &summary.report.audio {
        AudioOutcome::Muxed { stats } => *stats,
        other => panic!("audio was not muxed: {:?}", other),
    }
}

#[test]
fn test_tone_transcodes_within_one_frame() {
    let input_samples = tone_clip().tone_samples();
    assert_eq!(input_samples, 96_000);

    let (summary, exporter, _, _) = run(FakeBackend::new(), ExportCodec::H264);
    let backend = exporter.backend();
    let stats = muxed_stats(&summary);

    let frames = backend.audio_frames();
    let encoded: usize = frames.iter().map(|(_, samples)| samples).sum();
    assert!((encoded as i64 - input_samples as i64).abs() <= 1024);
    assert_eq!(stats.samples, encoded as u64);

    // Every frame but the last is exactly one encoder frame
    let (last, full) = frames.split_last().unwrap();
    assert!(full.iter().all(|(_, samples)| *samples == 1024));
    assert!(last.1 > 0 && last.1 <= 1024);

    // Timestamps advance by the samples already sent
    let mut expected_pts = 0i64;
    for (pts, samples) in &frames {
        assert_eq!(*pts, expected_pts);
        expected_pts += *samples as i64;
    }

    let records = backend.mux_records();
    assert_eq!(
        records[0].streams,
        vec![
            StreamKind::Video("libx264".to_string()),
            StreamKind::Audio("aac".to_string())
        ]
    );
    assert_eq!(records[0].packets_of(is_audio), stats.packets);
    assert_eq!(records[0].packets_of(is_video), 48);
    assert_eq!(backend.live_resources(), 0);
}

#[test]
fn test_vp9_prefers_opus() {
    let (summary, exporter, outputs, _) = run(FakeBackend::new(), ExportCodec::Vp9);
    let backend = exporter.backend();
    let stats = muxed_stats(&summary);

    assert_eq!(outputs.names(), vec!["A001.webm".to_string()]);
    let records = backend.mux_records();
    assert_eq!(records[0].format, "webm");
    assert_eq!(records[0].streams[1], StreamKind::Audio("libopus".to_string()));
    assert!(backend.audio_frames().iter().all(|(_, samples)| *samples <= 960));
    assert_eq!(stats.samples, 96_000);
}

#[test]
fn test_prores_copies_staged_pcm() {
    let (summary, exporter, _, _) = run(FakeBackend::new(), ExportCodec::ProRes);
    let backend = exporter.backend();
    let stats = muxed_stats(&summary);

    // 96000 stereo 16-bit samples in 4096-byte packets
    assert_eq!(stats.packets, 94);
    assert_eq!(stats.samples, 0);
    assert!(backend.audio_frames().is_empty());

    let records = backend.mux_records();
    assert_eq!(
        records[0].streams,
        vec![StreamKind::Video("prores_ks".to_string()), StreamKind::Copied]
    );
    assert_eq!(records[0].packets_of(is_audio), 94);
}

#[test]
fn test_missing_audio_encoder_drops_audio() {
    let (summary, exporter, outputs, _) = run(FakeBackend::new().without_audio_encoders(), ExportCodec::H264);
    let backend = exporter.backend();

    assert!(matches!(summary.report.audio, AudioOutcome::Dropped { .. }));
    assert_eq!(summary.report.video_packets, 48);
    assert_eq!(outputs.names(), vec!["A001.mov".to_string()]);

    let records = backend.mux_records();
    assert_eq!(records[0].streams, vec![StreamKind::Video("libx264".to_string())]);
    assert!(records[0].trailer_written);
    assert_eq!(backend.live_resources(), 0);
}

#[test]
fn test_broken_audio_input_drops_audio() {
    let (summary, exporter, _, _) = run(FakeBackend::new().with_broken_audio_input(), ExportCodec::H265);
    let backend = exporter.backend();

    assert!(matches!(summary.report.audio, AudioOutcome::Dropped { .. }));
    assert_eq!(backend.mux_records()[0].streams.len(), 1);
    assert_eq!(backend.live_resources(), 0);
}

#[test]
fn test_audio_excluded_when_not_requested() {
    let staging = TempDir::new().unwrap();
    let exporter = exporter(FakeBackend::new(), staging.path());
    let mut outputs = MemoryOutputs::new();
    let mut clip = tone_clip();

    let summary = exporter
        .export(
            &mut clip,
            &request(ExportCodec::H264).with_audio(false),
            &mut outputs,
            &JobControl::silent(),
        )
        .unwrap();

    assert_eq!(summary.report.audio, AudioOutcome::None);
    assert!(exporter.backend().audio_frames().is_empty());
    assert_eq!(exporter.backend().mux_records()[0].streams.len(), 1);
}

#[test]
fn test_staged_audio_is_removed_after_export() {
    let (_, _, _, staging) = run(FakeBackend::new(), ExportCodec::H264);
    assert_eq!(fs::read_dir(staging.path()).unwrap().count(), 0);
}
