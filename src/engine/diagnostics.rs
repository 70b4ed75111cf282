//! Encoder diagnostics: which candidate opens on this machine, and how fast

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::info;

use super::negotiator::{Attempt, DetachedStream, EncodeGeometry, Negotiator};
use crate::domain::model::{ExportCodec, ExportRequest, Rational};
use crate::error::ExportResult;
use crate::ports::{MediaBackend, VideoEncoder};
use crate::preset::select_video_preset;

pub const PROBE_WIDTH: u32 = 1920;
pub const PROBE_HEIGHT: u32 = 1080;
pub const PROBE_FPS: Rational = Rational::new(30, 1);
pub const PROBE_THREADS: usize = 4;

/// Negotiation result for one codec
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeReport {
    pub codec: ExportCodec,
    /// Encoder that opened, if any
    pub selected: Option<String>,
    pub hardware: Option<bool>,
    pub attempts: Vec<Attempt>,
    /// Failure message when nothing opened
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Run negotiation for `request.codec` against a dummy 1080p30 geometry
pub fn probe_codec<B: MediaBackend>(backend: &B, request: &ExportRequest) -> ProbeReport {
    let preset = select_video_preset(request);
    let mut report = ProbeReport {
        codec: request.codec,
        selected: None,
        hardware: None,
        attempts: Vec::new(),
        error: None,
    };
    if preset.codec.is_none() {
        report.error = Some(format!("{} does not use a video encoder", request.codec));
        return report;
    }

    let geometry = EncodeGeometry::new(PROBE_WIDTH, PROBE_HEIGHT, PROBE_FPS, PROBE_THREADS);
    let mut binder = DetachedStream {
        global_header: backend.format_requires_global_header(preset.muxer_or("mp4")),
    };
    let mut negotiator = Negotiator::new(&preset, geometry);
    match negotiator.run(backend, &mut binder) {
        Ok(encoder) => {
            let descriptor = encoder.descriptor();
            report.selected = Some(descriptor.name.clone());
            report.hardware = Some(descriptor.hardware);
        }
        Err(e) => report.error = Some(e.to_string()),
    }
    report.attempts = negotiator.into_attempts();

    info!(
        "Probe {}: {}",
        request.codec,
        report.selected.as_deref().unwrap_or("no encoder")
    );
    report
}

/// Probe every codec that negotiates a video encoder
pub fn probe_all<B: MediaBackend>(backend: &B, template: &ExportRequest) -> Vec<ProbeReport> {
    ExportCodec::ALL
        .iter()
        .filter(|codec| !matches!(codec, ExportCodec::CinemaDng | ExportCodec::AudioOnly))
        .map(|codec| {
            let mut request = template.clone();
            request.codec = *codec;
            probe_codec(backend, &request)
        })
        .collect()
}

/// Encoder class a benchmark run was restricted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BenchMode {
    Hardware,
    Software,
}

impl BenchMode {
    pub fn apply(self, request: ExportRequest) -> ExportRequest {
        match self {
            BenchMode::Hardware => request.with_force_hardware(),
            BenchMode::Software => request.with_force_software(),
        }
    }
}

/// One timed export
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchSample {
    pub codec: ExportCodec,
    pub mode: BenchMode,
    pub frames: u32,
    pub encoder: Option<String>,
    pub seconds: f64,
    pub fps: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BenchSample {
    pub fn failed(codec: ExportCodec, mode: BenchMode, error: String) -> Self {
        Self {
            codec,
            mode,
            frames: 0,
            encoder: None,
            seconds: 0.0,
            fps: 0.0,
            error: Some(error),
        }
    }

    /// Tab-separated text row
    pub fn to_row(&self) -> String {
        match &self.error {
            Some(error) => format!("{}\t{:?}\tfailed: {}", self.codec, self.mode, error),
            None => format!(
                "{}\t{:?}\t{}\t{} frames\t{:.2}s\t{:.1} fps",
                self.codec,
                self.mode,
                self.encoder.as_deref().unwrap_or("-"),
                self.frames,
                self.seconds,
                self.fps
            ),
        }
    }
}

/// Frames per second, zero for an empty interval
pub fn frames_per_second(frames: u32, elapsed: Duration) -> f64 {
    let seconds = elapsed.as_secs_f64();
    if seconds <= 0.0 {
        0.0
    } else {
        frames as f64 / seconds
    }
}

/// Time one export; `run` returns the frame count and the encoder that was used
pub fn measure<F>(codec: ExportCodec, mode: BenchMode, run: F) -> BenchSample
where
    F: FnOnce() -> ExportResult<(u32, Option<String>)>,
{
    let started = Instant::now();
    match run() {
        Ok((frames, encoder)) => {
            let elapsed = started.elapsed();
            BenchSample {
                codec,
                mode,
                frames,
                encoder,
                seconds: elapsed.as_secs_f64(),
                fps: frames_per_second(frames, elapsed),
                error: None,
            }
        }
        Err(e) => BenchSample::failed(codec, mode, e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExportError;

    #[test]
    fn test_frames_per_second() {
        assert_eq!(frames_per_second(10, Duration::ZERO), 0.0);
        assert!((frames_per_second(60, Duration::from_secs(2)) - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_measure_records_failure() {
        let sample = measure(ExportCodec::H264, BenchMode::Hardware, || {
            Err(ExportError::CodecUnavailable {
                message: "tried h264_nvenc".to_string(),
            })
        });
        assert_eq!(sample.frames, 0);
        assert!(sample.error.as_deref().unwrap_or("").contains("h264_nvenc"));
        assert!(sample.to_row().contains("failed"));
    }

    #[test]
    fn test_measure_success() {
        let sample = measure(ExportCodec::Png, BenchMode::Software, || Ok((5, Some("png".to_string()))));
        assert_eq!(sample.frames, 5);
        assert_eq!(sample.encoder.as_deref(), Some("png"));
        assert!(sample.error.is_none());
    }

    #[test]
    fn test_bench_mode_sets_force_flags() {
        let request = BenchMode::Hardware.apply(ExportRequest::new(ExportCodec::H264, "clip"));
        assert!(request.force_hardware);
        let request = BenchMode::Software.apply(ExportRequest::new(ExportCodec::H264, "clip"));
        assert!(request.force_software);
    }
}
