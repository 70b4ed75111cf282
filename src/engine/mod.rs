//! Export engine
//!
//! Per-output sessions (container, image sequence, CinemaDNG), encoder
//! negotiation, batch encoder caching, and the cancellation/progress signals
//! those sessions poll.

use serde::Serialize;

pub mod batch;
pub mod cancel;
pub mod cdng;
pub mod container;
pub mod diagnostics;
pub mod negotiator;
pub mod progress;
pub mod sequence;

use std::path::Path;

use crate::audio::AudioStats;
use crate::domain::model::ExportRequest;
use crate::error::{ExportError, ExportResult};
use crate::ports::EncoderDescriptor;
use crate::preset::VideoPreset;

/// Threading knobs shared by every session of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionSettings {
    /// Encoder thread count for software encoders
    pub threads: usize,
    /// Core count handed to the raw decode engine
    pub decode_cores: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        let cores = num_cpus::get().max(1);
        Self {
            threads: cores,
            decode_cores: cores,
        }
    }
}

/// Inputs of one encode session
#[derive(Clone, Copy)]
pub struct SessionJob<'a> {
    pub request: &'a ExportRequest,
    pub preset: &'a VideoPreset,
    /// Staged WAV to mux, when audio was requested and present
    pub audio_source: Option<&'a Path>,
    pub settings: SessionSettings,
}

/// What happened to the clip's audio
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum AudioOutcome {
    /// Not requested, or the clip has none
    None,
    /// Muxed into the container
    Muxed { stats: AudioStats },
    /// Setup or stream failure; the output is video-only
    Dropped { reason: String },
    /// Written as a WAV next to the frames
    Sidecar { file: String },
    /// Audio-only export
    Standalone { file: String },
}

/// Outputs produced by one export session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputReport {
    /// Relative names of every file written
    pub files: Vec<String>,
    pub frames: u32,
    pub video_packets: u64,
    pub encoder: Option<EncoderDescriptor>,
    pub audio: AudioOutcome,
}

impl OutputReport {
    pub fn empty() -> Self {
        Self {
            files: Vec::new(),
            frames: 0,
            video_packets: 0,
            encoder: None,
            audio: AudioOutcome::None,
        }
    }
}

/// Allocate one interleaved RGB48 frame without aborting on allocation failure
pub fn alloc_frame_buffer(width: u32, height: u32) -> ExportResult<Vec<u16>> {
    let samples = (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(3))
        .ok_or_else(|| ExportError::memory(format!("frame size {}x{} overflows", width, height)))?;

    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(samples)
        .map_err(|e| ExportError::memory(format!("frame buffer of {} samples: {}", samples, e)))?;
    buffer.resize(samples, 0);
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_frame_buffer_size() {
        assert_eq!(alloc_frame_buffer(4, 2).unwrap().len(), 24);
    }

    #[test]
    fn test_frame_buffer_overflow_is_memory_error() {
        if usize::BITS == 64 {
            let err = alloc_frame_buffer(u32::MAX, u32::MAX).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InsufficientMemory);
        }
    }
}
