//! Audio subsystem
//!
//! Staged clip audio reaches a container one of two ways: stream copy, when the
//! container takes the staged PCM as is, or transcode (decode, resample, buffer to
//! the encoder frame size, encode) when the container mandates a delivery codec.
//! Setup and stream failures degrade the export to video-only; muxer write
//! failures and cancellation end the job.

pub mod copy;
pub mod fifo;
pub mod samples;
pub mod transcode;
pub mod wav;

use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::domain::model::{CodecId, ExportCodec};
use crate::engine::cancel::CancellationToken;
use crate::error::ExportError;
use crate::ports::{AudioEncoderCaps, EncoderLookup, MediaBackend, PacketOf};

use self::copy::CopyPath;
use self::samples::{SampleFormat, SampleSpec};
use self::transcode::TranscodePath;

/// Sample rate preferred for delivery audio
pub const CANONICAL_SAMPLE_RATE: u32 = 48_000;

/// Delivery audio bitrate
pub const AUDIO_BIT_RATE: u64 = 192_000;

/// How audio gets into a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioPlan {
    Copy,
    /// Encoders to try, most preferred first
    Transcode { preferences: Vec<EncoderLookup> },
}

impl AudioPlan {
    /// Plan for a container codec family; `None` when the family has no container audio
    pub fn for_codec(codec: ExportCodec) -> Option<Self> {
        let general = [
            EncoderLookup::Codec(CodecId::Aac),
            EncoderLookup::Codec(CodecId::Opus),
            EncoderLookup::Codec(CodecId::Vorbis),
        ];
        let preferred = match codec {
            ExportCodec::H264 | ExportCodec::H265 => vec![
                EncoderLookup::name("aac"),
                EncoderLookup::Codec(CodecId::Aac),
            ],
            ExportCodec::Vp9 => vec![
                EncoderLookup::name("libopus"),
                EncoderLookup::Codec(CodecId::Opus),
                EncoderLookup::name("libvorbis"),
                EncoderLookup::Codec(CodecId::Vorbis),
            ],
            ExportCodec::ProRes | ExportCodec::DnxHr | ExportCodec::DnxHd => {
                return Some(AudioPlan::Copy)
            }
            _ => return None,
        };

        let mut preferences = preferred;
        for lookup in general {
            if !preferences.contains(&lookup) {
                preferences.push(lookup);
            }
        }
        Some(AudioPlan::Transcode { preferences })
    }
}

/// Pick the encoder input layout from decoder output and encoder capabilities
pub fn negotiate_sample_spec(source: &SampleSpec, caps: &AudioEncoderCaps) -> SampleSpec {
    let format = if caps.sample_formats.contains(&SampleFormat::Fltp) {
        SampleFormat::Fltp
    } else {
        caps.sample_formats.first().copied().unwrap_or(SampleFormat::Fltp)
    };

    let sample_rate = if caps.sample_rates.is_empty()
        || caps.sample_rates.contains(&CANONICAL_SAMPLE_RATE)
    {
        CANONICAL_SAMPLE_RATE
    } else if caps.sample_rates.contains(&source.sample_rate) {
        source.sample_rate
    } else {
        caps.sample_rates[0]
    };

    let channels = if source.channels == 0 { 2 } else { source.channels };

    SampleSpec::new(format, sample_rate, channels)
}

/// Audio failure split by whether the job may continue
#[derive(Debug)]
pub enum AudioFailure {
    /// Audio is dropped; video continues
    Recoverable(ExportError),
    /// Container write failure or cancellation
    Fatal(ExportError),
}

/// What the audio side pipeline produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AudioStats {
    pub packets: u64,
    /// Encoded samples per channel; zero for stream copy
    pub samples: u64,
}

/// Live audio state for one container session
pub enum AudioPipeline<B: MediaBackend> {
    Copy(CopyPath<B>),
    Transcode(TranscodePath<B>),
}

impl<B: MediaBackend> AudioPipeline<B> {
    /// Open the staged source and register the output stream.
    /// The stream is only added once everything else succeeded.
    pub fn setup(
        backend: &B,
        muxer: &mut B::Muxer,
        plan: &AudioPlan,
        source: &Path,
    ) -> Result<Self, ExportError> {
        match plan {
            AudioPlan::Copy => {
                let path = CopyPath::open(backend, muxer, source)?;
                info!("Audio stream copy from {}", source.display());
                Ok(AudioPipeline::Copy(path))
            }
            AudioPlan::Transcode { preferences } => {
                let path = TranscodePath::open(backend, muxer, preferences, source)?;
                info!(
                    "Audio transcode via {} ({} Hz, {} ch, {})",
                    path.encoder_name(),
                    path.spec().sample_rate,
                    path.spec().channels,
                    path.spec().format.name()
                );
                Ok(AudioPipeline::Transcode(path))
            }
        }
    }

    /// Move every audio packet into the muxer
    pub fn run(
        &mut self,
        muxer: &mut B::Muxer,
        packet: &mut PacketOf<B>,
        token: &CancellationToken,
    ) -> Result<AudioStats, AudioFailure> {
        let result = match self {
            AudioPipeline::Copy(path) => path.run(muxer, packet, token),
            AudioPipeline::Transcode(path) => path.run(muxer, packet, token),
        };
        if let Err(AudioFailure::Recoverable(e)) = &result {
            warn!("Audio dropped, continuing video-only: {}", e);
        }
        result
    }
}
