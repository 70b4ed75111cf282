//! Encoder negotiation
//!
//! Candidates from the preset are tried in order. Each attempt builds a full
//! configuration, opens the encoder and binds it to the output stream; any
//! failure is recorded and the next candidate is tried. When the list runs out,
//! one generic attempt by codec identifier follows. Only when that fails too
//! does the job fail.
//!
//! The sequencing lives in [`Negotiator`], a small state machine
//! (`Probing -> GenericFallback -> Exhausted`, or `Opened`) that can be driven
//! without a media library.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::model::{CodecId, Rational};
use crate::error::{ExportError, ExportResult};
use crate::ports::{EncoderConfig, EncoderLookup, EncoderOpener, Muxer, VideoEncoder};
use crate::preset::bitrate::{hardware_bitrate, preset_bitrate};
use crate::preset::{EncoderCandidate, VideoPreset};

const EINVAL: i32 = -22;
const EPERM: i32 = -1;

/// HEVC Main 10 profile number
const HEVC_PROFILE_MAIN_10: i32 = 2;

/// Output geometry and threading for one encoder open
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EncodeGeometry {
    pub width: u32,
    pub height: u32,
    pub fps: Rational,
    pub threads: usize,
}

impl EncodeGeometry {
    pub fn new(width: u32, height: u32, fps: Rational, threads: usize) -> Self {
        Self {
            width,
            height,
            fps,
            threads,
        }
    }
}

/// Configuration for a named candidate
pub fn candidate_config(
    preset: &VideoPreset,
    candidate: &EncoderCandidate,
    geometry: &EncodeGeometry,
    global_header: bool,
) -> Option<EncoderConfig> {
    let codec = preset.codec?;
    let (mut width, mut height) = (geometry.width, geometry.height);
    if candidate.hardware {
        width += width & 1;
        height += height & 1;
    }

    let fps = geometry.fps;
    let mut config = EncoderConfig {
        codec,
        width,
        height,
        pixel_format: preset.pixel_format,
        time_base: fps.invert(),
        frame_rate: fps,
        gop: preset.gop,
        max_b_frames: preset.max_b_frames,
        bit_rate: preset_bitrate(preset, width, height, fps.as_f64()),
        rc_max_rate: 0,
        rc_buffer_size: 0,
        threads: 0,
        profile: preset.profile,
        bt709: true,
        global_header,
        options: Vec::new(),
    };

    if candidate.hardware {
        config.max_b_frames = 0;
        config.pixel_format = preset.pixel_format.hardware_equivalent();
        if config.bit_rate == 0 {
            config.bit_rate = hardware_bitrate(width, height, preset.crf);
        }
        config.rc_max_rate = config.bit_rate;
        config.rc_buffer_size = config.bit_rate;
        if config.pixel_format == crate::domain::model::PixelFormat::P010le {
            config.profile = Some(HEVC_PROFILE_MAIN_10);
        }
    } else {
        config.threads = geometry.threads;
        if let Some(crf) = preset.crf {
            config.options.push(("crf".to_string(), crf.to_string()));
            config.options.push(("preset".to_string(), preset.speed_preset.to_string()));
        }
        if let Some(profile) = preset.profile_option {
            config.options.push(("profile".to_string(), profile.to_string()));
        }
        if preset.lossless {
            config.options.push(("lossless".to_string(), "1".to_string()));
        }
        if codec == CodecId::Hevc {
            if let Some(params) = preset.pixel_format.x265_params() {
                config.options.push(("x265-params".to_string(), params.to_string()));
            }
        }
    }

    Some(config)
}

/// Minimal configuration for the last-resort open by codec identifier
pub fn generic_config(preset: &VideoPreset, geometry: &EncodeGeometry, global_header: bool) -> Option<EncoderConfig> {
    let codec = preset.codec?;
    let fps = geometry.fps;
    let mut options = Vec::new();
    if let Some(crf) = preset.crf {
        options.push(("crf".to_string(), crf.to_string()));
    }
    options.push(("preset".to_string(), preset.speed_preset.to_string()));

    Some(EncoderConfig {
        codec,
        width: geometry.width,
        height: geometry.height,
        pixel_format: preset.pixel_format,
        time_base: fps.invert(),
        frame_rate: fps,
        gop: preset.gop,
        max_b_frames: preset.max_b_frames,
        bit_rate: preset_bitrate(preset, geometry.width, geometry.height, fps.as_f64()),
        rc_max_rate: 0,
        rc_buffer_size: 0,
        threads: geometry.threads,
        profile: preset.profile,
        bt709: true,
        global_header,
        options,
    })
}

/// Receives the negotiated parameters once an encoder opened
pub trait StreamBinder<E> {
    fn requires_global_header(&self) -> bool;

    fn bind(&mut self, encoder: &E) -> ExportResult<()>;
}

/// Stream slot inside an open container
pub struct VideoStreamSlot<'m, M> {
    muxer: &'m mut M,
    stream: usize,
}

impl<'m, M> VideoStreamSlot<'m, M> {
    pub fn new(muxer: &'m mut M, stream: usize) -> Self {
        Self { muxer, stream }
    }
}

impl<'m, M, E> StreamBinder<E> for VideoStreamSlot<'m, M>
where
    M: Muxer<VideoEncoder = E>,
    E: VideoEncoder,
{
    fn requires_global_header(&self) -> bool {
        self.muxer.requires_global_header()
    }

    fn bind(&mut self, encoder: &E) -> ExportResult<()> {
        let tag = match encoder.descriptor().codec {
            CodecId::Hevc => Some(*b"hvc1"),
            _ => None,
        };
        self.muxer.bind_video_stream(self.stream, encoder, tag)
    }
}

/// No container: image sequences and diagnostics
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedStream {
    pub global_header: bool,
}

impl<E> StreamBinder<E> for DetachedStream {
    fn requires_global_header(&self) -> bool {
        self.global_header
    }

    fn bind(&mut self, _encoder: &E) -> ExportResult<()> {
        Ok(())
    }
}

/// Result of one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum AttemptOutcome {
    /// Encoder not present in this build of the library
    NotFound,
    OpenFailed { errno: i32 },
    /// Opened, but the output stream rejected its parameters
    BindFailed,
    /// Opened with a classification the force flags exclude
    Filtered,
    Opened,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attempt {
    pub encoder: String,
    pub hardware: bool,
    pub generic: bool,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

/// One planned open: where to find the encoder and how to configure it
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptPlan {
    pub lookup: EncoderLookup,
    pub label: String,
    pub hardware: bool,
    pub generic: bool,
    pub config: EncoderConfig,
}

impl AttemptPlan {
    /// Plan for a specific named candidate
    pub fn for_candidate(
        preset: &VideoPreset,
        candidate: &EncoderCandidate,
        geometry: &EncodeGeometry,
        global_header: bool,
    ) -> Option<Self> {
        Some(Self {
            lookup: EncoderLookup::Name(candidate.name.clone()),
            label: candidate.name.clone(),
            hardware: candidate.hardware,
            generic: false,
            config: candidate_config(preset, candidate, geometry, global_header)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NegotiationState {
    /// Next candidate index to try
    Probing(usize),
    GenericFallback,
    Opened,
    Exhausted,
}

/// Ordered, fail-soft encoder selection
pub struct Negotiator<'p> {
    preset: &'p VideoPreset,
    geometry: EncodeGeometry,
    state: NegotiationState,
    attempts: Vec<Attempt>,
}

impl<'p> Negotiator<'p> {
    pub fn new(preset: &'p VideoPreset, geometry: EncodeGeometry) -> Self {
        Self {
            preset,
            geometry,
            state: NegotiationState::Probing(0),
            attempts: Vec::new(),
        }
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    pub fn into_attempts(self) -> Vec<Attempt> {
        self.attempts
    }

    /// Advance to the next attempt; `None` once opened or exhausted
    pub fn next_plan(&mut self, global_header: bool) -> Option<AttemptPlan> {
        loop {
            match self.state {
                NegotiationState::Probing(index) => match self.preset.candidates.get(index) {
                    Some(candidate) => {
                        self.state = NegotiationState::Probing(index + 1);
                        if let Some(plan) =
                            AttemptPlan::for_candidate(self.preset, candidate, &self.geometry, global_header)
                        {
                            return Some(plan);
                        }
                    }
                    None => self.state = NegotiationState::GenericFallback,
                },
                NegotiationState::GenericFallback => {
                    self.state = NegotiationState::Exhausted;
                    let codec = self.preset.codec?;
                    let config = generic_config(self.preset, &self.geometry, global_header)?;
                    return Some(AttemptPlan {
                        lookup: EncoderLookup::Codec(codec),
                        label: format!("{:?}", codec).to_lowercase(),
                        hardware: false,
                        generic: true,
                        config,
                    });
                }
                NegotiationState::Opened | NegotiationState::Exhausted => return None,
            }
        }
    }

    /// Record how an attempt ended
    pub fn record(&mut self, plan: &AttemptPlan, encoder: Option<&str>, hardware: bool, outcome: AttemptOutcome) {
        if outcome == AttemptOutcome::Opened {
            self.state = NegotiationState::Opened;
        }
        self.attempts.push(Attempt {
            encoder: encoder.unwrap_or(&plan.label).to_string(),
            hardware,
            generic: plan.generic,
            outcome,
        });
    }

    /// Error for an exhausted negotiation
    pub fn exhausted_error(&self) -> ExportError {
        let tried: Vec<String> = self
            .attempts
            .iter()
            .map(|a| format!("{} ({:?})", a.encoder, a.outcome))
            .collect();
        let message = if tried.is_empty() {
            "no encoder candidates".to_string()
        } else {
            format!("tried {}", tried.join(", "))
        };

        if self
            .attempts
            .iter()
            .any(|a| a.outcome == AttemptOutcome::BindFailed)
        {
            ExportError::EncoderInitFailed { message }
        } else {
            ExportError::CodecUnavailable { message }
        }
    }

    /// Drive the negotiation against a media library
    pub fn run<O, S>(&mut self, opener: &O, binder: &mut S) -> ExportResult<O::Encoder>
    where
        O: EncoderOpener,
        S: StreamBinder<O::Encoder>,
    {
        if self.preset.codec.is_none() {
            return Err(ExportError::invalid("preset has no video codec"));
        }

        let global_header = binder.requires_global_header();
        while let Some(plan) = self.next_plan(global_header) {
            match try_plan(opener, &plan, binder, self.preset.required_hardware) {
                Ok(encoder) => {
                    let descriptor = encoder.descriptor();
                    let (name, hardware) = (descriptor.name.clone(), descriptor.hardware);
                    self.record(&plan, Some(&name), hardware, AttemptOutcome::Opened);
                    info!(
                        "Opened {} encoder {} ({}x{}, {})",
                        if hardware { "hardware" } else { "software" },
                        name,
                        descriptor.width,
                        descriptor.height,
                        descriptor.pixel_format
                    );
                    return Ok(encoder);
                }
                Err(outcome) => self.record(&plan, None, plan.hardware, outcome),
            }
        }

        Err(self.exhausted_error())
    }
}

/// Open, classify and bind one planned encoder
pub fn try_plan<O, S>(
    opener: &O,
    plan: &AttemptPlan,
    binder: &mut S,
    required_hardware: Option<bool>,
) -> Result<O::Encoder, AttemptOutcome>
where
    O: EncoderOpener,
    S: StreamBinder<O::Encoder>,
{
    if opener.find_encoder(&plan.lookup).is_none() {
        debug!("Encoder {} not available, skipping", plan.label);
        return Err(AttemptOutcome::NotFound);
    }

    let encoder = match opener.open_video_encoder(&plan.lookup, &plan.config) {
        Ok(encoder) => encoder,
        Err(failure) => {
            match failure.errno {
                EINVAL => warn!(
                    "Encoder {} rejected its configuration (pixel format {}, {}x{} or profile mismatch): {}",
                    plan.label, plan.config.pixel_format, plan.config.width, plan.config.height, failure.message
                ),
                EPERM => warn!(
                    "Encoder {} is not permitted on this device (hardware encoder unavailable): {}",
                    plan.label, failure.message
                ),
                _ => warn!("Encoder {} failed to open: {}", plan.label, failure.message),
            }
            return Err(AttemptOutcome::OpenFailed { errno: failure.errno });
        }
    };

    if let Some(required) = required_hardware {
        if encoder.descriptor().hardware != required {
            warn!(
                "Encoder {} opened but is excluded by the {} filter",
                encoder.descriptor().name,
                if required { "force-hardware" } else { "force-software" }
            );
            return Err(AttemptOutcome::Filtered);
        }
    }

    if let Err(e) = binder.bind(&encoder) {
        warn!("Encoder {} opened but stream setup failed: {}", plan.label, e);
        return Err(AttemptOutcome::BindFailed);
    }

    Ok(encoder)
}
