//! Batch export context
//!
//! Clips exported under one configuration share a preset and remember which
//! encoder opened for the previous clip. Only the encoder name is cached: every
//! output file needs its own codec context bound to its own stream.

use serde::Serialize;
use tracing::{debug, info, warn};

use super::negotiator::{try_plan, AttemptPlan, EncodeGeometry, Negotiator, StreamBinder};
use crate::domain::model::{is_hardware_encoder_name, ExportRequest};
use crate::error::{ExportError, ExportResult};
use crate::ports::{EncoderOpener, VideoEncoder};
use crate::preset::{select_video_preset, EncoderCandidate, VideoPreset};

/// Frame rates closer than this count as unchanged
pub const FPS_EPSILON: f64 = 0.01;

/// Encoder that opened for the previous clip, with the geometry it opened for
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedEncoderIdentity {
    pub name: String,
    pub hardware: bool,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

impl CachedEncoderIdentity {
    fn matches(&self, geometry: &EncodeGeometry) -> bool {
        self.width == geometry.width
            && self.height == geometry.height
            && (self.fps - geometry.fps.as_f64()).abs() < FPS_EPSILON
    }
}

/// Shared state of a batch export
#[derive(Debug, Clone)]
pub struct BatchExportContext {
    preset: VideoPreset,
    cached: Option<CachedEncoderIdentity>,
}

impl BatchExportContext {
    /// Resolve the shared preset; starts without a cached encoder
    pub fn init(request: &ExportRequest) -> Self {
        Self {
            preset: select_video_preset(request),
            cached: None,
        }
    }

    pub fn preset(&self) -> &VideoPreset {
        &self.preset
    }

    pub fn cached_identity(&self) -> Option<&CachedEncoderIdentity> {
        self.cached.as_ref()
    }

    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    /// Open an encoder for the next clip, trying the cached encoder first
    pub fn get_or_open<O, S>(
        &mut self,
        opener: &O,
        geometry: EncodeGeometry,
        binder: &mut S,
    ) -> ExportResult<O::Encoder>
    where
        O: EncoderOpener,
        S: StreamBinder<O::Encoder>,
    {
        if self.preset.codec.is_none() {
            return Err(ExportError::invalid("batch preset has no video codec"));
        }

        if let Some(identity) = self.cached.clone() {
            if identity.matches(&geometry) {
                let candidate = EncoderCandidate {
                    name: identity.name.clone(),
                    hardware: identity.hardware,
                };
                let plan = AttemptPlan::for_candidate(
                    &self.preset,
                    &candidate,
                    &geometry,
                    binder.requires_global_header(),
                );
                if let Some(plan) = plan {
                    match try_plan(opener, &plan, binder, self.preset.required_hardware) {
                        Ok(encoder) => {
                            debug!("Reused cached encoder {}", identity.name);
                            self.remember(&encoder, &geometry);
                            return Ok(encoder);
                        }
                        Err(outcome) => {
                            warn!(
                                "Cached encoder {} failed ({:?}), renegotiating",
                                identity.name, outcome
                            );
                        }
                    }
                }
            } else {
                debug!("Geometry changed, cached encoder {} not trusted", identity.name);
            }
            self.invalidate();
        }

        let mut negotiator = Negotiator::new(&self.preset, geometry);
        let encoder = negotiator.run(opener, binder)?;
        self.remember(&encoder, &geometry);
        info!(
            "Batch encoder selected: {}",
            self.cached.as_ref().map(|c| c.name.as_str()).unwrap_or("?")
        );
        Ok(encoder)
    }

    fn remember<E: VideoEncoder>(&mut self, encoder: &E, geometry: &EncodeGeometry) {
        let name = encoder.descriptor().name.clone();
        self.cached = Some(CachedEncoderIdentity {
            hardware: is_hardware_encoder_name(&name),
            name,
            width: geometry.width,
            height: geometry.height,
            fps: geometry.fps.as_f64(),
        });
    }

    /// Release cached state at the end of a batch
    pub fn cleanup(&mut self) {
        self.cached = None;
    }
}
