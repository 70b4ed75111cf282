//! Output dimension and frame-rate policy

use super::VideoPreset;
use crate::domain::model::{stretch, Dimensions, ExportRequest, Rational};

/// Smallest output size on either axis
pub const MIN_DIMENSION: u32 = 16;

/// Largest denominator used when approximating a floating-point frame rate
pub const MAX_FPS_DENOMINATOR: i32 = 100_000;

/// Frame rate used when neither an override nor the source provides one
pub const DEFAULT_FPS: f64 = 25.0;

/// Broadcast frame rates DNxHD accepts
pub const DNXHD_FRAME_RATES: [Rational; 8] = [
    Rational::new(24000, 1001),
    Rational::new(24, 1),
    Rational::new(25, 1),
    Rational::new(30000, 1001),
    Rational::new(30, 1),
    Rational::new(50, 1),
    Rational::new(60000, 1001),
    Rational::new(60, 1),
];

/// Output dimensions for a source frame size under the request and preset
pub fn compute_dimensions(source: Dimensions, request: &ExportRequest, preset: &VideoPreset) -> Dimensions {
    let mut dims = match request.resize {
        Some(resize) if resize.width > 0 && resize.height > 0 => resize,
        _ => stretched(source, request),
    };

    dims.width = dims.width.max(MIN_DIMENSION);
    dims.height = dims.height.max(MIN_DIMENSION);

    if let Some(profile) = preset.dnxhd_profile {
        dims = if profile.is_720() {
            Dimensions::new(1280, 720)
        } else {
            Dimensions::new(1920, 1080)
        };
    }

    if preset.requires_even_dimensions {
        dims = dims.to_even();
    }

    dims
}

fn stretched(source: Dimensions, request: &ExportRequest) -> Dimensions {
    let (sx, sy) = request.effective_stretch();

    // A 1:3 vertical squeeze is corrected by widening, never by shrinking height
    if stretch::approximately(sy, stretch::V_033) {
        return Dimensions::new(scale(source.width, 3.0), source.height);
    }

    Dimensions::new(scale(source.width, sx as f64), scale(source.height, sy as f64))
}

fn scale(value: u32, factor: f64) -> u32 {
    let scaled = (value as f64 * factor).round();
    if scaled <= 0.0 {
        0
    } else if scaled >= u32::MAX as f64 {
        u32::MAX
    } else {
        scaled as u32
    }
}

/// Output frame rate from the override, the source rate, or the default
pub fn select_fps(request: &ExportRequest, source_fps: f64, preset: &VideoPreset) -> Rational {
    let fps = match request.fps_override {
        Some(value) if value > 0.0 => value,
        _ if source_fps > 0.0 && source_fps.is_finite() => source_fps,
        _ => DEFAULT_FPS,
    };

    if preset.dnxhd_profile.is_some() {
        return snap_to_broadcast(fps);
    }

    Rational::approximate(fps, MAX_FPS_DENOMINATOR).unwrap_or(Rational::new(25, 1))
}

/// Nearest DNxHD broadcast rate by absolute difference
pub fn snap_to_broadcast(fps: f64) -> Rational {
    let mut best = DNXHD_FRAME_RATES[2];
    let mut best_diff = f64::MAX;
    for rate in DNXHD_FRAME_RATES {
        let diff = (rate.as_f64() - fps).abs();
        if diff < best_diff {
            best = rate;
            best_diff = diff;
        }
    }
    best
}
