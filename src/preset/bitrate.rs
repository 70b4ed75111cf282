//! Bitrate derivation for intermediate and hardware encoders

use super::VideoPreset;
use crate::domain::model::{DnxhdProfile, DnxhrProfile};

const MBIT: u64 = 1_000_000;
const FULL_HD_PIXELS: f64 = 1920.0 * 1080.0;
const HD_PIXELS: f64 = 1280.0 * 720.0;

/// Official DNxHD bitrates in Mbit/s
pub const DNXHD_BITRATES: [u64; 16] = [
    36, 45, 50, 75, 90, 100, 115, 120, 145, 175, 185, 220, 240, 290, 365, 440,
];

fn pixels(width: u32, height: u32) -> f64 {
    width as f64 * height as f64
}

/// DNxHR bitrate scaled from its 1080p base by pixel count
pub fn dnxhr_bitrate(profile: DnxhrProfile, width: u32, height: u32) -> u64 {
    let base = match profile {
        DnxhrProfile::Lb => 36,
        DnxhrProfile::Sq => 90,
        DnxhrProfile::Hq => 176,
        DnxhrProfile::Hqx => 220,
        DnxhrProfile::R444 => 330,
    } * MBIT;
    let scaled = base as f64 * pixels(width, height) / FULL_HD_PIXELS;
    (scaled as u64).max(10 * MBIT)
}

/// DNxHD bitrate snapped to the nearest official rate
pub fn dnxhd_bitrate(profile: DnxhdProfile, width: u32, height: u32, fps: f64) -> u64 {
    let full_hd_class = width >= 1920 || height >= 1080;
    let (base, reference) = if full_hd_class {
        (if profile.is_ten_bit() { 185 } else { 120 }, FULL_HD_PIXELS)
    } else {
        (if profile.is_ten_bit() { 90 } else { 60 }, HD_PIXELS)
    };
    let fps = if fps > 0.0 { fps } else { 25.0 };
    let target = base as f64 * pixels(width, height) / reference * fps / 25.0;

    let nearest = DNXHD_BITRATES
        .iter()
        .copied()
        .min_by(|a, b| {
            let da = (*a as f64 - target).abs();
            let db = (*b as f64 - target).abs();
            da.total_cmp(&db)
        })
        .unwrap_or(base);
    nearest * MBIT
}

/// Bitrate heuristic for hardware encoders that have no CRF mode
pub fn hardware_bitrate(width: u32, height: u32, crf: Option<u8>) -> u64 {
    let quality = match crf {
        Some(crf) if crf <= 18 => 1.5,
        _ => 1.0,
    };
    let scaled = 8.0 * MBIT as f64 * pixels(width, height) / FULL_HD_PIXELS * quality;
    (scaled as u64).max(MBIT)
}

/// Explicit preset bitrate, else the profile formula, else zero
pub fn preset_bitrate(preset: &VideoPreset, width: u32, height: u32, fps: f64) -> u64 {
    if preset.bit_rate > 0 {
        return preset.bit_rate;
    }
    if let Some(profile) = preset.dnxhr_profile {
        return dnxhr_bitrate(profile, width, height);
    }
    if let Some(profile) = preset.dnxhd_profile {
        return dnxhd_bitrate(profile, width, height, fps);
    }
    0
}
