//! Preset resolution
//!
//! Maps an [`ExportRequest`] onto a [`VideoPreset`]: the codec, pixel format,
//! ordered encoder candidates, container and encoder hints for one job.

pub mod bitrate;
pub mod geometry;

use serde::Serialize;

use crate::domain::model::*;

/// One named encoder considered during negotiation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EncoderCandidate {
    pub name: String,
    pub hardware: bool,
}

impl EncoderCandidate {
    pub fn software(name: &str) -> Self {
        Self {
            name: name.to_string(),
            hardware: false,
        }
    }

    pub fn hardware(name: &str) -> Self {
        Self {
            name: name.to_string(),
            hardware: true,
        }
    }
}

/// Resolved codec-specific configuration for a job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoPreset {
    /// `None` for families without a video encoder (CinemaDNG, audio-only)
    pub codec: Option<CodecId>,
    pub pixel_format: PixelFormat,
    /// Ordered candidates, hardware first
    pub candidates: Vec<EncoderCandidate>,
    /// `None` for image sequences and non-video families
    pub container: Option<ContainerFormat>,
    pub extension: &'static str,
    pub crf: Option<u8>,
    pub speed_preset: &'static str,
    pub gop: u32,
    pub max_b_frames: u32,
    /// Zero means derive from profile and geometry
    pub bit_rate: u64,
    pub profile: Option<i32>,
    /// Value of the encoder's `profile` private option
    pub profile_option: Option<&'static str>,
    pub requires_even_dimensions: bool,
    pub dnxhd_profile: Option<DnxhdProfile>,
    pub dnxhr_profile: Option<DnxhrProfile>,
    pub lossless: bool,
    /// Classification the returned encoder must have, set by the force flags
    pub required_hardware: Option<bool>,
}

impl VideoPreset {
    fn base(codec: Option<CodecId>) -> Self {
        Self {
            codec,
            pixel_format: PixelFormat::Yuv420p,
            candidates: Vec::new(),
            container: Some(VideoContainer::Mov.format()),
            extension: ".mov",
            crf: None,
            speed_preset: "medium",
            gop: 12,
            max_b_frames: 0,
            bit_rate: 0,
            profile: None,
            profile_option: None,
            requires_even_dimensions: false,
            dnxhd_profile: None,
            dnxhr_profile: None,
            lossless: false,
            required_hardware: None,
        }
    }

    fn with_container(mut self, container: VideoContainer) -> Self {
        let format = container.format();
        self.extension = format.extension;
        self.container = Some(format);
        self
    }

    fn image_sequence(codec: CodecId, pixel_format: PixelFormat, extension: &'static str, encoder: &str) -> Self {
        Self {
            pixel_format,
            candidates: vec![EncoderCandidate::software(encoder)],
            container: None,
            extension,
            ..Self::base(Some(codec))
        }
    }

    /// Container muxer name, or `fallback` for container-less presets
    pub fn muxer_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.container.as_ref().map(|c| c.muxer).unwrap_or(fallback)
    }

    pub fn has_hardware_candidate(&self) -> bool {
        self.candidates.iter().any(|c| c.hardware)
    }
}

/// Resolve the preset for a request, applying diagnostic force filters
pub fn select_video_preset(request: &ExportRequest) -> VideoPreset {
    let mut preset = match request.codec {
        ExportCodec::ProRes => prores(request),
        ExportCodec::H264 => h264(request),
        ExportCodec::H265 => h265(request),
        ExportCodec::DnxHr => dnxhr(request.dnxhr_profile),
        ExportCodec::DnxHd => dnxhd(request.dnxhd_profile),
        ExportCodec::Vp9 => vp9(request),
        ExportCodec::Tiff => {
            VideoPreset::image_sequence(CodecId::Tiff, PixelFormat::Rgb48le, ".tif", "tiff")
        }
        ExportCodec::Png => {
            let format = match request.png_bit_depth {
                PngBitDepth::Sixteen => PixelFormat::Rgb48be,
                PngBitDepth::Eight => PixelFormat::Rgb24,
            };
            VideoPreset::image_sequence(CodecId::Png, format, ".png", "png")
        }
        ExportCodec::Jpeg2000 => VideoPreset::image_sequence(
            CodecId::Jpeg2000,
            PixelFormat::Yuv444p,
            ".jp2",
            "jpeg2000",
        ),
        ExportCodec::CinemaDng => VideoPreset {
            container: None,
            extension: ".dng",
            ..VideoPreset::base(None)
        },
        ExportCodec::AudioOnly => VideoPreset {
            container: None,
            extension: ".wav",
            ..VideoPreset::base(None)
        },
    };

    if request.force_hardware {
        preset.candidates.retain(|c| c.hardware);
        preset.required_hardware = Some(true);
    } else if request.force_software {
        preset.candidates.retain(|c| !c.hardware);
        preset.required_hardware = Some(false);
    }

    preset
}

fn prores(request: &ExportRequest) -> VideoPreset {
    let profile = request.prores_profile;
    let mut candidates = Vec::new();
    if request.prores_encoder == ProResEncoder::Aw && !profile.is_4444() {
        candidates.push(EncoderCandidate::software("prores_aw"));
    }
    candidates.push(EncoderCandidate::software("prores_ks"));

    VideoPreset {
        pixel_format: if profile.is_4444() {
            PixelFormat::Yuv444p10le
        } else {
            PixelFormat::Yuv422p10le
        },
        candidates,
        profile: Some(profile.profile_id()),
        ..VideoPreset::base(Some(CodecId::ProRes))
    }
}

/// Hardware entry first when the API has one, then the software encoder
fn inter_frame_candidates(request: &ExportRequest, codec: CodecId, software: &str) -> Vec<EncoderCandidate> {
    let mut candidates = Vec::with_capacity(2);
    if let Some(name) = request.hardware_api.encoder_name(codec) {
        candidates.push(EncoderCandidate::hardware(name));
    }
    candidates.push(EncoderCandidate::software(software));
    candidates
}

fn h264(request: &ExportRequest) -> VideoPreset {
    VideoPreset {
        candidates: inter_frame_candidates(request, CodecId::H264, "libx264"),
        crf: Some(match request.h264_quality {
            Quality::High => 14,
            Quality::Medium => 24,
        }),
        max_b_frames: 2,
        requires_even_dimensions: true,
        ..VideoPreset::base(Some(CodecId::H264))
    }
    .with_container(request.h264_container)
}

fn h265(request: &ExportRequest) -> VideoPreset {
    VideoPreset {
        pixel_format: match request.h265_bit_depth {
            H265BitDepth::Eight => PixelFormat::Yuv420p,
            H265BitDepth::Ten => PixelFormat::Yuv420p10le,
            H265BitDepth::Twelve => PixelFormat::Yuv444p12le,
        },
        candidates: inter_frame_candidates(request, CodecId::Hevc, "libx265"),
        crf: Some(match request.h265_quality {
            Quality::High => 18,
            Quality::Medium => 24,
        }),
        max_b_frames: 2,
        requires_even_dimensions: true,
        ..VideoPreset::base(Some(CodecId::Hevc))
    }
    .with_container(request.h265_container)
}

fn dnxhr(profile: DnxhrProfile) -> VideoPreset {
    VideoPreset {
        pixel_format: match profile {
            DnxhrProfile::Lb | DnxhrProfile::Sq | DnxhrProfile::Hq => PixelFormat::Yuv422p,
            DnxhrProfile::Hqx => PixelFormat::Yuv422p10le,
            DnxhrProfile::R444 => PixelFormat::Yuv444p10le,
        },
        candidates: vec![EncoderCandidate::software("dnxhd")],
        profile_option: Some(profile.option_value()),
        requires_even_dimensions: true,
        dnxhr_profile: Some(profile),
        ..VideoPreset::base(Some(CodecId::DnxHd))
    }
}

fn dnxhd(profile: DnxhdProfile) -> VideoPreset {
    VideoPreset {
        pixel_format: if profile.is_ten_bit() {
            PixelFormat::Yuv422p10le
        } else {
            PixelFormat::Yuv422p
        },
        candidates: vec![EncoderCandidate::software("dnxhd")],
        requires_even_dimensions: true,
        dnxhd_profile: Some(profile),
        ..VideoPreset::base(Some(CodecId::DnxHd))
    }
}

fn vp9(request: &ExportRequest) -> VideoPreset {
    let lossless = request.vp9_quality == Vp9Quality::Lossless;
    VideoPreset {
        candidates: inter_frame_candidates(request, CodecId::Vp9, "libvpx-vp9"),
        container: Some(ContainerFormat::new("webm", ".webm")),
        extension: ".webm",
        crf: Some(if lossless { 0 } else { 18 }),
        lossless,
        ..VideoPreset::base(Some(CodecId::Vp9))
    }
}
