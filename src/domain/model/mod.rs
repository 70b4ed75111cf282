// Domain models - Core types and data structures

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ExportError, ExportResult};

#[cfg(test)]
mod tests;

/// Codec family requested for an export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportCodec {
    CinemaDng,
    ProRes,
    H264,
    H265,
    Tiff,
    Png,
    Jpeg2000,
    DnxHr,
    DnxHd,
    Vp9,
    AudioOnly,
}

impl ExportCodec {
    pub const ALL: [ExportCodec; 11] = [
        ExportCodec::CinemaDng,
        ExportCodec::ProRes,
        ExportCodec::H264,
        ExportCodec::H265,
        ExportCodec::Tiff,
        ExportCodec::Png,
        ExportCodec::Jpeg2000,
        ExportCodec::DnxHr,
        ExportCodec::DnxHd,
        ExportCodec::Vp9,
        ExportCodec::AudioOnly,
    ];

    /// Map a host-side ordinal onto a codec family
    pub fn from_ordinal(ordinal: i32) -> Option<Self> {
        usize::try_from(ordinal)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
    }

    pub fn ordinal(self) -> i32 {
        Self::ALL.iter().position(|c| *c == self).unwrap_or(0) as i32
    }

    /// Parse codec name from string
    pub fn parse(value: &str) -> ExportResult<Self> {
        match value.trim().to_lowercase().as_str() {
            "cdng" | "cinemadng" | "cinema_dng" | "dng" => Ok(ExportCodec::CinemaDng),
            "prores" => Ok(ExportCodec::ProRes),
            "h264" | "avc" => Ok(ExportCodec::H264),
            "h265" | "hevc" => Ok(ExportCodec::H265),
            "tiff" | "tif" => Ok(ExportCodec::Tiff),
            "png" => Ok(ExportCodec::Png),
            "jpeg2000" | "jp2" => Ok(ExportCodec::Jpeg2000),
            "dnxhr" => Ok(ExportCodec::DnxHr),
            "dnxhd" => Ok(ExportCodec::DnxHd),
            "vp9" => Ok(ExportCodec::Vp9),
            "audio" | "audio_only" | "audio-only" => Ok(ExportCodec::AudioOnly),
            other => Err(ExportError::invalid(format!(
                "Unknown codec '{}'. Valid codecs: cdng, prores, h264, h265, tiff, png, jpeg2000, dnxhr, dnxhd, vp9, audio",
                other
            ))),
        }
    }

    /// Still-image codecs written one file per frame
    pub fn is_image_sequence(self) -> bool {
        matches!(self, ExportCodec::Tiff | ExportCodec::Png | ExportCodec::Jpeg2000)
    }

    /// Codecs muxed into a single container file
    pub fn is_container(self) -> bool {
        matches!(
            self,
            ExportCodec::ProRes
                | ExportCodec::H264
                | ExportCodec::H265
                | ExportCodec::DnxHr
                | ExportCodec::DnxHd
                | ExportCodec::Vp9
        )
    }
}

impl fmt::Display for ExportCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportCodec::CinemaDng => "cdng",
            ExportCodec::ProRes => "prores",
            ExportCodec::H264 => "h264",
            ExportCodec::H265 => "h265",
            ExportCodec::Tiff => "tiff",
            ExportCodec::Png => "png",
            ExportCodec::Jpeg2000 => "jpeg2000",
            ExportCodec::DnxHr => "dnxhr",
            ExportCodec::DnxHd => "dnxhd",
            ExportCodec::Vp9 => "vp9",
            ExportCodec::AudioOnly => "audio",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProResProfile {
    Proxy,
    Lt,
    Standard,
    Hq,
    P4444,
    Xq,
}

impl ProResProfile {
    pub fn parse(value: &str) -> ExportResult<Self> {
        match value.trim().to_lowercase().as_str() {
            "proxy" | "0" => Ok(ProResProfile::Proxy),
            "lt" | "1" => Ok(ProResProfile::Lt),
            "standard" | "422" | "2" => Ok(ProResProfile::Standard),
            "hq" | "3" => Ok(ProResProfile::Hq),
            "4444" | "4" => Ok(ProResProfile::P4444),
            "xq" | "4444xq" | "5" => Ok(ProResProfile::Xq),
            other => Err(ExportError::invalid(format!("Unknown ProRes profile '{}'", other))),
        }
    }

    /// Numeric profile as understood by ProRes encoders
    pub fn profile_id(self) -> i32 {
        match self {
            ProResProfile::Proxy => 0,
            ProResProfile::Lt => 1,
            ProResProfile::Standard => 2,
            ProResProfile::Hq => 3,
            ProResProfile::P4444 => 4,
            ProResProfile::Xq => 5,
        }
    }

    pub fn is_4444(self) -> bool {
        matches!(self, ProResProfile::P4444 | ProResProfile::Xq)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProResEncoder {
    Ks,
    Aw,
}

impl ProResEncoder {
    pub fn parse(value: &str) -> ExportResult<Self> {
        match value.trim().to_lowercase().as_str() {
            "ks" | "prores_ks" | "0" => Ok(ProResEncoder::Ks),
            "aw" | "prores_aw" | "1" => Ok(ProResEncoder::Aw),
            other => Err(ExportError::invalid(format!("Unknown ProRes encoder '{}'", other))),
        }
    }
}

/// Two-step quality selector shared by the inter-frame codecs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    High,
    Medium,
}

impl Quality {
    pub fn parse(value: &str) -> ExportResult<Self> {
        match value.trim().to_lowercase().as_str() {
            "high" | "0" => Ok(Quality::High),
            "medium" | "1" => Ok(Quality::Medium),
            other => Err(ExportError::invalid(format!(
                "Unknown quality '{}'. Valid values: high, medium",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoContainer {
    Mov,
    Mp4,
    Mkv,
}

impl VideoContainer {
    pub fn parse(value: &str) -> ExportResult<Self> {
        match value.trim().to_lowercase().as_str() {
            "mov" | "0" => Ok(VideoContainer::Mov),
            "mp4" | "1" => Ok(VideoContainer::Mp4),
            "mkv" | "matroska" | "2" => Ok(VideoContainer::Mkv),
            other => Err(ExportError::invalid(format!(
                "Unknown container '{}'. Valid containers: mov, mp4, mkv",
                other
            ))),
        }
    }

    /// Muxer name and file extension
    pub fn format(self) -> ContainerFormat {
        match self {
            VideoContainer::Mov => ContainerFormat::new("mov", ".mov"),
            VideoContainer::Mp4 => ContainerFormat::new("mp4", ".mp4"),
            VideoContainer::Mkv => ContainerFormat::new("matroska", ".mkv"),
        }
    }
}

/// Muxer short name paired with the output file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ContainerFormat {
    pub muxer: &'static str,
    pub extension: &'static str,
}

impl ContainerFormat {
    pub const fn new(muxer: &'static str, extension: &'static str) -> Self {
        Self { muxer, extension }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum H265BitDepth {
    Eight,
    Ten,
    Twelve,
}

impl H265BitDepth {
    pub fn parse(value: &str) -> ExportResult<Self> {
        match value.trim() {
            "8" => Ok(H265BitDepth::Eight),
            "10" => Ok(H265BitDepth::Ten),
            "12" => Ok(H265BitDepth::Twelve),
            other => Err(ExportError::invalid(format!(
                "Unknown H.265 bit depth '{}'. Valid values: 8, 10, 12",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PngBitDepth {
    Sixteen,
    Eight,
}

impl PngBitDepth {
    pub fn parse(value: &str) -> ExportResult<Self> {
        match value.trim() {
            "16" => Ok(PngBitDepth::Sixteen),
            "8" => Ok(PngBitDepth::Eight),
            other => Err(ExportError::invalid(format!(
                "Unknown PNG bit depth '{}'. Valid values: 16, 8",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DnxhrProfile {
    Lb,
    Sq,
    Hq,
    Hqx,
    R444,
}

impl DnxhrProfile {
    pub fn parse(value: &str) -> ExportResult<Self> {
        match value.trim().to_lowercase().trim_start_matches("dnxhr_") {
            "lb" => Ok(DnxhrProfile::Lb),
            "sq" => Ok(DnxhrProfile::Sq),
            "hq" => Ok(DnxhrProfile::Hq),
            "hqx" => Ok(DnxhrProfile::Hqx),
            "444" => Ok(DnxhrProfile::R444),
            other => Err(ExportError::invalid(format!(
                "Unknown DNxHR profile '{}'. Valid profiles: lb, sq, hq, hqx, 444",
                other
            ))),
        }
    }

    /// Encoder private option value
    pub fn option_value(self) -> &'static str {
        match self {
            DnxhrProfile::Lb => "dnxhr_lb",
            DnxhrProfile::Sq => "dnxhr_sq",
            DnxhrProfile::Hq => "dnxhr_hq",
            DnxhrProfile::Hqx => "dnxhr_hqx",
            DnxhrProfile::R444 => "dnxhr_444",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DnxhdProfile {
    P1080Ten,
    P1080Eight,
    P720Ten,
    P720Eight,
}

impl DnxhdProfile {
    pub fn parse(value: &str) -> ExportResult<Self> {
        match value.trim().to_lowercase().as_str() {
            "1080p10" | "1080p_10bit" => Ok(DnxhdProfile::P1080Ten),
            "1080p8" | "1080p_8bit" => Ok(DnxhdProfile::P1080Eight),
            "720p10" | "720p_10bit" => Ok(DnxhdProfile::P720Ten),
            "720p8" | "720p_8bit" => Ok(DnxhdProfile::P720Eight),
            other => Err(ExportError::invalid(format!(
                "Unknown DNxHD profile '{}'. Valid profiles: 1080p10, 1080p8, 720p10, 720p8",
                other
            ))),
        }
    }

    pub fn is_720(self) -> bool {
        matches!(self, DnxhdProfile::P720Ten | DnxhdProfile::P720Eight)
    }

    pub fn is_ten_bit(self) -> bool {
        matches!(self, DnxhdProfile::P1080Ten | DnxhdProfile::P720Ten)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vp9Quality {
    Good,
    Lossless,
}

impl Vp9Quality {
    pub fn parse(value: &str) -> ExportResult<Self> {
        match value.trim().to_lowercase().as_str() {
            "good" | "0" => Ok(Vp9Quality::Good),
            "lossless" | "1" => Ok(Vp9Quality::Lossless),
            other => Err(ExportError::invalid(format!(
                "Unknown VP9 quality '{}'. Valid values: good, lossless",
                other
            ))),
        }
    }
}

/// Output naming convention for per-frame and sidecar files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingScheme {
    Sequential,
    EditorReel,
}

impl NamingScheme {
    pub fn parse(value: &str) -> ExportResult<Self> {
        match value.trim().to_lowercase().as_str() {
            "sequential" | "plain" | "default" | "0" => Ok(NamingScheme::Sequential),
            "editor-reel" | "editor_reel" | "davinci" | "resolve" | "1" => Ok(NamingScheme::EditorReel),
            other => Err(ExportError::invalid(format!(
                "Unknown naming scheme '{}'. Valid schemes: sequential, editor-reel",
                other
            ))),
        }
    }
}

/// Interpolation used by the software scaler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleAlgorithm {
    Bicubic,
    Bilinear,
    Sinc,
    Lanczos,
    Spline,
}

impl ScaleAlgorithm {
    /// Unknown ordinals fall back to bicubic
    pub fn from_ordinal(ordinal: i32) -> Self {
        match ordinal {
            1 => ScaleAlgorithm::Bilinear,
            2 => ScaleAlgorithm::Sinc,
            3 => ScaleAlgorithm::Lanczos,
            4 => ScaleAlgorithm::Spline,
            _ => ScaleAlgorithm::Bicubic,
        }
    }

    pub fn parse(value: &str) -> ExportResult<Self> {
        match value.trim().to_lowercase().as_str() {
            "bicubic" => Ok(ScaleAlgorithm::Bicubic),
            "bilinear" => Ok(ScaleAlgorithm::Bilinear),
            "sinc" => Ok(ScaleAlgorithm::Sinc),
            "lanczos" => Ok(ScaleAlgorithm::Lanczos),
            "spline" => Ok(ScaleAlgorithm::Spline),
            other => Err(ExportError::invalid(format!(
                "Unknown scale algorithm '{}'. Valid values: bicubic, bilinear, sinc, lanczos, spline",
                other
            ))),
        }
    }
}

/// Platform encoder family used for the hardware candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardwareApi {
    MediaCodec,
    VideoToolbox,
    Nvenc,
    Qsv,
}

impl HardwareApi {
    pub fn parse(value: &str) -> ExportResult<Self> {
        match value.trim().to_lowercase().as_str() {
            "mediacodec" => Ok(HardwareApi::MediaCodec),
            "videotoolbox" => Ok(HardwareApi::VideoToolbox),
            "nvenc" => Ok(HardwareApi::Nvenc),
            "qsv" => Ok(HardwareApi::Qsv),
            other => Err(ExportError::invalid(format!(
                "Unknown hardware API '{}'. Valid values: mediacodec, videotoolbox, nvenc, qsv",
                other
            ))),
        }
    }

    /// Encoder family native to the build target
    pub fn platform_default() -> Self {
        if cfg!(target_os = "android") {
            HardwareApi::MediaCodec
        } else if cfg!(any(target_os = "macos", target_os = "ios")) {
            HardwareApi::VideoToolbox
        } else {
            HardwareApi::Nvenc
        }
    }

    /// Hardware encoder name for a codec, when this family has one
    pub fn encoder_name(self, codec: CodecId) -> Option<&'static str> {
        match (self, codec) {
            (HardwareApi::MediaCodec, CodecId::H264) => Some("h264_mediacodec"),
            (HardwareApi::MediaCodec, CodecId::Hevc) => Some("hevc_mediacodec"),
            (HardwareApi::MediaCodec, CodecId::Vp9) => Some("vp9_mediacodec"),
            (HardwareApi::VideoToolbox, CodecId::H264) => Some("h264_videotoolbox"),
            (HardwareApi::VideoToolbox, CodecId::Hevc) => Some("hevc_videotoolbox"),
            (HardwareApi::Nvenc, CodecId::H264) => Some("h264_nvenc"),
            (HardwareApi::Nvenc, CodecId::Hevc) => Some("hevc_nvenc"),
            (HardwareApi::Qsv, CodecId::H264) => Some("h264_qsv"),
            (HardwareApi::Qsv, CodecId::Hevc) => Some("hevc_qsv"),
            (HardwareApi::Qsv, CodecId::Vp9) => Some("vp9_qsv"),
            _ => None,
        }
    }
}

/// Hardware classification of an encoder name
pub fn is_hardware_encoder_name(name: &str) -> bool {
    ["mediacodec", "videotoolbox", "nvenc", "qsv"]
        .iter()
        .any(|marker| name.contains(marker))
}

/// Abstract codec identifier understood by the media backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecId {
    ProRes,
    H264,
    Hevc,
    DnxHd,
    Vp9,
    Tiff,
    Png,
    Jpeg2000,
    Aac,
    Opus,
    Vorbis,
}

/// Pixel layouts the pipeline can request from the scaler and encoders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Yuv420p,
    Yuv420p10le,
    Yuv420p12le,
    Yuv422p,
    Yuv422p10le,
    Yuv422p12le,
    Yuv444p,
    Yuv444p10le,
    Yuv444p12le,
    Nv12,
    P010le,
    Rgb24,
    Rgb48le,
    Rgb48be,
}

impl PixelFormat {
    pub fn name(self) -> &'static str {
        match self {
            PixelFormat::Yuv420p => "yuv420p",
            PixelFormat::Yuv420p10le => "yuv420p10le",
            PixelFormat::Yuv420p12le => "yuv420p12le",
            PixelFormat::Yuv422p => "yuv422p",
            PixelFormat::Yuv422p10le => "yuv422p10le",
            PixelFormat::Yuv422p12le => "yuv422p12le",
            PixelFormat::Yuv444p => "yuv444p",
            PixelFormat::Yuv444p10le => "yuv444p10le",
            PixelFormat::Yuv444p12le => "yuv444p12le",
            PixelFormat::Nv12 => "nv12",
            PixelFormat::P010le => "p010le",
            PixelFormat::Rgb24 => "rgb24",
            PixelFormat::Rgb48le => "rgb48le",
            PixelFormat::Rgb48be => "rgb48be",
        }
    }

    /// Surface format hardware encoders accept in place of this one
    pub fn hardware_equivalent(self) -> Self {
        match self {
            PixelFormat::Yuv420p => PixelFormat::Nv12,
            PixelFormat::Yuv420p10le => PixelFormat::P010le,
            other => other,
        }
    }

    /// x265 depth/profile parameters matching this layout
    pub fn x265_params(self) -> Option<&'static str> {
        match self {
            PixelFormat::Yuv444p12le => Some("output-depth=12:profile=main444-12"),
            PixelFormat::Yuv422p12le => Some("output-depth=12:profile=main422-12"),
            PixelFormat::Yuv420p12le => Some("output-depth=12:profile=main12"),
            PixelFormat::Yuv444p10le => Some("output-depth=10:profile=main444-10"),
            PixelFormat::Yuv422p10le => Some("output-depth=10:profile=main422-10"),
            PixelFormat::Yuv420p10le => Some("output-depth=10:profile=main10"),
            _ => None,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Rational number for frame rates and time bases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// Convert to floating point
    pub fn as_f64(&self) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        self.num as f64 / self.den as f64
    }

    pub fn invert(&self) -> Self {
        Self { num: self.den, den: self.num }
    }

    /// Best rational approximation with a bounded denominator (continued fractions)
    pub fn approximate(value: f64, max_den: i32) -> Option<Self> {
        if !value.is_finite() || value <= 0.0 || max_den <= 0 {
            return None;
        }

        let (mut h_prev, mut h) = (0i64, 1i64);
        let (mut k_prev, mut k) = (1i64, 0i64);
        let mut x = value;

        loop {
            let a = x.floor();
            if a > i32::MAX as f64 {
                break;
            }
            let a = a as i64;
            let h_next = a * h + h_prev;
            let k_next = a * k + k_prev;
            if k_next > max_den as i64 || h_next > i32::MAX as i64 {
                break;
            }
            h_prev = h;
            h = h_next;
            k_prev = k;
            k = k_next;

            let frac = x - a as f64;
            if frac.abs() < 1e-9 {
                break;
            }
            x = 1.0 / frac;
        }

        if k == 0 || h == 0 {
            return None;
        }
        Some(Self::new(h as i32, k as i32))
    }

    /// Rescale a timestamp from this time base into another, rounding to nearest
    pub fn rescale(&self, value: i64, target: &Rational) -> i64 {
        if self == target {
            return value;
        }
        let numerator = value as i128 * self.num as i128 * target.den as i128;
        let denominator = self.den as i128 * target.num as i128;
        if denominator == 0 {
            return value;
        }
        let half = denominator.abs() / 2;
        let rounded = if (numerator >= 0) == (denominator > 0) {
            (numerator.abs() + half) / denominator.abs()
        } else {
            -((numerator.abs() + half) / denominator.abs())
        };
        rounded as i64
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Target output geometry of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Round odd axes up to the next even value
    pub fn to_even(self) -> Self {
        Self {
            width: self.width + (self.width & 1),
            height: self.height + (self.height & 1),
        }
    }

    pub fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Immutable description of one export job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportRequest {
    pub codec: ExportCodec,
    pub prores_profile: ProResProfile,
    pub prores_encoder: ProResEncoder,
    pub h264_quality: Quality,
    pub h264_container: VideoContainer,
    pub h265_bit_depth: H265BitDepth,
    pub h265_quality: Quality,
    pub h265_container: VideoContainer,
    pub png_bit_depth: PngBitDepth,
    pub dnxhr_profile: DnxhrProfile,
    pub dnxhd_profile: DnxhdProfile,
    pub vp9_quality: Vp9Quality,
    pub include_audio: bool,
    /// Explicit output size; used only when both axes are positive
    pub resize: Option<Dimensions>,
    pub stretch_x: f32,
    pub stretch_y: f32,
    /// Frame rate override; used only when positive
    pub fps_override: Option<f64>,
    pub scale_algorithm: ScaleAlgorithm,
    pub naming: NamingScheme,
    pub cdng_variant: u8,
    pub source_base_name: String,
    pub hardware_api: HardwareApi,
    pub force_hardware: bool,
    pub force_software: bool,
}

impl Default for ExportRequest {
    fn default() -> Self {
        Self {
            codec: ExportCodec::CinemaDng,
            prores_profile: ProResProfile::Hq,
            prores_encoder: ProResEncoder::Ks,
            h264_quality: Quality::High,
            h264_container: VideoContainer::Mov,
            h265_bit_depth: H265BitDepth::Ten,
            h265_quality: Quality::High,
            h265_container: VideoContainer::Mov,
            png_bit_depth: PngBitDepth::Sixteen,
            dnxhr_profile: DnxhrProfile::Hq,
            dnxhd_profile: DnxhdProfile::P1080Ten,
            vp9_quality: Vp9Quality::Good,
            include_audio: true,
            resize: None,
            stretch_x: 1.0,
            stretch_y: 1.0,
            fps_override: None,
            scale_algorithm: ScaleAlgorithm::Bicubic,
            naming: NamingScheme::Sequential,
            cdng_variant: 0,
            source_base_name: String::new(),
            hardware_api: HardwareApi::platform_default(),
            force_hardware: false,
            force_software: false,
        }
    }
}

impl ExportRequest {
    /// Create a request for a codec and source base name with default options
    pub fn new(codec: ExportCodec, source_base_name: impl Into<String>) -> Self {
        Self {
            codec,
            source_base_name: source_base_name.into(),
            ..Self::default()
        }
    }

    /// Derive the base name from a source file name by stripping its extension
    pub fn base_name_from_file(file_name: &str) -> String {
        let name = file_name
            .rsplit(|c| c == '/' || c == '\\')
            .next()
            .unwrap_or(file_name);
        match name.rfind('.') {
            Some(dot) if dot > 0 => name[..dot].to_string(),
            _ => name.to_string(),
        }
    }

    pub fn with_audio(mut self, include_audio: bool) -> Self {
        self.include_audio = include_audio;
        self
    }

    pub fn with_resize(mut self, width: u32, height: u32) -> Self {
        self.resize = Some(Dimensions::new(width, height));
        self
    }

    pub fn with_stretch(mut self, stretch_x: f32, stretch_y: f32) -> Self {
        self.stretch_x = stretch_x;
        self.stretch_y = stretch_y;
        self
    }

    pub fn with_fps_override(mut self, fps: f64) -> Self {
        self.fps_override = Some(fps);
        self
    }

    pub fn with_force_hardware(mut self) -> Self {
        self.force_hardware = true;
        self
    }

    pub fn with_force_software(mut self) -> Self {
        self.force_software = true;
        self
    }

    pub fn with_hardware_api(mut self, api: HardwareApi) -> Self {
        self.hardware_api = api;
        self
    }

    pub fn with_naming(mut self, naming: NamingScheme) -> Self {
        self.naming = naming;
        self
    }

    /// Copy of this request addressed at another source clip
    pub fn for_source(&self, source_base_name: impl Into<String>) -> Self {
        Self {
            source_base_name: source_base_name.into(),
            ..self.clone()
        }
    }

    /// Stretch factors with non-positive values treated as identity
    pub fn effective_stretch(&self) -> (f32, f32) {
        let x = if self.stretch_x > 0.0 { self.stretch_x } else { 1.0 };
        let y = if self.stretch_y > 0.0 { self.stretch_y } else { 1.0 };
        (x, y)
    }

    /// Reject requests no export path can satisfy
    pub fn validate(&self) -> ExportResult<()> {
        if self.source_base_name.trim().is_empty() {
            return Err(ExportError::invalid("source base name is empty"));
        }
        if self.source_base_name.contains('/') || self.source_base_name.contains('\\') {
            return Err(ExportError::invalid(format!(
                "source base name '{}' must not contain path separators",
                self.source_base_name
            )));
        }
        if let Some(fps) = self.fps_override {
            if !fps.is_finite() {
                return Err(ExportError::invalid("frame rate override is not a finite number"));
            }
        }
        if !self.stretch_x.is_finite() || !self.stretch_y.is_finite() {
            return Err(ExportError::invalid("stretch factors must be finite"));
        }
        Ok(())
    }
}

/// Horizontal and vertical anamorphic stretch presets
pub mod stretch {
    pub const H_100: f32 = 1.0;
    pub const H_133: f32 = 1.3333;
    pub const H_150: f32 = 1.5;
    pub const H_167: f32 = 1.6667;
    pub const H_175: f32 = 1.75;
    pub const H_180: f32 = 1.8;
    pub const H_200: f32 = 2.0;

    pub const V_100: f32 = 1.0;
    pub const V_167: f32 = 1.6667;
    pub const V_300: f32 = 3.0;
    pub const V_033: f32 = 0.3333;

    /// Tolerance for matching user-entered factors against presets
    pub fn approximately(value: f32, target: f32) -> bool {
        (value - target).abs() < 1e-3
    }
}
