//! Media backend on libavcodec/libavformat/libswscale/libswresample
//!
//! Safe `ffmpeg-next` wrappers cover encoder lookup, open, send/receive,
//! scaling and packet muxing. The few knobs they do not expose (thread count,
//! profile, colour description, rate-control buffer, channel layouts, custom
//! I/O) are set through `ffmpeg_next::ffi`.

mod audio;
mod avio;
mod clip;
mod muxer;
mod video;

use std::ffi::CString;
use std::path::Path;

use ffmpeg_next::codec::Id;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::{ffi, Codec, Packet};
use tracing::debug;

use crate::audio::samples::{SampleFormat, SampleSpec};
use crate::domain::model::{CodecId, Dimensions, PixelFormat, Rational, ScaleAlgorithm};
use crate::error::{ExportError, ExportResult};
use crate::io::OutputHandle;
use crate::ports::{
    AudioEncoderCaps, EncoderConfig, EncoderDescriptor, EncoderLookup, EncoderOpener, MediaBackend,
    OpenFailure, PacketData,
};

pub use audio::{LibavAudioCopy, LibavAudioEncoder, LibavAudioInput};
pub use clip::MediaFileClip;
pub use muxer::LibavMuxer;
pub use video::{LibavScaler, LibavVideoEncoder};

/// Errno reported when a lookup finds no encoder
const ENOENT: i32 = -2;

/// Entry point to the media library
#[derive(Debug, Clone, Copy)]
pub struct LibavBackend {
    _initialized: (),
}

impl LibavBackend {
    /// Initialize the library once per process
    pub fn new() -> ExportResult<Self> {
        ffmpeg_next::init()?;
        ffmpeg_next::util::log::set_level(ffmpeg_next::util::log::Level::Error);
        Ok(Self { _initialized: () })
    }
}

impl PacketData for Packet {
    fn data(&self) -> &[u8] {
        Packet::data(self).unwrap_or(&[])
    }

    fn pts(&self) -> Option<i64> {
        Packet::pts(self)
    }
}

pub(crate) fn codec_id(codec: CodecId) -> Id {
    match codec {
        CodecId::ProRes => Id::PRORES,
        CodecId::H264 => Id::H264,
        CodecId::Hevc => Id::HEVC,
        CodecId::DnxHd => Id::DNXHD,
        CodecId::Vp9 => Id::VP9,
        CodecId::Tiff => Id::TIFF,
        CodecId::Png => Id::PNG,
        CodecId::Jpeg2000 => Id::JPEG2000,
        CodecId::Aac => Id::AAC,
        CodecId::Opus => Id::OPUS,
        CodecId::Vorbis => Id::VORBIS,
    }
}

pub(crate) fn codec_from_id(id: Id) -> Option<CodecId> {
    match id {
        Id::PRORES => Some(CodecId::ProRes),
        Id::H264 => Some(CodecId::H264),
        Id::HEVC => Some(CodecId::Hevc),
        Id::DNXHD => Some(CodecId::DnxHd),
        Id::VP9 => Some(CodecId::Vp9),
        Id::TIFF => Some(CodecId::Tiff),
        Id::PNG => Some(CodecId::Png),
        Id::JPEG2000 => Some(CodecId::Jpeg2000),
        Id::AAC => Some(CodecId::Aac),
        Id::OPUS => Some(CodecId::Opus),
        Id::VORBIS => Some(CodecId::Vorbis),
        _ => None,
    }
}

pub(crate) fn pixel(format: PixelFormat) -> Pixel {
    match format {
        PixelFormat::Yuv420p => Pixel::YUV420P,
        PixelFormat::Yuv420p10le => Pixel::YUV420P10LE,
        PixelFormat::Yuv420p12le => Pixel::YUV420P12LE,
        PixelFormat::Yuv422p => Pixel::YUV422P,
        PixelFormat::Yuv422p10le => Pixel::YUV422P10LE,
        PixelFormat::Yuv422p12le => Pixel::YUV422P12LE,
        PixelFormat::Yuv444p => Pixel::YUV444P,
        PixelFormat::Yuv444p10le => Pixel::YUV444P10LE,
        PixelFormat::Yuv444p12le => Pixel::YUV444P12LE,
        PixelFormat::Nv12 => Pixel::NV12,
        PixelFormat::P010le => Pixel::P010LE,
        PixelFormat::Rgb24 => Pixel::RGB24,
        PixelFormat::Rgb48le => Pixel::RGB48LE,
        PixelFormat::Rgb48be => Pixel::RGB48BE,
    }
}

pub(crate) fn rational(value: Rational) -> ffmpeg_next::Rational {
    ffmpeg_next::Rational::new(value.num, value.den)
}

pub(crate) fn from_rational(value: ffmpeg_next::Rational) -> Rational {
    Rational::new(value.numerator(), value.denominator())
}

pub(crate) fn sample_format(format: SampleFormat) -> ffi::AVSampleFormat {
    use ffi::AVSampleFormat::*;
    match format {
        SampleFormat::U8 => AV_SAMPLE_FMT_U8,
        SampleFormat::S16 => AV_SAMPLE_FMT_S16,
        SampleFormat::S32 => AV_SAMPLE_FMT_S32,
        SampleFormat::Flt => AV_SAMPLE_FMT_FLT,
        SampleFormat::Dbl => AV_SAMPLE_FMT_DBL,
        SampleFormat::U8p => AV_SAMPLE_FMT_U8P,
        SampleFormat::S16p => AV_SAMPLE_FMT_S16P,
        SampleFormat::S32p => AV_SAMPLE_FMT_S32P,
        SampleFormat::Fltp => AV_SAMPLE_FMT_FLTP,
        SampleFormat::Dblp => AV_SAMPLE_FMT_DBLP,
    }
}

pub(crate) fn from_sample_format(format: ffi::AVSampleFormat) -> Option<SampleFormat> {
    use ffi::AVSampleFormat::*;
    match format {
        AV_SAMPLE_FMT_U8 => Some(SampleFormat::U8),
        AV_SAMPLE_FMT_S16 => Some(SampleFormat::S16),
        AV_SAMPLE_FMT_S32 => Some(SampleFormat::S32),
        AV_SAMPLE_FMT_FLT => Some(SampleFormat::Flt),
        AV_SAMPLE_FMT_DBL => Some(SampleFormat::Dbl),
        AV_SAMPLE_FMT_U8P => Some(SampleFormat::U8p),
        AV_SAMPLE_FMT_S16P => Some(SampleFormat::S16p),
        AV_SAMPLE_FMT_S32P => Some(SampleFormat::S32p),
        AV_SAMPLE_FMT_FLTP => Some(SampleFormat::Fltp),
        AV_SAMPLE_FMT_DBLP => Some(SampleFormat::Dblp),
        _ => None,
    }
}

pub(crate) fn find_codec(lookup: &EncoderLookup) -> Option<Codec> {
    match lookup {
        EncoderLookup::Name(name) => ffmpeg_next::encoder::find_by_name(name),
        EncoderLookup::Codec(codec) => ffmpeg_next::encoder::find(codec_id(*codec)),
    }
}

fn open_failure(error: ffmpeg_next::Error) -> OpenFailure {
    let errno: i32 = error.into();
    OpenFailure::new(errno, error.to_string())
}

impl EncoderOpener for LibavBackend {
    type Encoder = LibavVideoEncoder;

    fn find_encoder(&self, lookup: &EncoderLookup) -> Option<String> {
        find_codec(lookup).map(|codec| codec.name().to_string())
    }

    fn open_video_encoder(
        &self,
        lookup: &EncoderLookup,
        config: &EncoderConfig,
    ) -> Result<LibavVideoEncoder, OpenFailure> {
        let codec = find_codec(lookup)
            .ok_or_else(|| OpenFailure::new(ENOENT, format!("no encoder for {:?}", lookup)))?;
        LibavVideoEncoder::open(codec, config).map_err(open_failure)
    }
}

impl MediaBackend for LibavBackend {
    type Scaler = LibavScaler;
    type AudioInput = LibavAudioInput;
    type AudioEncoder = LibavAudioEncoder;
    type AudioCopy = LibavAudioCopy;
    type Muxer = LibavMuxer;

    fn new_packet(&self) -> ExportResult<Packet> {
        Ok(Packet::empty())
    }

    fn create_scaler(
        &self,
        source: Dimensions,
        target: &EncoderDescriptor,
        algorithm: ScaleAlgorithm,
    ) -> ExportResult<LibavScaler> {
        LibavScaler::new(source, target, algorithm)
    }

    fn create_muxer(&self, format: &str, handle: Box<dyn OutputHandle>) -> ExportResult<LibavMuxer> {
        LibavMuxer::new(format, handle)
    }

    fn format_requires_global_header(&self, format: &str) -> bool {
        let name = match CString::new(format) {
            Ok(name) => name,
            Err(_) => return false,
        };
        unsafe {
            let output = ffi::av_guess_format(name.as_ptr(), std::ptr::null(), std::ptr::null());
            !output.is_null() && ((*output).flags & ffi::AVFMT_GLOBALHEADER as i32) != 0
        }
    }

    fn find_audio_encoder(&self, lookup: &EncoderLookup) -> Option<AudioEncoderCaps> {
        let codec = find_codec(lookup)?;
        if !codec.is_encoder() || codec.medium() != ffmpeg_next::media::Type::Audio {
            return None;
        }
        let caps = audio::encoder_caps(codec)?;
        debug!("Audio encoder {} available", caps.name);
        Some(caps)
    }

    fn open_audio_encoder(
        &self,
        caps: &AudioEncoderCaps,
        spec: &SampleSpec,
        global_header: bool,
    ) -> ExportResult<LibavAudioEncoder> {
        let codec = ffmpeg_next::encoder::find_by_name(&caps.name).ok_or_else(|| ExportError::CodecUnavailable {
            message: format!("audio encoder {} disappeared", caps.name),
        })?;
        LibavAudioEncoder::open(codec, spec, global_header)
    }

    fn open_audio_input(&self, path: &Path) -> ExportResult<LibavAudioInput> {
        LibavAudioInput::open(path)
    }

    fn open_audio_copy(&self, path: &Path) -> ExportResult<LibavAudioCopy> {
        LibavAudioCopy::open(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_id_mapping_is_reversible() {
        for codec in [
            CodecId::ProRes,
            CodecId::H264,
            CodecId::Hevc,
            CodecId::DnxHd,
            CodecId::Vp9,
            CodecId::Tiff,
            CodecId::Png,
            CodecId::Jpeg2000,
            CodecId::Aac,
            CodecId::Opus,
            CodecId::Vorbis,
        ] {
            assert_eq!(codec_from_id(codec_id(codec)), Some(codec));
        }
    }

    #[test]
    fn test_sample_format_mapping() {
        for format in [SampleFormat::S16, SampleFormat::Fltp, SampleFormat::Dblp] {
            assert_eq!(from_sample_format(sample_format(format)), Some(format));
        }
    }
}
