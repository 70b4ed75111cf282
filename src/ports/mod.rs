// Ports - Interface definitions (contracts)
//
// The export core talks to four collaborators: the raw decode engine (RawClip),
// the DNG writer, the media codec/container library (EncoderOpener + MediaBackend)
// and the host that hands out output handles (OutputProvider).

use std::path::Path;

use chrono::NaiveDate;
use serde::Serialize;

use crate::audio::samples::{SampleBuffer, SampleFormat, SampleSpec};
use crate::domain::model::*;
use crate::error::ExportResult;
use crate::io::OutputHandle;

/// Output category requested from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    Frame,
    Container,
    Audio,
}

/// Host-supplied factory for output handles
pub trait OutputProvider {
    /// Whether the host can hand out outputs of this kind at all
    fn supports(&self, _kind: OutputKind) -> bool {
        true
    }

    /// Handle for one frame file; `frame_index` is the zero-based export index
    fn acquire_frame_output(
        &mut self,
        frame_index: u32,
        relative_name: &str,
    ) -> ExportResult<Box<dyn OutputHandle>>;

    /// Handle for a single container file
    fn acquire_container_output(&mut self, relative_name: &str) -> ExportResult<Box<dyn OutputHandle>>;

    /// Handle for a standalone audio file
    fn acquire_audio_output(&mut self, relative_name: &str) -> ExportResult<Box<dyn OutputHandle>>;
}

/// Interleaved PCM layout of a clip's embedded audio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PcmFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

impl PcmFormat {
    pub fn block_align(&self) -> u16 {
        self.channels * (self.bits_per_sample / 8)
    }
}

/// Descriptive clip metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClipMetadata {
    pub camera: Option<String>,
    pub lens: Option<String>,
    pub iso: Option<u32>,
    pub capture_date: Option<NaiveDate>,
}

/// Port for the raw decode/debayer engine
pub trait RawClip: Send {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    fn frame_count(&self) -> u32;

    /// Source frame rate; non-positive when unknown
    fn frame_rate(&self) -> f64;

    /// Absolute frame number recorded in the source for an export index
    fn frame_number(&self, index: u32) -> u32 {
        index
    }

    fn metadata(&self) -> ClipMetadata;

    /// Decode one frame as interleaved 16-bit RGB into `buffer` (width * height * 3 samples)
    fn processed_frame16(&mut self, index: u32, cores: usize, buffer: &mut [u16]) -> ExportResult<()>;

    /// PCM layout when the clip carries audio
    fn audio_format(&self) -> Option<PcmFormat>;

    /// The clip's complete audio track as little-endian interleaved PCM bytes
    fn read_audio(&mut self) -> ExportResult<Vec<u8>>;
}

/// Pixel aspect pairs handed to the DNG writer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AspectPairs {
    pub horizontal: (u32, u32),
    pub vertical: (u32, u32),
}

impl AspectPairs {
    pub const SQUARE: AspectPairs = AspectPairs {
        horizontal: (1, 1),
        vertical: (1, 1),
    };
}

/// Per-sequence DNG writer settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DngSettings {
    pub variant: u8,
    pub frame_rate: f64,
    pub aspect: AspectPairs,
}

/// Port for the per-frame DNG writer
pub trait DngWriter {
    type Writer;

    fn init_writer(&self, clip: &dyn RawClip, settings: &DngSettings) -> ExportResult<Self::Writer>;

    fn write_frame(
        &self,
        writer: &mut Self::Writer,
        clip: &mut dyn RawClip,
        frame_index: u32,
        output: &mut dyn OutputHandle,
    ) -> ExportResult<()>;

    fn close_writer(&self, writer: Self::Writer);
}

/// Receiver of job progress percentages
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, percent: u8);
}

/// How an encoder is located in the media library
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EncoderLookup {
    Name(String),
    Codec(CodecId),
}

impl EncoderLookup {
    pub fn name(name: impl Into<String>) -> Self {
        EncoderLookup::Name(name.into())
    }
}

/// Full configuration applied to a video encoder before open
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderConfig {
    pub codec: CodecId,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub time_base: Rational,
    pub frame_rate: Rational,
    pub gop: u32,
    pub max_b_frames: u32,
    pub bit_rate: u64,
    /// Zero leaves rate control limits unset
    pub rc_max_rate: u64,
    pub rc_buffer_size: u64,
    /// Zero leaves the library default
    pub threads: usize,
    pub profile: Option<i32>,
    /// BT.709 primaries, transfer and matrix in limited range
    pub bt709: bool,
    pub global_header: bool,
    /// Encoder private options
    pub options: Vec<(String, String)>,
}

impl EncoderConfig {
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Why an encoder failed to open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenFailure {
    /// Negative errno reported by the library, or -1 when unknown
    pub errno: i32,
    pub message: String,
}

impl OpenFailure {
    pub fn new(errno: i32, message: impl Into<String>) -> Self {
        Self {
            errno,
            message: message.into(),
        }
    }
}

/// Parameters an open encoder actually runs with
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncoderDescriptor {
    pub name: String,
    pub hardware: bool,
    pub codec: CodecId,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub time_base: Rational,
}

/// Encoded payload with timestamps
pub trait PacketData {
    fn data(&self) -> &[u8];
    fn pts(&self) -> Option<i64>;
}

/// An open video encoder
pub trait VideoEncoder {
    type Picture;
    type Packet: PacketData;

    fn descriptor(&self) -> &EncoderDescriptor;

    /// Submit a picture, or `None` to signal end of stream
    fn send_picture(&mut self, picture: Option<&Self::Picture>) -> ExportResult<()>;

    /// Fetch the next packet; `false` when the encoder needs more input or is drained
    fn receive_packet(&mut self, packet: &mut Self::Packet) -> ExportResult<bool>;
}

/// Port for locating and opening video encoders
pub trait EncoderOpener {
    type Encoder: VideoEncoder;

    /// Resolved encoder name when the library provides one for this lookup
    fn find_encoder(&self, lookup: &EncoderLookup) -> Option<String>;

    fn open_video_encoder(
        &self,
        lookup: &EncoderLookup,
        config: &EncoderConfig,
    ) -> Result<Self::Encoder, OpenFailure>;
}

/// Converts interleaved RGB48 frames into encoder pictures
pub trait PictureScaler {
    type Picture;

    fn scale(&mut self, rgb48: &[u16], pts: i64) -> ExportResult<&Self::Picture>;
}

/// Open container being written to one output handle
pub trait Muxer {
    type VideoEncoder;
    type AudioEncoder;
    type AudioCopy;
    type Packet;

    fn requires_global_header(&self) -> bool;

    /// Register an empty stream to be bound later
    fn new_stream(&mut self) -> ExportResult<usize>;

    /// Copy the negotiated encoder parameters onto a stream
    fn bind_video_stream(
        &mut self,
        stream: usize,
        encoder: &Self::VideoEncoder,
        codec_tag: Option<[u8; 4]>,
    ) -> ExportResult<()>;

    fn add_audio_stream(&mut self, encoder: &Self::AudioEncoder) -> ExportResult<usize>;

    fn add_copied_stream(&mut self, source: &Self::AudioCopy) -> ExportResult<usize>;

    fn write_header(&mut self) -> ExportResult<()>;

    /// Rescale from `source_time_base` into the stream's time base and write interleaved
    fn write_packet(
        &mut self,
        stream: usize,
        packet: &mut Self::Packet,
        source_time_base: Rational,
    ) -> ExportResult<()>;

    fn write_trailer(&mut self) -> ExportResult<()>;
}

/// Decoded and resampled audio read from a staged file
pub trait AudioInput {
    /// Layout produced by the decoder
    fn source_spec(&self) -> SampleSpec;

    /// Install a resampler producing `target` samples
    fn configure_output(&mut self, target: &SampleSpec) -> ExportResult<()>;

    /// Next chunk of converted samples; `false` once decoder and resampler are drained
    fn read_samples(&mut self, buffer: &mut SampleBuffer) -> ExportResult<bool>;
}

/// What an audio encoder accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioEncoderCaps {
    pub name: String,
    pub codec: CodecId,
    pub sample_formats: Vec<SampleFormat>,
    /// Empty when the encoder accepts any rate
    pub sample_rates: Vec<u32>,
}

/// An open audio encoder
pub trait AudioEncoder {
    type Packet: PacketData;

    fn spec(&self) -> SampleSpec;

    /// Samples per encode call; zero for variable frame size
    fn frame_size(&self) -> usize;

    fn time_base(&self) -> Rational;

    /// Submit samples stamped with `pts`, or `None` to flush
    fn send_samples(&mut self, samples: Option<&SampleBuffer>, pts: i64) -> ExportResult<()>;

    fn receive_packet(&mut self, packet: &mut Self::Packet) -> ExportResult<bool>;
}

/// Demuxed source audio packets for stream copy
pub trait AudioCopySource {
    type Packet: PacketData;

    fn time_base(&self) -> Rational;

    fn read_packet(&mut self, packet: &mut Self::Packet) -> ExportResult<bool>;
}

pub type PictureOf<B> = <<B as EncoderOpener>::Encoder as VideoEncoder>::Picture;
pub type PacketOf<B> = <<B as EncoderOpener>::Encoder as VideoEncoder>::Packet;

/// Port for the media codec/container library
pub trait MediaBackend: EncoderOpener {
    type Scaler: PictureScaler<Picture = PictureOf<Self>>;
    type AudioInput: AudioInput;
    type AudioEncoder: AudioEncoder<Packet = PacketOf<Self>>;
    type AudioCopy: AudioCopySource<Packet = PacketOf<Self>>;
    type Muxer: Muxer<
        VideoEncoder = Self::Encoder,
        AudioEncoder = Self::AudioEncoder,
        AudioCopy = Self::AudioCopy,
        Packet = PacketOf<Self>,
    >;

    fn new_packet(&self) -> ExportResult<PacketOf<Self>>;

    fn create_scaler(
        &self,
        source: Dimensions,
        target: &EncoderDescriptor,
        algorithm: ScaleAlgorithm,
    ) -> ExportResult<Self::Scaler>;

    /// Allocate a muxer for `format` writing through `handle`
    fn create_muxer(&self, format: &str, handle: Box<dyn OutputHandle>) -> ExportResult<Self::Muxer>;

    /// Whether streams muxed into `format` need global headers
    fn format_requires_global_header(&self, format: &str) -> bool;

    fn find_audio_encoder(&self, lookup: &EncoderLookup) -> Option<AudioEncoderCaps>;

    fn open_audio_encoder(
        &self,
        caps: &AudioEncoderCaps,
        spec: &SampleSpec,
        global_header: bool,
    ) -> ExportResult<Self::AudioEncoder>;

    fn open_audio_input(&self, path: &Path) -> ExportResult<Self::AudioInput>;

    fn open_audio_copy(&self, path: &Path) -> ExportResult<Self::AudioCopy>;
}
