//! In-memory media backend, outputs and clips for driving the export pipeline
//! without a media library. Every fake resource holds a [`Live`] guard so tests
//! can assert that nothing is left open after a job returns.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fs;
use std::io::{self, Cursor, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use raw_export::adapters::LinearDngWriter;
use raw_export::audio::samples::{SampleBuffer, SampleFormat, SampleSpec};
use raw_export::domain::model::{is_hardware_encoder_name, CodecId, Dimensions, Rational, ScaleAlgorithm};
use raw_export::engine::SessionSettings;
use raw_export::error::{ExportError, ExportResult};
use raw_export::io::OutputHandle;
use raw_export::ports::{
    AudioCopySource, AudioEncoder, AudioEncoderCaps, AudioInput, ClipMetadata, EncoderConfig,
    EncoderDescriptor, EncoderLookup, EncoderOpener, MediaBackend, Muxer, OpenFailure, OutputKind,
    OutputProvider, PacketData, PcmFormat, PictureScaler, ProgressSink, RawClip, VideoEncoder,
};
use raw_export::{CancellationToken, Exporter, ExporterSettings, JobControl};

/// Counts resources that are currently alive
#[derive(Debug, Default)]
pub struct Tracker {
    live: AtomicIsize,
    created: AtomicUsize,
}

impl Tracker {
    pub fn live(&self) -> isize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

/// Registered with a [`Tracker`] for as long as it lives
#[derive(Debug)]
pub struct Live(Arc<Tracker>);

impl Live {
    pub fn new(tracker: &Arc<Tracker>) -> Self {
        tracker.live.fetch_add(1, Ordering::SeqCst);
        tracker.created.fetch_add(1, Ordering::SeqCst);
        Live(tracker.clone())
    }
}

impl Drop for Live {
    fn drop(&mut self) {
        self.0.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FakePacket {
    pub data: Vec<u8>,
    pub pts: Option<i64>,
}

impl PacketData for FakePacket {
    fn data(&self) -> &[u8] {
        &self.data
    }

    fn pts(&self) -> Option<i64> {
        self.pts
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FakePicture {
    pub pts: i64,
    pub width: u32,
    pub height: u32,
}

/// Holds back `delay` packets until flushed, like a lookahead or frame-threaded encoder
pub struct FakeEncoder {
    descriptor: EncoderDescriptor,
    pending: VecDeque<FakePacket>,
    delay: usize,
    flushed: bool,
    after_flush: Arc<AtomicUsize>,
    _live: Live,
}

impl VideoEncoder for FakeEncoder {
    type Picture = FakePicture;
    type Packet = FakePacket;

    fn descriptor(&self) -> &EncoderDescriptor {
        &self.descriptor
    }

    fn send_picture(&mut self, picture: Option<&FakePicture>) -> ExportResult<()> {
        let picture = match picture {
            Some(picture) => picture,
            None => {
                self.flushed = true;
                return Ok(());
            }
        };
        if self.flushed {
            return Err(ExportError::frame("picture sent after flush"));
        }
        if (picture.width, picture.height) != (self.descriptor.width, self.descriptor.height) {
            return Err(ExportError::frame(format!(
                "picture is {}x{}, encoder expects {}x{}",
                picture.width, picture.height, self.descriptor.width, self.descriptor.height
            )));
        }

        let mut data = self.descriptor.name.as_bytes().to_vec();
        data.extend_from_slice(&picture.pts.to_le_bytes());
        self.pending.push_back(FakePacket {
            data,
            pts: Some(picture.pts),
        });
        Ok(())
    }

    fn receive_packet(&mut self, packet: &mut FakePacket) -> ExportResult<bool> {
        if !self.flushed && self.pending.len() <= self.delay {
            return Ok(false);
        }
        match self.pending.pop_front() {
            Some(next) => {
                if self.flushed {
                    self.after_flush.fetch_add(1, Ordering::SeqCst);
                }
                *packet = next;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

pub struct FakeScaler {
    source: Dimensions,
    picture: FakePicture,
    _live: Live,
}

impl PictureScaler for FakeScaler {
    type Picture = FakePicture;

    fn scale(&mut self, rgb48: &[u16], pts: i64) -> ExportResult<&FakePicture> {
        let expected = self.source.pixels() as usize * 3;
        if rgb48.len() != expected {
            return Err(ExportError::frame(format!(
                "scaler got {} samples, expected {}",
                rgb48.len(),
                expected
            )));
        }
        self.picture.pts = pts;
        Ok(&self.picture)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamKind {
    Unbound,
    Video(String),
    Audio(String),
    Copied,
}

/// What one muxer saw, recorded when it is dropped
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MuxRecord {
    pub format: String,
    pub streams: Vec<StreamKind>,
    pub packets: Vec<u64>,
    pub header_written: bool,
    pub trailer_written: bool,
}

impl MuxRecord {
    pub fn packets_of(&self, kind: fn(&StreamKind) -> bool) -> u64 {
        self.streams
            .iter()
            .zip(&self.packets)
            .filter(|(stream, _)| kind(stream))
            .map(|(_, count)| *count)
            .sum()
    }
}

pub fn is_video(stream: &StreamKind) -> bool {
    matches!(stream, StreamKind::Video(_))
}

pub fn is_audio(stream: &StreamKind) -> bool {
    matches!(stream, StreamKind::Audio(_) | StreamKind::Copied)
}

pub struct FakeMuxer {
    record: MuxRecord,
    handle: Box<dyn OutputHandle>,
    refuse_bind: HashSet<String>,
    global_header: bool,
    log: Arc<Mutex<Vec<MuxRecord>>>,
    _live: Live,
}

impl FakeMuxer {
    fn push_stream(&mut self, kind: StreamKind) -> usize {
        self.record.streams.push(kind);
        self.record.packets.push(0);
        self.record.streams.len() - 1
    }
}

impl Drop for FakeMuxer {
    fn drop(&mut self) {
        if let Ok(mut log) = self.log.lock() {
            log.push(self.record.clone());
        }
    }
}

impl Muxer for FakeMuxer {
    type VideoEncoder = FakeEncoder;
    type AudioEncoder = FakeAudioEncoder;
    type AudioCopy = FakeAudioCopy;
    type Packet = FakePacket;

    fn requires_global_header(&self) -> bool {
        self.global_header
    }

    fn new_stream(&mut self) -> ExportResult<usize> {
        Ok(self.push_stream(StreamKind::Unbound))
    }

    fn bind_video_stream(
        &mut self,
        stream: usize,
        encoder: &FakeEncoder,
        _codec_tag: Option<[u8; 4]>,
    ) -> ExportResult<()> {
        let name = encoder.descriptor().name.clone();
        if self.refuse_bind.contains(&name) {
            return Err(ExportError::generic(format!("stream rejected {}", name)));
        }
        match self.record.streams.get_mut(stream) {
            Some(slot) => {
                *slot = StreamKind::Video(name);
                Ok(())
            }
            None => Err(ExportError::invalid(format!("no stream {}", stream))),
        }
    }

    fn add_audio_stream(&mut self, encoder: &FakeAudioEncoder) -> ExportResult<usize> {
        Ok(self.push_stream(StreamKind::Audio(encoder.name.clone())))
    }

    fn add_copied_stream(&mut self, _source: &FakeAudioCopy) -> ExportResult<usize> {
        Ok(self.push_stream(StreamKind::Copied))
    }

    fn write_header(&mut self) -> ExportResult<()> {
        self.handle.write_all(b"HEAD")?;
        self.record.header_written = true;
        Ok(())
    }

    fn write_packet(
        &mut self,
        stream: usize,
        packet: &mut FakePacket,
        _source_time_base: Rational,
    ) -> ExportResult<()> {
        if !self.record.header_written {
            return Err(ExportError::generic("packet written before header"));
        }
        match self.record.streams.get(stream) {
            Some(StreamKind::Unbound) | None => {
                return Err(ExportError::invalid(format!("stream {} is not bound", stream)))
            }
            Some(_) => {}
        }
        self.handle.write_all(&packet.data)?;
        self.record.packets[stream] += 1;
        Ok(())
    }

    fn write_trailer(&mut self) -> ExportResult<()> {
        self.handle.write_all(b"TAIL")?;
        self.handle.flush()?;
        self.record.trailer_written = true;
        Ok(())
    }
}

/// Interleaved 16-bit PCM read back from a staged WAV
fn read_wav(path: &Path) -> ExportResult<(PcmFormat, Vec<u8>)> {
    let bytes = fs::read(path)?;
    if bytes.len() < 44 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(ExportError::generic(format!("{} is not a WAV file", path.display())));
    }
    let format = PcmFormat {
        channels: u16::from_le_bytes([bytes[22], bytes[23]]),
        sample_rate: u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]),
        bits_per_sample: u16::from_le_bytes([bytes[34], bytes[35]]),
    };
    if format.bits_per_sample != 16 {
        return Err(ExportError::generic("only 16-bit WAV is supported"));
    }
    Ok((format, bytes[44..].to_vec()))
}

pub struct FakeAudioInput {
    channels: Vec<Vec<f32>>,
    source: SampleSpec,
    target: Option<SampleSpec>,
    position: usize,
    chunk: usize,
    _live: Live,
}

impl FakeAudioInput {
    /// Odd chunk size so encoder frames never line up with decoder output
    const CHUNK: usize = 1000;

    fn open(path: &Path, tracker: &Arc<Tracker>) -> ExportResult<Self> {
        let (format, data) = read_wav(path)?;
        let count = format.channels.max(1) as usize;
        let mut channels = vec![Vec::new(); count];
        for (index, sample) in data.chunks_exact(2).enumerate() {
            let value = i16::from_le_bytes([sample[0], sample[1]]) as f32 / 32768.0;
            channels[index % count].push(value);
        }
        Ok(Self {
            channels,
            source: SampleSpec::new(SampleFormat::S16, format.sample_rate, format.channels),
            target: None,
            position: 0,
            chunk: Self::CHUNK,
            _live: Live::new(tracker),
        })
    }
}

impl AudioInput for FakeAudioInput {
    fn source_spec(&self) -> SampleSpec {
        self.source
    }

    fn configure_output(&mut self, target: &SampleSpec) -> ExportResult<()> {
        if target.format != SampleFormat::Fltp
            || target.sample_rate != self.source.sample_rate
            || target.channels != self.source.channels
        {
            return Err(ExportError::generic(format!(
                "resampler cannot produce {} Hz {} ch {}",
                target.sample_rate,
                target.channels,
                target.format.name()
            )));
        }
        self.target = Some(*target);
        Ok(())
    }

    fn read_samples(&mut self, buffer: &mut SampleBuffer) -> ExportResult<bool> {
        let target = self
            .target
            .ok_or_else(|| ExportError::invalid("output layout not configured"))?;
        let total = self.channels.first().map(Vec::len).unwrap_or(0);
        if self.position >= total {
            return Ok(false);
        }
        let end = (self.position + self.chunk).min(total);
        let slices: Vec<Vec<f32>> = self
            .channels
            .iter()
            .map(|channel| channel[self.position..end].to_vec())
            .collect();
        *buffer = SampleBuffer::from_f32_planes(target.sample_rate, &slices);
        self.position = end;
        Ok(true)
    }
}

pub struct FakeAudioEncoder {
    name: String,
    spec: SampleSpec,
    frame_size: usize,
    pending: VecDeque<FakePacket>,
    frames: Arc<Mutex<Vec<(i64, usize)>>>,
    _live: Live,
}

impl AudioEncoder for FakeAudioEncoder {
    type Packet = FakePacket;

    fn spec(&self) -> SampleSpec {
        self.spec
    }

    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn time_base(&self) -> Rational {
        Rational::new(1, self.spec.sample_rate as i32)
    }

    fn send_samples(&mut self, samples: Option<&SampleBuffer>, pts: i64) -> ExportResult<()> {
        let samples = match samples {
            Some(samples) => samples,
            None => return Ok(()),
        };
        if samples.spec() != self.spec {
            return Err(ExportError::generic("sample layout does not match the encoder"));
        }
        if self.frame_size > 0 && samples.samples() > self.frame_size {
            return Err(ExportError::generic(format!(
                "{} samples exceed the frame size {}",
                samples.samples(),
                self.frame_size
            )));
        }
        if let Ok(mut frames) = self.frames.lock() {
            frames.push((pts, samples.samples()));
        }
        self.pending.push_back(FakePacket {
            data: vec![0xAA; 16],
            pts: Some(pts),
        });
        Ok(())
    }

    fn receive_packet(&mut self, packet: &mut FakePacket) -> ExportResult<bool> {
        match self.pending.pop_front() {
            Some(next) => {
                *packet = next;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

pub struct FakeAudioCopy {
    packets: VecDeque<FakePacket>,
    time_base: Rational,
    _live: Live,
}

impl FakeAudioCopy {
    const PACKET_BYTES: usize = 4096;

    fn open(path: &Path, tracker: &Arc<Tracker>) -> ExportResult<Self> {
        let (format, data) = read_wav(path)?;
        let block = format.block_align().max(1) as usize;
        let packets = data
            .chunks(Self::PACKET_BYTES)
            .enumerate()
            .map(|(index, chunk)| FakePacket {
                data: chunk.to_vec(),
                pts: Some((index * Self::PACKET_BYTES / block) as i64),
            })
            .collect();
        Ok(Self {
            packets,
            time_base: Rational::new(1, format.sample_rate as i32),
            _live: Live::new(tracker),
        })
    }
}

impl AudioCopySource for FakeAudioCopy {
    type Packet = FakePacket;

    fn time_base(&self) -> Rational {
        self.time_base
    }

    fn read_packet(&mut self, packet: &mut FakePacket) -> ExportResult<bool> {
        match self.packets.pop_front() {
            Some(next) => {
                *packet = next;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Media backend with a configurable set of encoders
pub struct FakeBackend {
    encoders: HashSet<String>,
    generic: HashMap<CodecId, String>,
    failing: HashMap<String, i32>,
    refuse_bind: HashSet<String>,
    audio_encoders: Vec<(AudioEncoderCaps, usize)>,
    audio_input_fails: bool,
    delay: usize,
    frame_threading: bool,
    tracker: Arc<Tracker>,
    opens: Arc<Mutex<Vec<String>>>,
    open_threads: Arc<Mutex<Vec<usize>>>,
    after_flush: Arc<AtomicUsize>,
    muxes: Arc<Mutex<Vec<MuxRecord>>>,
    audio_frames: Arc<Mutex<Vec<(i64, usize)>>>,
}

impl FakeBackend {
    /// Every software encoder the presets name, plus AAC and Opus
    pub fn new() -> Self {
        let generic: HashMap<CodecId, String> = [
            (CodecId::H264, "libx264"),
            (CodecId::Hevc, "libx265"),
            (CodecId::ProRes, "prores_ks"),
            (CodecId::DnxHd, "dnxhd"),
            (CodecId::Vp9, "libvpx-vp9"),
            (CodecId::Tiff, "tiff"),
            (CodecId::Png, "png"),
            (CodecId::Jpeg2000, "jpeg2000"),
        ]
        .into_iter()
        .map(|(codec, name)| (codec, name.to_string()))
        .collect();

        let mut encoders: HashSet<String> = generic.values().cloned().collect();
        encoders.insert("prores_aw".to_string());

        let audio_caps = |name: &str, codec: CodecId, rates: Vec<u32>| AudioEncoderCaps {
            name: name.to_string(),
            codec,
            sample_formats: vec![SampleFormat::Fltp],
            sample_rates: rates,
        };

        Self {
            encoders,
            generic,
            failing: HashMap::new(),
            refuse_bind: HashSet::new(),
            audio_encoders: vec![
                (audio_caps("aac", CodecId::Aac, Vec::new()), 1024),
                (audio_caps("libopus", CodecId::Opus, vec![48_000]), 960),
            ],
            audio_input_fails: false,
            delay: 0,
            frame_threading: false,
            tracker: Arc::new(Tracker::default()),
            opens: Arc::new(Mutex::new(Vec::new())),
            open_threads: Arc::new(Mutex::new(Vec::new())),
            after_flush: Arc::new(AtomicUsize::new(0)),
            muxes: Arc::new(Mutex::new(Vec::new())),
            audio_frames: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_encoder(mut self, name: &str) -> Self {
        self.encoders.insert(name.to_string());
        self
    }

    pub fn without_encoder(mut self, name: &str) -> Self {
        self.encoders.remove(name);
        self
    }

    /// Resolve the by-codec lookup for `codec` to `name`
    pub fn with_generic(mut self, codec: CodecId, name: &str) -> Self {
        self.generic.insert(codec, name.to_string());
        self.encoders.insert(name.to_string());
        self
    }

    /// `name` is found but fails to open with `errno`
    pub fn failing(mut self, name: &str, errno: i32) -> Self {
        self.encoders.insert(name.to_string());
        self.failing.insert(name.to_string(), errno);
        self
    }

    /// Muxers reject streams bound to `name`
    pub fn refusing_bind(mut self, name: &str) -> Self {
        self.refuse_bind.insert(name.to_string());
        self
    }

    pub fn without_audio_encoders(mut self) -> Self {
        self.audio_encoders.clear();
        self
    }

    pub fn with_broken_audio_input(mut self) -> Self {
        self.audio_input_fails = true;
        self
    }

    /// Video encoders return nothing for their first `frames` pictures
    pub fn with_encoder_delay(mut self, frames: usize) -> Self {
        self.delay = frames;
        self
    }

    /// Video encoders hold back one picture per extra thread, as frame threading does
    pub fn with_frame_threading(mut self) -> Self {
        self.frame_threading = true;
        self
    }

    pub fn live_resources(&self) -> isize {
        self.tracker.live()
    }

    /// Encoder names passed to every open call, in order
    pub fn open_calls(&self) -> Vec<String> {
        self.opens.lock().map(|opens| opens.clone()).unwrap_or_default()
    }

    /// Thread count requested by every successful video encoder open
    pub fn open_threads(&self) -> Vec<usize> {
        self.open_threads
            .lock()
            .map(|threads| threads.clone())
            .unwrap_or_default()
    }

    /// Video packets handed out after the encoder was flushed
    pub fn packets_after_flush(&self) -> usize {
        self.after_flush.load(Ordering::SeqCst)
    }

    pub fn mux_records(&self) -> Vec<MuxRecord> {
        self.muxes.lock().map(|muxes| muxes.clone()).unwrap_or_default()
    }

    /// `(pts, samples)` of every audio frame sent to an encoder
    pub fn audio_frames(&self) -> Vec<(i64, usize)> {
        self.audio_frames
            .lock()
            .map(|frames| frames.clone())
            .unwrap_or_default()
    }
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl EncoderOpener for FakeBackend {
    type Encoder = FakeEncoder;

    fn find_encoder(&self, lookup: &EncoderLookup) -> Option<String> {
        let name = match lookup {
            EncoderLookup::Name(name) => name.clone(),
            EncoderLookup::Codec(codec) => self.generic.get(codec)?.clone(),
        };
        self.encoders.contains(&name).then_some(name)
    }

    fn open_video_encoder(
        &self,
        lookup: &EncoderLookup,
        config: &EncoderConfig,
    ) -> Result<FakeEncoder, OpenFailure> {
        let name = self
            .find_encoder(lookup)
            .ok_or_else(|| OpenFailure::new(-2, "encoder not found"))?;
        if let Ok(mut opens) = self.opens.lock() {
            opens.push(name.clone());
        }
        if let Some(errno) = self.failing.get(&name) {
            return Err(OpenFailure::new(*errno, format!("{} refused to open", name)));
        }

        let hardware = is_hardware_encoder_name(&name);
        if hardware && (config.width % 2 != 0 || config.height % 2 != 0) {
            return Err(OpenFailure::new(-22, "hardware surfaces need even dimensions"));
        }
        if let Ok(mut threads) = self.open_threads.lock() {
            threads.push(config.threads);
        }
        let mut delay = self.delay;
        if self.frame_threading && !hardware {
            delay = delay.max(config.threads.saturating_sub(1));
        }

        Ok(FakeEncoder {
            descriptor: EncoderDescriptor {
                name,
                hardware,
                codec: config.codec,
                width: config.width,
                height: config.height,
                pixel_format: config.pixel_format,
                time_base: config.time_base,
            },
            pending: VecDeque::new(),
            delay,
            flushed: false,
            after_flush: self.after_flush.clone(),
            _live: Live::new(&self.tracker),
        })
    }
}

impl MediaBackend for FakeBackend {
    type Scaler = FakeScaler;
    type AudioInput = FakeAudioInput;
    type AudioEncoder = FakeAudioEncoder;
    type AudioCopy = FakeAudioCopy;
    type Muxer = FakeMuxer;

    fn new_packet(&self) -> ExportResult<FakePacket> {
        Ok(FakePacket::default())
    }

    fn create_scaler(
        &self,
        source: Dimensions,
        target: &EncoderDescriptor,
        _algorithm: ScaleAlgorithm,
    ) -> ExportResult<FakeScaler> {
        Ok(FakeScaler {
            source,
            picture: FakePicture {
                pts: 0,
                width: target.width,
                height: target.height,
            },
            _live: Live::new(&self.tracker),
        })
    }

    fn create_muxer(&self, format: &str, handle: Box<dyn OutputHandle>) -> ExportResult<FakeMuxer> {
        Ok(FakeMuxer {
            record: MuxRecord {
                format: format.to_string(),
                ..MuxRecord::default()
            },
            handle,
            refuse_bind: self.refuse_bind.clone(),
            global_header: self.format_requires_global_header(format),
            log: self.muxes.clone(),
            _live: Live::new(&self.tracker),
        })
    }

    fn format_requires_global_header(&self, format: &str) -> bool {
        matches!(format, "mov" | "mp4" | "matroska")
    }

    fn find_audio_encoder(&self, lookup: &EncoderLookup) -> Option<AudioEncoderCaps> {
        self.audio_encoders
            .iter()
            .map(|(caps, _)| caps)
            .find(|caps| match lookup {
                EncoderLookup::Name(name) => &caps.name == name,
                EncoderLookup::Codec(codec) => caps.codec == *codec,
            })
            .cloned()
    }

    fn open_audio_encoder(
        &self,
        caps: &AudioEncoderCaps,
        spec: &SampleSpec,
        _global_header: bool,
    ) -> ExportResult<FakeAudioEncoder> {
        let frame_size = self
            .audio_encoders
            .iter()
            .find(|(known, _)| known.name == caps.name)
            .map(|(_, frame_size)| *frame_size)
            .ok_or_else(|| ExportError::CodecUnavailable {
                message: format!("audio encoder {} not found", caps.name),
            })?;
        Ok(FakeAudioEncoder {
            name: caps.name.clone(),
            spec: *spec,
            frame_size,
            pending: VecDeque::new(),
            frames: self.audio_frames.clone(),
            _live: Live::new(&self.tracker),
        })
    }

    fn open_audio_input(&self, path: &Path) -> ExportResult<FakeAudioInput> {
        if self.audio_input_fails {
            return Err(ExportError::generic("no decoder for the staged audio"));
        }
        FakeAudioInput::open(path, &self.tracker)
    }

    fn open_audio_copy(&self, path: &Path) -> ExportResult<FakeAudioCopy> {
        FakeAudioCopy::open(path, &self.tracker)
    }
}

/// Seekable in-memory file, stored in the provider when dropped
pub struct MemoryHandle {
    name: String,
    buffer: Cursor<Vec<u8>>,
    files: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
    _live: Live,
}

impl Write for MemoryHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemoryHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.buffer.seek(pos)
    }
}

impl Drop for MemoryHandle {
    fn drop(&mut self) {
        if let Ok(mut files) = self.files.lock() {
            files.insert(self.name.clone(), std::mem::take(self.buffer.get_mut()));
        }
    }
}

/// Output provider keeping every file in memory
pub struct MemoryOutputs {
    files: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
    unsupported: HashSet<OutputKind>,
    acquired: Vec<(OutputKind, String)>,
    frame_indices: Vec<u32>,
    tracker: Arc<Tracker>,
}

impl MemoryOutputs {
    pub fn new() -> Self {
        Self {
            files: Arc::new(Mutex::new(BTreeMap::new())),
            unsupported: HashSet::new(),
            acquired: Vec::new(),
            frame_indices: Vec::new(),
            tracker: Arc::new(Tracker::default()),
        }
    }

    pub fn without(mut self, kind: OutputKind) -> Self {
        self.unsupported.insert(kind);
        self
    }

    pub fn names(&self) -> Vec<String> {
        self.files
            .lock()
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn file(&self, name: &str) -> Option<Vec<u8>> {
        self.files.lock().ok().and_then(|files| files.get(name).cloned())
    }

    pub fn acquired(&self, kind: OutputKind) -> usize {
        self.acquired.iter().filter(|(k, _)| *k == kind).count()
    }

    pub fn frame_indices(&self) -> &[u32] {
        &self.frame_indices
    }

    pub fn open_handles(&self) -> isize {
        self.tracker.live()
    }

    fn handle(&mut self, kind: OutputKind, name: &str) -> ExportResult<Box<dyn OutputHandle>> {
        if self.unsupported.contains(&kind) {
            return Err(ExportError::io(format!("cannot create {}", name)));
        }
        self.acquired.push((kind, name.to_string()));
        Ok(Box::new(MemoryHandle {
            name: name.to_string(),
            buffer: Cursor::new(Vec::new()),
            files: self.files.clone(),
            _live: Live::new(&self.tracker),
        }))
    }
}

impl Default for MemoryOutputs {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputProvider for MemoryOutputs {
    fn supports(&self, kind: OutputKind) -> bool {
        !self.unsupported.contains(&kind)
    }

    fn acquire_frame_output(&mut self, frame_index: u32, relative_name: &str) -> ExportResult<Box<dyn OutputHandle>> {
        self.frame_indices.push(frame_index);
        self.handle(OutputKind::Frame, relative_name)
    }

    fn acquire_container_output(&mut self, relative_name: &str) -> ExportResult<Box<dyn OutputHandle>> {
        self.handle(OutputKind::Container, relative_name)
    }

    fn acquire_audio_output(&mut self, relative_name: &str) -> ExportResult<Box<dyn OutputHandle>> {
        self.handle(OutputKind::Audio, relative_name)
    }
}

/// Clip whose frames are a flat fill; cheap at any resolution
pub struct FlatClip {
    width: u32,
    height: u32,
    frames: u32,
    frame_rate: f64,
    cancel_at: Option<(u32, CancellationToken)>,
    decoded: Arc<AtomicUsize>,
}

impl FlatClip {
    pub fn new(width: u32, height: u32, frames: u32, frame_rate: f64) -> Self {
        Self {
            width,
            height,
            frames,
            frame_rate,
            cancel_at: None,
            decoded: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Cancel `token` while decoding frame `index`
    pub fn cancelling_at(mut self, index: u32, token: CancellationToken) -> Self {
        self.cancel_at = Some((index, token));
        self
    }

    pub fn decoded(&self) -> Arc<AtomicUsize> {
        self.decoded.clone()
    }
}

impl RawClip for FlatClip {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn frame_count(&self) -> u32 {
        self.frames
    }

    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn metadata(&self) -> ClipMetadata {
        ClipMetadata::default()
    }

    fn processed_frame16(&mut self, index: u32, _cores: usize, buffer: &mut [u16]) -> ExportResult<()> {
        if index >= self.frames {
            return Err(ExportError::invalid(format!("frame {} out of range", index)));
        }
        if buffer.len() != self.width as usize * self.height as usize * 3 {
            return Err(ExportError::frame("frame buffer has the wrong size"));
        }
        if let Some((at, token)) = &self.cancel_at {
            if *at == index {
                token.cancel();
            }
        }
        buffer.fill((index % 0x1_0000) as u16);
        self.decoded.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn audio_format(&self) -> Option<PcmFormat> {
        None
    }

    fn read_audio(&mut self) -> ExportResult<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// Records every delivered percentage
#[derive(Debug, Default)]
pub struct RecordingSink {
    values: Mutex<Vec<u8>>,
}

impl RecordingSink {
    pub fn values(&self) -> Vec<u8> {
        self.values.lock().map(|values| values.clone()).unwrap_or_default()
    }
}

impl ProgressSink for RecordingSink {
    fn on_progress(&self, percent: u8) {
        if let Ok(mut values) = self.values.lock() {
            values.push(percent);
        }
    }
}

/// Job control with a recording sink
pub fn recorded_control() -> (JobControl, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    (JobControl::new(CancellationToken::new(), sink.clone()), sink)
}

pub fn exporter(backend: FakeBackend, staging: &Path) -> Exporter<FakeBackend, LinearDngWriter> {
    Exporter::new(
        backend,
        LinearDngWriter::new(1),
        ExporterSettings {
            session: SessionSettings {
                threads: 2,
                decode_cores: 1,
            },
            audio_staging: Some(staging.to_path_buf()),
        },
    )
}

/// Progress values must rise strictly and end at a single 100
pub fn assert_progress_completes(values: &[u8]) {
    assert!(!values.is_empty(), "no progress reported");
    assert!(
        values.windows(2).all(|pair| pair[0] < pair[1]),
        "progress not strictly increasing: {:?}",
        values
    );
    assert_eq!(values.last(), Some(&100));
    assert_eq!(values.iter().filter(|v| **v == 100).count(), 1);
}
