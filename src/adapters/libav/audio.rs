// Audio decode, resample, encode and stream-copy sources

use std::ffi::{c_int, c_void};
use std::path::Path;
use std::ptr;
use std::slice;

use ffmpeg_next::util::error::EAGAIN;
use ffmpeg_next::{codec, decoder, encoder, ffi, format, frame, media, Codec, Packet};
use tracing::debug;

use super::video::packet_result;
use super::{codec_from_id, from_rational, from_sample_format, sample_format};
use crate::audio::samples::{SampleBuffer, SampleFormat, SampleSpec};
use crate::audio::AUDIO_BIT_RATE;
use crate::domain::model::Rational;
use crate::error::{ExportError, ExportResult};
use crate::ports::{AudioCopySource, AudioEncoder, AudioEncoderCaps, AudioInput, PcmFormat};

/// FF_COMPLIANCE_EXPERIMENTAL; the native Opus and Vorbis encoders need it
const COMPLIANCE_EXPERIMENTAL: c_int = -2;

unsafe fn supported_config<T: Copy>(codec: *const ffi::AVCodec, config: ffi::AVCodecConfig) -> Vec<T> {
    let mut values: *const c_void = ptr::null();
    let mut count: c_int = 0;
    let ret = ffi::avcodec_get_supported_config(ptr::null(), codec, config, 0, &mut values, &mut count);
    if ret < 0 || values.is_null() || count <= 0 {
        return Vec::new();
    }
    slice::from_raw_parts(values as *const T, count as usize).to_vec()
}

/// Sample formats and rates an audio encoder accepts
pub(super) fn encoder_caps(codec: Codec) -> Option<AudioEncoderCaps> {
    let (formats, rates) = unsafe {
        let raw = codec.as_ptr();
        (
            supported_config::<ffi::AVSampleFormat>(raw, ffi::AVCodecConfig::AV_CODEC_CONFIG_SAMPLE_FORMAT),
            supported_config::<c_int>(raw, ffi::AVCodecConfig::AV_CODEC_CONFIG_SAMPLE_RATE),
        )
    };

    Some(AudioEncoderCaps {
        name: codec.name().to_string(),
        codec: codec_from_id(codec.id())?,
        sample_formats: formats.into_iter().filter_map(from_sample_format).collect(),
        sample_rates: rates.into_iter().filter(|r| *r > 0).map(|r| r as u32).collect(),
    })
}

/// libswresample context; frees itself on drop
struct Resampler {
    context: *mut ffi::SwrContext,
    output: SampleSpec,
}

impl Resampler {
    fn new(
        input_format: ffi::AVSampleFormat,
        input_rate: c_int,
        input_channels: c_int,
        output: SampleSpec,
    ) -> ExportResult<Self> {
        unsafe {
            let mut in_layout: ffi::AVChannelLayout = std::mem::zeroed();
            let mut out_layout: ffi::AVChannelLayout = std::mem::zeroed();
            ffi::av_channel_layout_default(&mut in_layout, input_channels);
            ffi::av_channel_layout_default(&mut out_layout, output.channels as c_int);

            let mut context: *mut ffi::SwrContext = ptr::null_mut();
            let ret = ffi::swr_alloc_set_opts2(
                &mut context,
                &out_layout,
                sample_format(output.format),
                output.sample_rate as c_int,
                &in_layout,
                input_format,
                input_rate,
                0,
                ptr::null_mut(),
            );
            ffi::av_channel_layout_uninit(&mut in_layout);
            ffi::av_channel_layout_uninit(&mut out_layout);

            if ret < 0 || context.is_null() {
                ffi::swr_free(&mut context);
                return Err(ExportError::memory("resampler allocation failed"));
            }
            let ret = ffi::swr_init(context);
            if ret < 0 {
                ffi::swr_free(&mut context);
                return Err(ExportError::generic(format!(
                    "resampler init failed: {}",
                    ffmpeg_next::Error::from(ret)
                )));
            }

            Ok(Self { context, output })
        }
    }

    /// Convert `count` input samples, or flush when `input` is null
    unsafe fn convert(&mut self, input: *const *const u8, count: c_int, out: &mut SampleBuffer) -> ExportResult<usize> {
        let capacity = ffi::swr_get_out_samples(self.context, count);
        if capacity < 0 {
            return Err(ExportError::frame("resampler rejected its input"));
        }
        let capacity = capacity as usize;
        let stride = self.output.plane_stride();

        let planes = out.planes_mut();
        for plane in planes.iter_mut() {
            plane.resize(capacity * stride, 0);
        }
        let mut pointers: Vec<*mut u8> = planes.iter_mut().map(|plane| plane.as_mut_ptr()).collect();
        let converted = ffi::swr_convert(self.context, pointers.as_mut_ptr(), capacity as c_int, input, count);
        if converted < 0 {
            return Err(ExportError::frame(format!(
                "resampling failed: {}",
                ffmpeg_next::Error::from(converted)
            )));
        }

        let converted = converted as usize;
        for plane in planes.iter_mut() {
            plane.truncate(converted * stride);
        }
        out.set_samples(converted);
        Ok(converted)
    }
}

impl Drop for Resampler {
    fn drop(&mut self) {
        unsafe { ffi::swr_free(&mut self.context) }
    }
}

fn best_audio_stream(input: &format::context::Input) -> ExportResult<usize> {
    input
        .streams()
        .best(media::Type::Audio)
        .map(|stream| stream.index())
        .ok_or_else(|| ExportError::invalid("source has no audio stream"))
}

fn open_input(path: &Path) -> ExportResult<format::context::Input> {
    format::input(&path).map_err(|e| ExportError::io(format!("failed to open {}: {}", path.display(), e)))
}

/// Decoded audio from a file, converted on request
pub struct LibavAudioInput {
    input: format::context::Input,
    stream_index: usize,
    decoder: decoder::Audio,
    decoded: frame::Audio,
    packet: Packet,
    resampler: Option<Resampler>,
    source_format: ffi::AVSampleFormat,
    source: SampleSpec,
    input_drained: bool,
    decoder_drained: bool,
    finished: bool,
}

impl LibavAudioInput {
    pub(super) fn open(path: &Path) -> ExportResult<Self> {
        let input = open_input(path)?;
        let stream_index = best_audio_stream(&input)?;
        let parameters = input
            .stream(stream_index)
            .map(|stream| stream.parameters())
            .ok_or_else(|| ExportError::invalid("audio stream vanished"))?;
        let decoder = codec::context::Context::from_parameters(parameters)?
            .decoder()
            .audio()?;

        let (source_format, rate, channels) = unsafe {
            let ctx = decoder.as_ptr();
            ((*ctx).sample_fmt, (*ctx).sample_rate, (*ctx).ch_layout.nb_channels)
        };
        let format = from_sample_format(source_format)
            .ok_or_else(|| ExportError::invalid(format!("unsupported decoded sample format {:?}", source_format)))?;
        let source = SampleSpec::new(format, rate.max(0) as u32, channels.max(0) as u16);
        debug!(
            "Audio source {}: {} Hz, {} channels, {}",
            path.display(),
            source.sample_rate,
            source.channels,
            format.name()
        );

        Ok(Self {
            input,
            stream_index,
            decoder,
            decoded: frame::Audio::empty(),
            packet: Packet::empty(),
            resampler: None,
            source_format,
            source,
            input_drained: false,
            decoder_drained: false,
            finished: false,
        })
    }

    /// Send the next packet of the audio stream, or end of stream
    fn feed(&mut self) -> ExportResult<()> {
        if self.input_drained {
            self.decoder_drained = true;
            return Ok(());
        }
        loop {
            match self.packet.read(&mut self.input) {
                Ok(()) => {
                    if self.packet.stream() == self.stream_index {
                        return self
                            .decoder
                            .send_packet(&self.packet)
                            .map_err(|e| ExportError::frame(format!("audio decode failed: {}", e)));
                    }
                }
                Err(ffmpeg_next::Error::Eof) => {
                    self.input_drained = true;
                    return self
                        .decoder
                        .send_eof()
                        .map_err(|e| ExportError::frame(format!("audio decoder flush failed: {}", e)));
                }
                Err(e) => return Err(ExportError::io(format!("audio demux failed: {}", e))),
            }
        }
    }
}

impl AudioInput for LibavAudioInput {
    fn source_spec(&self) -> SampleSpec {
        self.source
    }

    fn configure_output(&mut self, target: &SampleSpec) -> ExportResult<()> {
        self.resampler = Some(Resampler::new(
            self.source_format,
            self.source.sample_rate as c_int,
            self.source.channels as c_int,
            *target,
        )?);
        Ok(())
    }

    fn read_samples(&mut self, buffer: &mut SampleBuffer) -> ExportResult<bool> {
        if self.resampler.is_none() {
            return Err(ExportError::invalid("audio output format not configured"));
        }

        loop {
            if self.finished {
                buffer.clear();
                return Ok(false);
            }

            if !self.decoder_drained {
                match self.decoder.receive_frame(&mut self.decoded) {
                    Ok(()) => {
                        let count = self.decoded.samples() as c_int;
                        let input = unsafe { (*self.decoded.as_ptr()).extended_data as *const *const u8 };
                        if let Some(resampler) = self.resampler.as_mut() {
                            if unsafe { resampler.convert(input, count, buffer)? } > 0 {
                                return Ok(true);
                            }
                        }
                    }
                    Err(ffmpeg_next::Error::Eof) => self.decoder_drained = true,
                    Err(ffmpeg_next::Error::Other { errno }) if errno == EAGAIN => self.feed()?,
                    Err(e) => return Err(ExportError::frame(format!("audio decode failed: {}", e))),
                }
                continue;
            }

            // Samples still buffered in the resampler
            self.finished = true;
            if let Some(resampler) = self.resampler.as_mut() {
                if unsafe { resampler.convert(ptr::null(), 0, buffer)? } > 0 {
                    return Ok(true);
                }
            }
        }
    }
}

/// Decode a file's best audio stream to interleaved 16-bit PCM
pub(super) fn decode_pcm16(path: &Path) -> ExportResult<Option<(PcmFormat, Vec<u8>)>> {
    let mut input = match LibavAudioInput::open(path) {
        Ok(input) => input,
        Err(ExportError::InvalidParameters { .. }) => return Ok(None),
        Err(e) => return Err(e),
    };
    let source = input.source_spec();
    let channels = source.channels.max(1);
    let target = SampleSpec::new(SampleFormat::S16, source.sample_rate, channels);
    input.configure_output(&target)?;

    let mut chunk = SampleBuffer::new(target);
    let mut data = Vec::new();
    while input.read_samples(&mut chunk)? {
        data.extend_from_slice(chunk.plane(0));
    }

    let format = PcmFormat {
        channels,
        sample_rate: source.sample_rate,
        bits_per_sample: 16,
    };
    Ok(Some((format, data)))
}

/// Opened audio encoder fed from a reused frame
pub struct LibavAudioEncoder {
    encoder: encoder::audio::Encoder,
    name: String,
    spec: SampleSpec,
    frame_size: usize,
    time_base: Rational,
    frame: frame::Audio,
}

impl LibavAudioEncoder {
    pub(super) fn open(codec: Codec, spec: &SampleSpec, global_header: bool) -> ExportResult<Self> {
        let context = codec::context::Context::new_with_codec(codec);
        let mut audio = context.encoder().audio()?;

        unsafe {
            let ctx = audio.as_mut_ptr();
            (*ctx).sample_fmt = sample_format(spec.format);
            (*ctx).sample_rate = spec.sample_rate as c_int;
            ffi::av_channel_layout_uninit(&mut (*ctx).ch_layout);
            ffi::av_channel_layout_default(&mut (*ctx).ch_layout, spec.channels as c_int);
            (*ctx).bit_rate = AUDIO_BIT_RATE as i64;
            (*ctx).time_base = ffi::AVRational {
                num: 1,
                den: spec.sample_rate as c_int,
            };
            (*ctx).strict_std_compliance = COMPLIANCE_EXPERIMENTAL;
            if global_header {
                (*ctx).flags |= ffi::AV_CODEC_FLAG_GLOBAL_HEADER as c_int;
            }
        }

        let encoder = audio
            .open_as(codec)
            .map_err(|e| ExportError::EncoderInitFailed {
                message: format!("audio encoder {}: {}", codec.name(), e),
            })?;
        let (frame_size, time_base) = unsafe {
            let ctx = encoder.as_ptr();
            ((*ctx).frame_size.max(0) as usize, (*ctx).time_base)
        };
        debug!(
            "Opened audio encoder {} ({} Hz, {} channels, frame size {})",
            codec.name(),
            spec.sample_rate,
            spec.channels,
            frame_size
        );

        Ok(Self {
            encoder,
            name: codec.name().to_string(),
            spec: *spec,
            frame_size,
            time_base: from_rational(time_base.into()),
            frame: frame::Audio::empty(),
        })
    }

    pub(super) fn as_ptr(&self) -> *const ffi::AVCodecContext {
        unsafe { self.encoder.as_ptr() }
    }

    fn fill_frame(&mut self, samples: &SampleBuffer, pts: i64) -> ExportResult<()> {
        if samples.spec() != self.spec {
            return Err(ExportError::frame("audio samples do not match the encoder layout"));
        }
        let bytes = samples.samples() * self.spec.plane_stride();

        unsafe {
            let frame = self.frame.as_mut_ptr();
            ffi::av_frame_unref(frame);
            (*frame).format = sample_format(self.spec.format) as c_int;
            (*frame).nb_samples = samples.samples() as c_int;
            (*frame).sample_rate = self.spec.sample_rate as c_int;
            ffi::av_channel_layout_default(&mut (*frame).ch_layout, self.spec.channels as c_int);
            if ffi::av_frame_get_buffer(frame, 0) < 0 {
                return Err(ExportError::memory("audio frame allocation failed"));
            }
            for (index, plane) in samples.planes().iter().enumerate().take(self.spec.planes()) {
                let target = *(*frame).extended_data.add(index);
                ptr::copy_nonoverlapping(plane.as_ptr(), target, bytes.min(plane.len()));
            }
            (*frame).pts = pts;
        }
        Ok(())
    }
}

impl AudioEncoder for LibavAudioEncoder {
    type Packet = Packet;

    fn spec(&self) -> SampleSpec {
        self.spec
    }

    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn time_base(&self) -> Rational {
        self.time_base
    }

    fn send_samples(&mut self, samples: Option<&SampleBuffer>, pts: i64) -> ExportResult<()> {
        let result = match samples {
            Some(samples) => {
                self.fill_frame(samples, pts)?;
                self.encoder.send_frame(&self.frame)
            }
            None => self.encoder.send_eof(),
        };
        result.map_err(|e| ExportError::frame(format!("{} rejected audio: {}", self.name, e)))
    }

    fn receive_packet(&mut self, packet: &mut Packet) -> ExportResult<bool> {
        packet_result(self.encoder.receive_packet(packet), &self.name)
    }
}

/// Demuxed audio packets for stream copy
pub struct LibavAudioCopy {
    input: format::context::Input,
    stream_index: usize,
    time_base: Rational,
}

impl LibavAudioCopy {
    pub(super) fn open(path: &Path) -> ExportResult<Self> {
        let input = open_input(path)?;
        let stream_index = best_audio_stream(&input)?;
        let time_base = input
            .stream(stream_index)
            .map(|stream| from_rational(stream.time_base()))
            .ok_or_else(|| ExportError::invalid("audio stream vanished"))?;
        Ok(Self {
            input,
            stream_index,
            time_base,
        })
    }

    pub(super) fn parameters_ptr(&self) -> *const ffi::AVCodecParameters {
        unsafe {
            let context = self.input.as_ptr();
            (**(*context).streams.add(self.stream_index)).codecpar
        }
    }

    pub(super) fn source_time_base(&self) -> Rational {
        self.time_base
    }
}

impl AudioCopySource for LibavAudioCopy {
    type Packet = Packet;

    fn time_base(&self) -> Rational {
        self.time_base
    }

    fn read_packet(&mut self, packet: &mut Packet) -> ExportResult<bool> {
        loop {
            match packet.read(&mut self.input) {
                Ok(()) if packet.stream() == self.stream_index => return Ok(true),
                Ok(()) => continue,
                Err(ffmpeg_next::Error::Eof) => return Ok(false),
                Err(e) => return Err(ExportError::io(format!("audio demux failed: {}", e))),
            }
        }
    }
}
