// Video encoder and RGB48 scaler

use std::ffi::c_int;

use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::error::EAGAIN;
use ffmpeg_next::{codec, encoder, ffi, frame, Codec, Dictionary, Packet};

use super::{codec_from_id, from_rational, pixel, rational};
use crate::domain::model::{is_hardware_encoder_name, Dimensions, ScaleAlgorithm};
use crate::error::{ExportError, ExportResult};
use crate::ports::{EncoderConfig, EncoderDescriptor, PictureScaler, VideoEncoder};

pub struct LibavVideoEncoder {
    encoder: encoder::video::Encoder,
    descriptor: EncoderDescriptor,
}

impl LibavVideoEncoder {
    pub(super) fn open(codec: Codec, config: &EncoderConfig) -> Result<Self, ffmpeg_next::Error> {
        let context = codec::context::Context::new_with_codec(codec);
        let mut video = context.encoder().video()?;

        video.set_width(config.width);
        video.set_height(config.height);
        video.set_format(pixel(config.pixel_format));
        video.set_time_base(rational(config.time_base));
        video.set_frame_rate(Some(rational(config.frame_rate)));
        video.set_gop(config.gop);
        video.set_max_b_frames(config.max_b_frames as usize);
        video.set_bit_rate(config.bit_rate as usize);
        video.set_max_bit_rate(config.rc_max_rate as usize);
        if config.global_header {
            video.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        unsafe {
            let ctx = video.as_mut_ptr();
            if config.threads > 0 {
                (*ctx).thread_count = config.threads as c_int;
            }
            if let Some(profile) = config.profile {
                (*ctx).profile = profile;
            }
            if config.rc_buffer_size > 0 {
                (*ctx).rc_buffer_size = c_int::try_from(config.rc_buffer_size).unwrap_or(c_int::MAX);
            }
            if config.bt709 {
                (*ctx).color_primaries = ffi::AVColorPrimaries::AVCOL_PRI_BT709;
                (*ctx).color_trc = ffi::AVColorTransferCharacteristic::AVCOL_TRC_BT709;
                (*ctx).colorspace = ffi::AVColorSpace::AVCOL_SPC_BT709;
                (*ctx).color_range = ffi::AVColorRange::AVCOL_RANGE_MPEG;
            }
        }

        let mut options = Dictionary::new();
        for (key, value) in &config.options {
            options.set(key, value);
        }

        let encoder = video.open_as_with(codec, options)?;
        let name = codec.name().to_string();
        // Report what the opened context settled on
        let (width, height, time_base) = unsafe {
            let ctx = encoder.as_ptr();
            ((*ctx).width, (*ctx).height, (*ctx).time_base)
        };
        let descriptor = EncoderDescriptor {
            hardware: is_hardware_encoder_name(&name),
            name,
            codec: codec_from_id(codec.id()).unwrap_or(config.codec),
            width: width.max(0) as u32,
            height: height.max(0) as u32,
            pixel_format: config.pixel_format,
            time_base: from_rational(time_base.into()),
        };

        Ok(Self { encoder, descriptor })
    }

    pub(super) fn as_ptr(&self) -> *const ffi::AVCodecContext {
        unsafe { self.encoder.as_ptr() }
    }
}

/// Ok(true) for a packet, Ok(false) when more input is needed or the stream ended
pub(super) fn packet_result(result: Result<(), ffmpeg_next::Error>, name: &str) -> ExportResult<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(ffmpeg_next::Error::Eof) => Ok(false),
        Err(ffmpeg_next::Error::Other { errno }) if errno == EAGAIN => Ok(false),
        Err(e) => Err(ExportError::frame(format!("{} failed to produce a packet: {}", name, e))),
    }
}

impl VideoEncoder for LibavVideoEncoder {
    type Picture = frame::Video;
    type Packet = Packet;

    fn descriptor(&self) -> &EncoderDescriptor {
        &self.descriptor
    }

    fn send_picture(&mut self, picture: Option<&frame::Video>) -> ExportResult<()> {
        let result = match picture {
            Some(picture) => self.encoder.send_frame(picture),
            None => self.encoder.send_eof(),
        };
        result.map_err(|e| ExportError::frame(format!("{} rejected a frame: {}", self.descriptor.name, e)))
    }

    fn receive_packet(&mut self, packet: &mut Packet) -> ExportResult<bool> {
        packet_result(self.encoder.receive_packet(packet), &self.descriptor.name)
    }
}

fn scale_flags(algorithm: ScaleAlgorithm) -> scaling::Flags {
    match algorithm {
        ScaleAlgorithm::Bicubic => scaling::Flags::BICUBIC,
        ScaleAlgorithm::Bilinear => scaling::Flags::BILINEAR,
        ScaleAlgorithm::Sinc => scaling::Flags::SINC,
        ScaleAlgorithm::Lanczos => scaling::Flags::LANCZOS,
        ScaleAlgorithm::Spline => scaling::Flags::SPLINE,
    }
}

/// Converts interleaved RGB48 into the encoder's layout; frames are reused
pub struct LibavScaler {
    context: scaling::Context,
    source: frame::Video,
    target: frame::Video,
    width: usize,
    height: usize,
}

impl LibavScaler {
    pub(super) fn new(
        source: Dimensions,
        target: &EncoderDescriptor,
        algorithm: ScaleAlgorithm,
    ) -> ExportResult<Self> {
        let target_format = pixel(target.pixel_format);
        let context = scaling::Context::get(
            Pixel::RGB48LE,
            source.width,
            source.height,
            target_format,
            target.width,
            target.height,
            scale_flags(algorithm),
        )?;

        Ok(Self {
            context,
            source: frame::Video::new(Pixel::RGB48LE, source.width, source.height),
            target: frame::Video::new(target_format, target.width, target.height),
            width: source.width as usize,
            height: source.height as usize,
        })
    }
}

impl PictureScaler for LibavScaler {
    type Picture = frame::Video;

    fn scale(&mut self, rgb48: &[u16], pts: i64) -> ExportResult<&frame::Video> {
        let row_samples = self.width * 3;
        if rgb48.len() < row_samples * self.height {
            return Err(ExportError::frame(format!(
                "frame holds {} samples, expected {}",
                rgb48.len(),
                row_samples * self.height
            )));
        }

        let stride = self.source.stride(0);
        let data = self.source.data_mut(0);
        for (row, samples) in rgb48.chunks_exact(row_samples).take(self.height).enumerate() {
            let line = &mut data[row * stride..row * stride + row_samples * 2];
            for (bytes, sample) in line.chunks_exact_mut(2).zip(samples) {
                bytes.copy_from_slice(&sample.to_le_bytes());
            }
        }

        // The encoder may still reference the previous picture
        let ret = unsafe { ffi::av_frame_make_writable(self.target.as_mut_ptr()) };
        if ret < 0 {
            return Err(ExportError::memory("scaler output frame is not writable"));
        }

        self.context
            .run(&self.source, &mut self.target)
            .map_err(|e| ExportError::frame(format!("scaling failed: {}", e)))?;
        self.target.set_pts(Some(pts));
        Ok(&self.target)
    }
}
