// RawClip over any file libavformat can demux, decoded to RGB48

use std::path::{Path, PathBuf};

use chrono::DateTime;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::error::EAGAIN;
use ffmpeg_next::{codec, decoder, format, frame, media, Packet};
use tracing::{debug, warn};

use super::audio::decode_pcm16;
use crate::error::{ExportError, ExportResult};
use crate::ports::{ClipMetadata, PcmFormat, RawClip};

const CAMERA_TAGS: [&str; 3] = ["com.apple.quicktime.model", "model", "com.android.model"];

/// Sequential decoder; reopened when a caller seeks backwards
struct VideoDecodeState {
    input: format::context::Input,
    stream_index: usize,
    decoder: decoder::Video,
    scaler: scaling::Context,
    decoded: frame::Video,
    rgb: frame::Video,
    packet: Packet,
    input_drained: bool,
    next_index: u32,
}

// Every libav object here is owned by this state and used from one thread at a time
unsafe impl Send for VideoDecodeState {}

impl VideoDecodeState {
    fn open(path: &Path, cores: usize) -> ExportResult<Self> {
        let input = format::input(&path)
            .map_err(|e| ExportError::io(format!("failed to open {}: {}", path.display(), e)))?;
        let stream = input
            .streams()
            .best(media::Type::Video)
            .ok_or_else(|| ExportError::invalid(format!("{} has no video stream", path.display())))?;
        let stream_index = stream.index();

        let mut context = codec::context::Context::from_parameters(stream.parameters())?;
        if cores > 0 {
            unsafe {
                (*context.as_mut_ptr()).thread_count = cores as i32;
            }
        }
        let decoder = context.decoder().video()?;
        let (width, height) = (decoder.width(), decoder.height());
        let scaler = scaling::Context::get(
            decoder.format(),
            width,
            height,
            Pixel::RGB48LE,
            width,
            height,
            scaling::Flags::BILINEAR,
        )?;

        Ok(Self {
            input,
            stream_index,
            decoder,
            scaler,
            decoded: frame::Video::empty(),
            rgb: frame::Video::new(Pixel::RGB48LE, width, height),
            packet: Packet::empty(),
            input_drained: false,
            next_index: 0,
        })
    }

    fn feed(&mut self) -> ExportResult<()> {
        loop {
            match self.packet.read(&mut self.input) {
                Ok(()) if self.packet.stream() == self.stream_index => {
                    return self
                        .decoder
                        .send_packet(&self.packet)
                        .map_err(|e| ExportError::frame(format!("video decode failed: {}", e)));
                }
                Ok(()) => continue,
                Err(ffmpeg_next::Error::Eof) => {
                    self.input_drained = true;
                    return self
                        .decoder
                        .send_eof()
                        .map_err(|e| ExportError::frame(format!("video decoder flush failed: {}", e)));
                }
                Err(e) => return Err(ExportError::io(format!("video demux failed: {}", e))),
            }
        }
    }

    /// Decode the next picture; `false` at end of stream
    fn decode_next(&mut self) -> ExportResult<bool> {
        loop {
            match self.decoder.receive_frame(&mut self.decoded) {
                Ok(()) => {
                    self.next_index += 1;
                    return Ok(true);
                }
                Err(ffmpeg_next::Error::Eof) => return Ok(false),
                Err(ffmpeg_next::Error::Other { errno }) if errno == EAGAIN => {
                    if self.input_drained {
                        return Ok(false);
                    }
                    self.feed()?;
                }
                Err(e) => return Err(ExportError::frame(format!("video decode failed: {}", e))),
            }
        }
    }

    fn copy_rgb(&mut self, buffer: &mut [u16], width: usize, height: usize) -> ExportResult<()> {
        self.scaler
            .run(&self.decoded, &mut self.rgb)
            .map_err(|e| ExportError::frame(format!("RGB conversion failed: {}", e)))?;

        let row_samples = width * 3;
        let stride = self.rgb.stride(0);
        let data = self.rgb.data(0);
        for (row, target) in buffer.chunks_exact_mut(row_samples).take(height).enumerate() {
            let line = &data[row * stride..row * stride + row_samples * 2];
            for (sample, bytes) in target.iter_mut().zip(line.chunks_exact(2)) {
                *sample = u16::from_le_bytes([bytes[0], bytes[1]]);
            }
        }
        Ok(())
    }
}

/// Clip backed by an ordinary media file
pub struct MediaFileClip {
    path: PathBuf,
    width: u32,
    height: u32,
    frame_count: u32,
    frame_rate: f64,
    metadata: ClipMetadata,
    audio: Option<PcmFormat>,
    state: Option<VideoDecodeState>,
}

impl MediaFileClip {
    pub fn open(path: impl AsRef<Path>) -> ExportResult<Self> {
        let path = path.as_ref().to_path_buf();
        let input = format::input(&path)
            .map_err(|e| ExportError::io(format!("failed to open {}: {}", path.display(), e)))?;

        let video = input
            .streams()
            .best(media::Type::Video)
            .ok_or_else(|| ExportError::invalid(format!("{} has no video stream", path.display())))?;
        let (width, height) = unsafe {
            let parameters = video.parameters();
            let raw = parameters.as_ptr();
            ((*raw).width.max(0) as u32, (*raw).height.max(0) as u32)
        };
        let rate = video.avg_frame_rate();
        let frame_rate = if rate.denominator() != 0 {
            f64::from(rate)
        } else {
            0.0
        };
        let frame_count = estimate_frame_count(video.frames(), input.duration(), frame_rate);

        let audio = input.streams().best(media::Type::Audio).map(|stream| unsafe {
            let parameters = stream.parameters();
            let raw = parameters.as_ptr();
            PcmFormat {
                channels: ((*raw).ch_layout.nb_channels.max(1)) as u16,
                sample_rate: (*raw).sample_rate.max(0) as u32,
                bits_per_sample: 16,
            }
        });

        let tags = input.metadata();
        let metadata = ClipMetadata {
            camera: CAMERA_TAGS.iter().find_map(|tag| tags.get(tag)).map(str::to_string),
            lens: None,
            iso: None,
            capture_date: tags
                .get("creation_time")
                .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
                .map(|date| date.date_naive()),
        };

        debug!(
            "Opened {}: {}x{} @ {:.3} fps, {} frames, audio: {}",
            path.display(),
            width,
            height,
            frame_rate,
            frame_count,
            audio.is_some()
        );

        Ok(Self {
            path,
            width,
            height,
            frame_count,
            frame_rate,
            metadata,
            audio,
            state: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn estimate_frame_count(stream_frames: i64, duration_us: i64, frame_rate: f64) -> u32 {
    if stream_frames > 0 {
        return u32::try_from(stream_frames).unwrap_or(u32::MAX);
    }
    if duration_us > 0 && frame_rate > 0.0 {
        let seconds = duration_us as f64 / f64::from(ffmpeg_next::ffi::AV_TIME_BASE);
        return (seconds * frame_rate).round() as u32;
    }
    0
}

impl RawClip for MediaFileClip {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn frame_count(&self) -> u32 {
        self.frame_count
    }

    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn metadata(&self) -> ClipMetadata {
        self.metadata.clone()
    }

    fn processed_frame16(&mut self, index: u32, cores: usize, buffer: &mut [u16]) -> ExportResult<()> {
        let (width, height) = (self.width as usize, self.height as usize);
        if buffer.len() < width * height * 3 {
            return Err(ExportError::invalid("frame buffer too small"));
        }

        let rewind = self.state.as_ref().map_or(true, |state| state.next_index > index);
        if rewind {
            if self.state.is_some() {
                warn!("Seeking backwards to frame {}, restarting decode", index);
            }
            self.state = Some(VideoDecodeState::open(&self.path, cores)?);
        }
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| ExportError::generic("decoder state missing"))?;

        while state.next_index <= index {
            if !state.decode_next()? {
                return Err(ExportError::frame(format!(
                    "frame {} is past the end of {}",
                    index,
                    self.path.display()
                )));
            }
        }
        state.copy_rgb(buffer, width, height)
    }

    fn audio_format(&self) -> Option<PcmFormat> {
        self.audio
    }

    fn read_audio(&mut self) -> ExportResult<Vec<u8>> {
        match decode_pcm16(&self.path)? {
            Some((_, data)) => Ok(data),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_count_prefers_stream_count() {
        assert_eq!(estimate_frame_count(120, 0, 0.0), 120);
        assert_eq!(estimate_frame_count(0, 2_000_000, 24.0), 48);
        assert_eq!(estimate_frame_count(0, 0, 24.0), 0);
    }
}
