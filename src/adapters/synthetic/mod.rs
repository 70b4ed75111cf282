// Synthetic clip adapter - deterministic test pattern with an optional tone

use std::f64::consts::PI;

use chrono::NaiveDate;

use crate::error::{ExportError, ExportResult};
use crate::ports::{ClipMetadata, PcmFormat, RawClip};

/// 75% colour bars in 16-bit RGB
const BARS: [[u16; 3]; 8] = [
    [49151, 49151, 49151],
    [49151, 49151, 0],
    [0, 49151, 49151],
    [0, 49151, 0],
    [49151, 0, 49151],
    [49151, 0, 0],
    [0, 0, 49151],
    [0, 0, 0],
];

const TONE_AMPLITUDE: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneSpec {
    pub frequency: f64,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Colour bars over a moving gradient. The bottom third scrolls one step per frame.
#[derive(Debug, Clone)]
pub struct SyntheticClip {
    width: u32,
    height: u32,
    frames: u32,
    frame_rate: f64,
    first_frame: u32,
    tone: Option<ToneSpec>,
    capture_date: Option<NaiveDate>,
}

impl SyntheticClip {
    pub fn new(width: u32, height: u32, frames: u32, frame_rate: f64) -> Self {
        Self {
            width,
            height,
            frames,
            frame_rate,
            first_frame: 0,
            tone: None,
            capture_date: None,
        }
    }

    pub fn with_tone(mut self, frequency: f64, sample_rate: u32, channels: u16) -> Self {
        self.tone = Some(ToneSpec {
            frequency,
            sample_rate,
            channels,
        });
        self
    }

    pub fn with_capture_date(mut self, date: NaiveDate) -> Self {
        self.capture_date = Some(date);
        self
    }

    /// Offset the recorded frame numbers, as a clip cut from a longer take would be
    pub fn with_first_frame(mut self, first_frame: u32) -> Self {
        self.first_frame = first_frame;
        self
    }

    /// Audio length matching the video duration
    pub fn tone_samples(&self) -> usize {
        match self.tone {
            Some(tone) if self.frame_rate > 0.0 => {
                (self.frames as f64 / self.frame_rate * tone.sample_rate as f64).round() as usize
            }
            _ => 0,
        }
    }

    fn pixel(&self, x: u32, y: u32, index: u32) -> [u16; 3] {
        let bars_end = self.height * 2 / 3;
        if y < bars_end {
            let bar = (x as u64 * BARS.len() as u64 / self.width.max(1) as u64) as usize;
            return BARS[bar.min(BARS.len() - 1)];
        }
        let span = self.width.max(1) as u64;
        let position = (x as u64 + index as u64 * 8) % span;
        let level = (position * 65535 / span) as u16;
        [level, level, level]
    }
}

impl RawClip for SyntheticClip {
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

    fn frame_number(&self, index: u32) -> u32 {
        self.first_frame + index
    }

    fn metadata(&self) -> ClipMetadata {
        ClipMetadata {
            camera: Some("Synthetic".to_string()),
            lens: None,
            iso: Some(800),
            capture_date: self.capture_date,
        }
    }

    fn processed_frame16(&mut self, index: u32, _cores: usize, buffer: &mut [u16]) -> ExportResult<()> {
        if index >= self.frames {
            return Err(ExportError::frame(format!(
                "frame {} out of range (clip has {})",
                index, self.frames
            )));
        }
        let row = self.width as usize * 3;
        if buffer.len() < row * self.height as usize {
            return Err(ExportError::invalid("frame buffer too small"));
        }

        for (y, line) in buffer.chunks_exact_mut(row).take(self.height as usize).enumerate() {
            for (x, rgb) in line.chunks_exact_mut(3).enumerate() {
                rgb.copy_from_slice(&self.pixel(x as u32, y as u32, index));
            }
        }
        Ok(())
    }

    fn audio_format(&self) -> Option<PcmFormat> {
        self.tone.map(|tone| PcmFormat {
            channels: tone.channels,
            sample_rate: tone.sample_rate,
            bits_per_sample: 16,
        })
    }

    fn read_audio(&mut self) -> ExportResult<Vec<u8>> {
        let tone = match self.tone {
            Some(tone) => tone,
            None => return Ok(Vec::new()),
        };
        let samples = self.tone_samples();
        let channels = tone.channels.max(1) as usize;

        let mut data = Vec::with_capacity(samples * channels * 2);
        for n in 0..samples {
            let phase = 2.0 * PI * tone.frequency * n as f64 / tone.sample_rate as f64;
            let value = (phase.sin() * TONE_AMPLITUDE * i16::MAX as f64) as i16;
            for _ in 0..channels {
                data.extend_from_slice(&value.to_le_bytes());
            }
        }
        Ok(data)
    }
}
