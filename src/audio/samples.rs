//! Sample formats and owned sample buffers

use serde::Serialize;

/// Audio sample encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    U8,
    S16,
    S32,
    Flt,
    Dbl,
    U8p,
    S16p,
    S32p,
    Fltp,
    Dblp,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::U8 | SampleFormat::U8p => 1,
            SampleFormat::S16 | SampleFormat::S16p => 2,
            SampleFormat::S32 | SampleFormat::S32p | SampleFormat::Flt | SampleFormat::Fltp => 4,
            SampleFormat::Dbl | SampleFormat::Dblp => 8,
        }
    }

    pub fn is_planar(self) -> bool {
        matches!(
            self,
            SampleFormat::U8p
                | SampleFormat::S16p
                | SampleFormat::S32p
                | SampleFormat::Fltp
                | SampleFormat::Dblp
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            SampleFormat::U8 => "u8",
            SampleFormat::S16 => "s16",
            SampleFormat::S32 => "s32",
            SampleFormat::Flt => "flt",
            SampleFormat::Dbl => "dbl",
            SampleFormat::U8p => "u8p",
            SampleFormat::S16p => "s16p",
            SampleFormat::S32p => "s32p",
            SampleFormat::Fltp => "fltp",
            SampleFormat::Dblp => "dblp",
        }
    }
}

/// Sample format, rate and channel count of an audio stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SampleSpec {
    pub format: SampleFormat,
    pub sample_rate: u32,
    pub channels: u16,
}

impl SampleSpec {
    pub fn new(format: SampleFormat, sample_rate: u32, channels: u16) -> Self {
        Self {
            format,
            sample_rate,
            channels,
        }
    }

    /// Number of data planes a buffer in this layout carries
    pub fn planes(&self) -> usize {
        if self.format.is_planar() {
            self.channels.max(1) as usize
        } else {
            1
        }
    }

    /// Bytes one sample occupies within a single plane
    pub fn plane_stride(&self) -> usize {
        if self.format.is_planar() {
            self.format.bytes_per_sample()
        } else {
            self.format.bytes_per_sample() * self.channels.max(1) as usize
        }
    }
}

/// Owned block of samples, one byte vector per plane
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    spec: SampleSpec,
    planes: Vec<Vec<u8>>,
    samples: usize,
}

impl SampleBuffer {
    pub fn new(spec: SampleSpec) -> Self {
        Self {
            spec,
            planes: vec![Vec::new(); spec.planes()],
            samples: 0,
        }
    }

    /// Buffer of `samples` silent samples
    pub fn silence(spec: SampleSpec, samples: usize) -> Self {
        let bytes = samples * spec.plane_stride();
        Self {
            spec,
            planes: vec![vec![0u8; bytes]; spec.planes()],
            samples,
        }
    }

    pub fn spec(&self) -> SampleSpec {
        self.spec
    }

    /// Samples per channel
    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }

    pub fn plane(&self, index: usize) -> &[u8] {
        self.planes.get(index).map(|p| p.as_slice()).unwrap_or(&[])
    }

    pub fn planes(&self) -> &[Vec<u8>] {
        &self.planes
    }

    pub fn clear(&mut self) {
        for plane in &mut self.planes {
            plane.clear();
        }
        self.samples = 0;
    }

    /// Replace the contents with `samples` samples taken from per-plane byte slices
    pub fn fill_from_planes(&mut self, planes: &[&[u8]], samples: usize) {
        self.clear();
        let bytes = samples * self.spec.plane_stride();
        for (target, source) in self.planes.iter_mut().zip(planes) {
            let take = bytes.min(source.len());
            target.extend_from_slice(&source[..take]);
        }
        self.samples = samples;
    }

    /// Build a buffer from planar 32-bit float channels
    pub fn from_f32_planes(sample_rate: u32, channels: &[Vec<f32>]) -> Self {
        let spec = SampleSpec::new(SampleFormat::Fltp, sample_rate, channels.len() as u16);
        let samples = channels.iter().map(|c| c.len()).min().unwrap_or(0);
        let planes = channels
            .iter()
            .map(|channel| {
                channel[..samples]
                    .iter()
                    .flat_map(|s| s.to_le_bytes())
                    .collect::<Vec<u8>>()
            })
            .collect();
        Self {
            spec,
            planes,
            samples,
        }
    }

    pub(crate) fn planes_mut(&mut self) -> &mut Vec<Vec<u8>> {
        &mut self.planes
    }

    pub(crate) fn set_samples(&mut self, samples: usize) {
        self.samples = samples;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_layout() {
        let planar = SampleSpec::new(SampleFormat::Fltp, 48000, 2);
        assert_eq!(planar.planes(), 2);
        assert_eq!(planar.plane_stride(), 4);

        let packed = SampleSpec::new(SampleFormat::S16, 48000, 2);
        assert_eq!(packed.planes(), 1);
        assert_eq!(packed.plane_stride(), 4);
    }

    #[test]
    fn test_silence_and_fill() {
        let spec = SampleSpec::new(SampleFormat::S16p, 44100, 2);
        let silence = SampleBuffer::silence(spec, 10);
        assert_eq!(silence.samples(), 10);
        assert_eq!(silence.plane(1).len(), 20);

        let mut buffer = SampleBuffer::new(spec);
        let left = [1u8; 8];
        let right = [2u8; 8];
        buffer.fill_from_planes(&[&left, &right], 4);
        assert_eq!(buffer.samples(), 4);
        assert_eq!(buffer.plane(1), &[2u8; 8]);
        assert!(buffer.plane(2).is_empty());
    }
}
