//! Minimal CinemaDNG writer
//!
//! Each frame becomes a little-endian TIFF/EP file holding one uncompressed
//! LinearRaw RGB strip. The writer variant sets how many of the 16 stored bits
//! are significant; the white level follows.

use std::io::Write;

use crate::domain::model::Rational;
use crate::engine::alloc_frame_buffer;
use crate::error::{ExportError, ExportResult};
use crate::io::OutputHandle;
use crate::ports::{AspectPairs, DngSettings, DngWriter, RawClip};

const TYPE_BYTE: u16 = 1;
const TYPE_ASCII: u16 = 2;
const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;
const TYPE_RATIONAL: u16 = 5;
const TYPE_SRATIONAL: u16 = 10;

const PHOTOMETRIC_LINEAR_RAW: u16 = 34892;
const ILLUMINANT_D65: u16 = 21;
const SOFTWARE: &str = concat!("rawexport ", env!("CARGO_PKG_VERSION"));

mod tag {
    pub const NEW_SUBFILE_TYPE: u16 = 254;
    pub const IMAGE_WIDTH: u16 = 256;
    pub const IMAGE_LENGTH: u16 = 257;
    pub const BITS_PER_SAMPLE: u16 = 258;
    pub const COMPRESSION: u16 = 259;
    pub const PHOTOMETRIC: u16 = 262;
    pub const MAKE: u16 = 271;
    pub const MODEL: u16 = 272;
    pub const STRIP_OFFSETS: u16 = 273;
    pub const ORIENTATION: u16 = 274;
    pub const SAMPLES_PER_PIXEL: u16 = 277;
    pub const ROWS_PER_STRIP: u16 = 278;
    pub const STRIP_BYTE_COUNTS: u16 = 279;
    pub const PLANAR_CONFIGURATION: u16 = 284;
    pub const SOFTWARE: u16 = 305;
    pub const DNG_VERSION: u16 = 50706;
    pub const DNG_BACKWARD_VERSION: u16 = 50707;
    pub const UNIQUE_CAMERA_MODEL: u16 = 50708;
    pub const WHITE_LEVEL: u16 = 50717;
    pub const DEFAULT_SCALE: u16 = 50718;
    pub const COLOR_MATRIX_1: u16 = 50721;
    pub const AS_SHOT_NEUTRAL: u16 = 50728;
    pub const CALIBRATION_ILLUMINANT_1: u16 = 50778;
    pub const FRAME_RATE: u16 = 51044;
}

/// Significant bits for a writer variant; out-of-range variants use the last
pub fn significant_bits(variant: u8) -> u16 {
    match variant {
        0 => 16,
        1 => 14,
        _ => 12,
    }
}

/// Per-sequence state: settings plus one reusable frame buffer
pub struct DngSequence {
    width: u32,
    height: u32,
    bits: u16,
    frame_rate: f64,
    aspect: AspectPairs,
    camera: String,
    cores: usize,
    buffer: Vec<u16>,
}

impl DngSequence {
    pub fn bits(&self) -> u16 {
        self.bits
    }
}

/// DngWriter producing LinearRaw CinemaDNG frames
#[derive(Debug, Clone, Copy)]
pub struct LinearDngWriter {
    cores: usize,
}

impl LinearDngWriter {
    pub fn new(cores: usize) -> Self {
        Self { cores: cores.max(1) }
    }
}

impl Default for LinearDngWriter {
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}

impl DngWriter for LinearDngWriter {
    type Writer = DngSequence;

    fn init_writer(&self, clip: &dyn RawClip, settings: &DngSettings) -> ExportResult<DngSequence> {
        let buffer = alloc_frame_buffer(clip.width(), clip.height())?;
        Ok(DngSequence {
            width: clip.width(),
            height: clip.height(),
            bits: significant_bits(settings.variant),
            frame_rate: settings.frame_rate,
            aspect: settings.aspect,
            camera: clip.metadata().camera.unwrap_or_else(|| "Unknown".to_string()),
            cores: self.cores,
            buffer,
        })
    }

    fn write_frame(
        &self,
        writer: &mut DngSequence,
        clip: &mut dyn RawClip,
        frame_index: u32,
        output: &mut dyn OutputHandle,
    ) -> ExportResult<()> {
        let mut buffer = std::mem::take(&mut writer.buffer);
        let decoded = clip.processed_frame16(frame_index, writer.cores, &mut buffer);
        let encoded = decoded.and_then(|()| encode_frame(writer, &buffer));
        writer.buffer = buffer;

        output.write_all(&encoded?)?;
        output.flush()?;
        Ok(())
    }

    fn close_writer(&self, writer: DngSequence) {
        drop(writer);
    }
}

struct Entry {
    tag: u16,
    kind: u16,
    count: u32,
    payload: Vec<u8>,
}

/// IFD under construction; offsets are resolved in `finish`
#[derive(Default)]
struct Ifd {
    entries: Vec<Entry>,
}

impl Ifd {
    fn push(&mut self, tag: u16, kind: u16, count: u32, payload: Vec<u8>) {
        self.entries.push(Entry {
            tag,
            kind,
            count,
            payload,
        });
    }

    fn shorts(&mut self, tag: u16, values: &[u16]) {
        let payload = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.push(tag, TYPE_SHORT, values.len() as u32, payload);
    }

    fn long(&mut self, tag: u16, value: u32) {
        self.push(tag, TYPE_LONG, 1, value.to_le_bytes().to_vec());
    }

    fn bytes(&mut self, tag: u16, values: &[u8]) {
        self.push(tag, TYPE_BYTE, values.len() as u32, values.to_vec());
    }

    fn ascii(&mut self, tag: u16, value: &str) {
        let mut payload: Vec<u8> = value.bytes().filter(|b| *b != 0).collect();
        payload.push(0);
        let count = payload.len() as u32;
        self.push(tag, TYPE_ASCII, count, payload);
    }

    fn rationals(&mut self, tag: u16, values: &[(u32, u32)]) {
        let payload = values
            .iter()
            .flat_map(|(n, d)| n.to_le_bytes().into_iter().chain(d.to_le_bytes()))
            .collect();
        self.push(tag, TYPE_RATIONAL, values.len() as u32, payload);
    }

    fn srationals(&mut self, tag: u16, values: &[(i32, i32)]) {
        let payload = values
            .iter()
            .flat_map(|(n, d)| n.to_le_bytes().into_iter().chain(d.to_le_bytes()))
            .collect();
        self.push(tag, TYPE_SRATIONAL, values.len() as u32, payload);
    }

    /// Serialize header, IFD, image strip and out-of-line values
    fn finish(mut self, image: &[u8]) -> ExportResult<Vec<u8>> {
        self.entries.sort_by_key(|entry| entry.tag);

        let ifd_size = 2 + self.entries.len() * 12 + 4;
        let image_offset = 8 + ifd_size;
        let mut extra_offset = image_offset + image.len();
        extra_offset += extra_offset % 2;

        let mut ifd = Vec::with_capacity(ifd_size);
        let mut extra = Vec::new();
        ifd.extend_from_slice(&(self.entries.len() as u16).to_le_bytes());
        for entry in &self.entries {
            ifd.extend_from_slice(&entry.tag.to_le_bytes());
            ifd.extend_from_slice(&entry.kind.to_le_bytes());
            ifd.extend_from_slice(&entry.count.to_le_bytes());
            if entry.payload.len() <= 4 {
                let mut inline = [0u8; 4];
                inline[..entry.payload.len()].copy_from_slice(&entry.payload);
                ifd.extend_from_slice(&inline);
            } else {
                let offset = offset32(extra_offset + extra.len())?;
                ifd.extend_from_slice(&offset.to_le_bytes());
                extra.extend_from_slice(&entry.payload);
                if extra.len() % 2 == 1 {
                    extra.push(0);
                }
            }
        }
        ifd.extend_from_slice(&0u32.to_le_bytes());

        let mut file = Vec::with_capacity(extra_offset + extra.len());
        file.extend_from_slice(b"II");
        file.extend_from_slice(&42u16.to_le_bytes());
        file.extend_from_slice(&8u32.to_le_bytes());
        file.extend_from_slice(&ifd);
        file.extend_from_slice(image);
        file.resize(extra_offset, 0);
        file.extend_from_slice(&extra);
        Ok(file)
    }
}

fn offset32(offset: usize) -> ExportResult<u32> {
    u32::try_from(offset).map_err(|_| ExportError::invalid("DNG frame exceeds 4 GiB"))
}

fn frame_rate_rational(frame_rate: f64) -> (i32, i32) {
    Rational::approximate(frame_rate, 1001)
        .map(|r| (r.num, r.den))
        .unwrap_or((0, 1))
}

/// Build one DNG file from an interleaved RGB48 frame
fn encode_frame(sequence: &DngSequence, rgb48: &[u16]) -> ExportResult<Vec<u8>> {
    let samples = sequence.width as usize * sequence.height as usize * 3;
    if rgb48.len() < samples {
        return Err(ExportError::frame("decoded frame is shorter than the clip geometry"));
    }
    let shift = 16 - sequence.bits;
    let image: Vec<u8> = rgb48[..samples]
        .iter()
        .flat_map(|sample| (sample >> shift).to_le_bytes())
        .collect();
    let strip_bytes = offset32(image.len())?;

    let mut ifd = Ifd::default();
    ifd.long(tag::NEW_SUBFILE_TYPE, 0);
    ifd.long(tag::IMAGE_WIDTH, sequence.width);
    ifd.long(tag::IMAGE_LENGTH, sequence.height);
    ifd.shorts(tag::BITS_PER_SAMPLE, &[16, 16, 16]);
    ifd.shorts(tag::COMPRESSION, &[1]);
    ifd.shorts(tag::PHOTOMETRIC, &[PHOTOMETRIC_LINEAR_RAW]);
    ifd.ascii(tag::MAKE, &sequence.camera);
    ifd.ascii(tag::MODEL, &sequence.camera);
    ifd.shorts(tag::ORIENTATION, &[1]);
    ifd.shorts(tag::SAMPLES_PER_PIXEL, &[3]);
    ifd.long(tag::ROWS_PER_STRIP, sequence.height);
    ifd.long(tag::STRIP_BYTE_COUNTS, strip_bytes);
    ifd.shorts(tag::PLANAR_CONFIGURATION, &[1]);
    ifd.ascii(tag::SOFTWARE, SOFTWARE);
    ifd.bytes(tag::DNG_VERSION, &[1, 4, 0, 0]);
    ifd.bytes(tag::DNG_BACKWARD_VERSION, &[1, 1, 0, 0]);
    ifd.ascii(tag::UNIQUE_CAMERA_MODEL, &sequence.camera);
    ifd.long(tag::WHITE_LEVEL, (1u32 << sequence.bits) - 1);
    ifd.rationals(
        tag::DEFAULT_SCALE,
        &[sequence.aspect.horizontal, sequence.aspect.vertical],
    );
    ifd.srationals(
        tag::COLOR_MATRIX_1,
        &[(1, 1), (0, 1), (0, 1), (0, 1), (1, 1), (0, 1), (0, 1), (0, 1), (1, 1)],
    );
    ifd.rationals(tag::AS_SHOT_NEUTRAL, &[(1, 1), (1, 1), (1, 1)]);
    ifd.shorts(tag::CALIBRATION_ILLUMINANT_1, &[ILLUMINANT_D65]);
    ifd.srationals(tag::FRAME_RATE, &[frame_rate_rational(sequence.frame_rate)]);

    // Strip offset is fixed by the IFD size, which this entry does not change
    let entries = ifd.entries.len() + 1;
    let image_offset = offset32(8 + 2 + entries * 12 + 4)?;
    ifd.long(tag::STRIP_OFFSETS, image_offset);

    ifd.finish(&image)
}
