//! Image-sequence session: one encoder, one still file per frame

use std::io::Write;

use tracing::{info, warn};

use super::cancel::CancellationToken;
use super::negotiator::{DetachedStream, EncodeGeometry, Negotiator};
use super::progress::ProgressReporter;
use super::{alloc_frame_buffer, AudioOutcome, OutputReport, SessionJob};
use crate::domain::model::{Dimensions, Rational};
use crate::domain::naming::OutputNaming;
use crate::error::{ExportError, ExportResult};
use crate::ports::{
    MediaBackend, OutputKind, OutputProvider, PacketData, PictureScaler, RawClip, VideoEncoder,
};
use crate::preset::geometry::compute_dimensions;

/// Still images carry no timing; the encoder is opened at a nominal rate
const STILL_FRAME_RATE: Rational = Rational::new(25, 1);

/// Frame-threaded still encoders hold pictures back until every thread is busy,
/// so each frame's image would no longer come out of its own send
const STILL_ENCODER_THREADS: usize = 1;

/// Export every frame as its own still image
pub fn export_image_sequence<B: MediaBackend>(
    backend: &B,
    clip: &mut dyn RawClip,
    outputs: &mut dyn OutputProvider,
    job: SessionJob<'_>,
    token: &CancellationToken,
    reporter: &ProgressReporter,
) -> ExportResult<OutputReport> {
    let SessionJob {
        request,
        preset,
        settings,
        ..
    } = job;

    if preset.codec.is_none() || preset.container.is_some() {
        return Err(ExportError::invalid(format!(
            "{} is not an image sequence codec",
            request.codec
        )));
    }
    if !outputs.supports(OutputKind::Frame) {
        return Err(ExportError::invalid("no frame output provider"));
    }
    let total = clip.frame_count();
    if total == 0 {
        return Err(ExportError::invalid("clip has no frames"));
    }

    let source = Dimensions::new(clip.width(), clip.height());
    let dims = compute_dimensions(source, request, preset);
    let geometry = EncodeGeometry::new(dims.width, dims.height, STILL_FRAME_RATE, STILL_ENCODER_THREADS);
    info!(
        "Image sequence {}: {}x{} -> {}x{}, {} frames",
        request.codec, source.width, source.height, dims.width, dims.height, total
    );

    let mut encoder = Negotiator::new(preset, geometry).run(backend, &mut DetachedStream::default())?;
    token.check()?;

    let descriptor = encoder.descriptor().clone();
    let mut scaler = backend.create_scaler(source, &descriptor, request.scale_algorithm)?;
    let mut packet = backend.new_packet()?;
    let mut frame = alloc_frame_buffer(source.width, source.height)?;

    // Image sequences always use plain names
    let naming = OutputNaming::plain(&request.source_base_name);
    let mut files = Vec::with_capacity(total as usize);
    let mut packets = 0u64;

    for index in 0..total {
        token.check()?;

        let name = naming.frame_name(clip.frame_number(index), preset.extension);
        let mut handle = outputs.acquire_frame_output(index, &name)?;

        clip.processed_frame16(index, settings.decode_cores, &mut frame)?;
        let picture = scaler.scale(&frame, index as i64)?;
        encoder.send_picture(Some(picture))?;

        let mut written = 0u64;
        while encoder.receive_packet(&mut packet)? {
            handle
                .write_all(packet.data())
                .map_err(|e| ExportError::io(format!("failed to write {}: {}", name, e)))?;
            written += 1;
        }
        if written == 0 {
            return Err(ExportError::frame(format!("encoder produced no image for {}", name)));
        }
        handle
            .flush()
            .map_err(|e| ExportError::io(format!("failed to flush {}: {}", name, e)))?;

        packets += written;
        files.push(name);
        reporter.report_frame(index, total);
    }

    encoder.send_picture(None)?;
    let mut stray = 0u32;
    while encoder.receive_packet(&mut packet)? {
        stray += 1;
    }
    if stray > 0 {
        warn!("{} returned {} packet(s) after the last image", descriptor.name, stray);
    }

    info!("Wrote {} images with {}", files.len(), descriptor.name);
    Ok(OutputReport {
        files,
        frames: total,
        video_packets: packets,
        encoder: Some(descriptor),
        audio: AudioOutcome::None,
    })
}
