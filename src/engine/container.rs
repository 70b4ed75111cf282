//! Video container session: scale, encode and mux every frame into one file

use tracing::{debug, info, warn};

use super::batch::BatchExportContext;
use super::cancel::CancellationToken;
use super::negotiator::{EncodeGeometry, Negotiator, VideoStreamSlot};
use super::progress::ProgressReporter;
use super::{alloc_frame_buffer, AudioOutcome, OutputReport, SessionJob};
use crate::audio::{AudioFailure, AudioPipeline, AudioPlan};
use crate::domain::model::Dimensions;
use crate::domain::naming::OutputNaming;
use crate::error::{ExportError, ExportResult};
use crate::ports::{
    MediaBackend, Muxer, OutputKind, OutputProvider, PacketOf, PictureScaler, RawClip, VideoEncoder,
};
use crate::preset::geometry::{compute_dimensions, select_fps};

/// Where the session's encoder comes from
pub enum EncoderSource<'a> {
    /// Full negotiation over the preset's candidates
    Negotiate,
    /// Cached identity from earlier clips of a batch
    Batch(&'a mut BatchExportContext),
}

/// Export the whole clip into a single container file
pub fn export_container<B: MediaBackend>(
    backend: &B,
    clip: &mut dyn RawClip,
    outputs: &mut dyn OutputProvider,
    job: SessionJob<'_>,
    encoder_source: EncoderSource<'_>,
    token: &CancellationToken,
    reporter: &ProgressReporter,
) -> ExportResult<OutputReport> {
    let SessionJob {
        request,
        preset,
        audio_source,
        settings,
    } = job;

    if preset.codec.is_none() {
        return Err(ExportError::invalid(format!("{} has no video encoder", request.codec)));
    }
    let container = preset
        .container
        .ok_or_else(|| ExportError::invalid(format!("{} has no container format", request.codec)))?;
    if !outputs.supports(OutputKind::Container) {
        return Err(ExportError::invalid("no container output provider"));
    }

    let total = clip.frame_count();
    if total == 0 {
        return Err(ExportError::invalid("clip has no frames"));
    }

    let source = Dimensions::new(clip.width(), clip.height());
    let dims = compute_dimensions(source, request, preset);
    let fps = select_fps(request, clip.frame_rate(), preset);
    let geometry = EncodeGeometry::new(dims.width, dims.height, fps, settings.threads);
    info!(
        "Container export {}: {}x{} -> {}x{} @ {} fps, {} frames",
        request.codec, source.width, source.height, dims.width, dims.height, fps, total
    );

    let file_name = OutputNaming::plain(&request.source_base_name).file_name(container.extension);
    let handle = outputs.acquire_container_output(&file_name)?;
    let mut muxer = backend.create_muxer(container.muxer, handle)?;
    let video_stream = muxer.new_stream()?;

    let mut encoder = {
        let mut slot = VideoStreamSlot::new(&mut muxer, video_stream);
        match encoder_source {
            EncoderSource::Negotiate => Negotiator::new(preset, geometry).run(backend, &mut slot)?,
            EncoderSource::Batch(context) => context.get_or_open(backend, geometry, &mut slot)?,
        }
    };
    token.check()?;

    // Audio stream is registered before the header is written
    let mut audio = AudioOutcome::None;
    let mut pipeline = match (audio_source, AudioPlan::for_codec(request.codec)) {
        (Some(path), Some(plan)) => match AudioPipeline::setup(backend, &mut muxer, &plan, path) {
            Ok(pipeline) => Some(pipeline),
            Err(e) => {
                warn!("Audio setup failed, exporting video only: {}", e);
                audio = AudioOutcome::Dropped {
                    reason: e.to_string(),
                };
                None
            }
        },
        (Some(_), None) => {
            debug!("{} carries no container audio", request.codec);
            None
        }
        _ => None,
    };

    muxer.write_header()?;

    let mut packet = backend.new_packet()?;
    if let Some(pipeline) = pipeline.as_mut() {
        audio = match pipeline.run(&mut muxer, &mut packet, token) {
            Ok(stats) => AudioOutcome::Muxed { stats },
            Err(AudioFailure::Recoverable(e)) => AudioOutcome::Dropped {
                reason: e.to_string(),
            },
            Err(AudioFailure::Fatal(e)) => return Err(e),
        };
    }
    drop(pipeline);
    token.check()?;

    let descriptor = encoder.descriptor().clone();
    let mut scaler = backend.create_scaler(source, &descriptor, request.scale_algorithm)?;
    let mut frame = alloc_frame_buffer(source.width, source.height)?;
    let mut video_packets = 0u64;

    for index in 0..total {
        token.check()?;

        clip.processed_frame16(index, settings.decode_cores, &mut frame)?;
        let picture = scaler.scale(&frame, index as i64)?;
        encoder.send_picture(Some(picture))?;
        video_packets += drain_video::<B>(&mut encoder, &mut muxer, &mut packet, video_stream)?;

        reporter.report_frame(index, total);
    }

    // Flush encoder
    encoder.send_picture(None)?;
    video_packets += drain_video::<B>(&mut encoder, &mut muxer, &mut packet, video_stream)?;

    muxer.write_trailer()?;
    info!(
        "Wrote {} ({} frames, {} video packets) with {}",
        file_name, total, video_packets, descriptor.name
    );

    Ok(OutputReport {
        files: vec![file_name],
        frames: total,
        video_packets,
        encoder: Some(descriptor),
        audio,
    })
}

fn drain_video<B: MediaBackend>(
    encoder: &mut B::Encoder,
    muxer: &mut B::Muxer,
    packet: &mut PacketOf<B>,
    stream: usize,
) -> ExportResult<u64> {
    let time_base = encoder.descriptor().time_base;
    let mut written = 0;
    while encoder.receive_packet(packet)? {
        muxer.write_packet(stream, packet, time_base)?;
        written += 1;
    }
    Ok(written)
}
