//! CinemaDNG session: frames go straight to the DNG writer, one file each

use tracing::{info, warn};

use super::cancel::CancellationToken;
use super::progress::ProgressReporter;
use super::{AudioOutcome, OutputReport};
use crate::domain::model::{stretch, ExportRequest};
use crate::domain::naming::OutputNaming;
use crate::error::{ExportError, ExportResult};
use crate::ports::{AspectPairs, DngSettings, DngWriter, OutputKind, OutputProvider, RawClip};

/// Highest DNG writer variant; anything above falls back to variant 0
pub const MAX_CDNG_VARIANT: u8 = 2;

/// Canonical pixel aspect pairs for the configured stretch factors
pub fn aspect_pairs(stretch_x: f32, stretch_y: f32) -> AspectPairs {
    let mut horizontal = if stretch::approximately(stretch_x, stretch::H_133) {
        (4, 3)
    } else if stretch::approximately(stretch_x, stretch::H_150) {
        (3, 2)
    } else if stretch::approximately(stretch_x, stretch::H_167) {
        (5, 3)
    } else if stretch::approximately(stretch_x, stretch::H_175) {
        (7, 4)
    } else if stretch::approximately(stretch_x, stretch::H_180) {
        (9, 5)
    } else if stretch::approximately(stretch_x, stretch::H_200) {
        (2, 1)
    } else {
        (1, 1)
    };

    let vertical = if stretch::approximately(stretch_y, stretch::V_167) {
        (5, 3)
    } else if stretch::approximately(stretch_y, stretch::V_300) {
        (3, 1)
    } else if stretch::approximately(stretch_y, stretch::V_033) {
        // Squeezed footage is widened rather than shrunk
        horizontal.0 *= 3;
        (1, 1)
    } else {
        (1, 1)
    };

    AspectPairs {
        horizontal,
        vertical,
    }
}

pub fn clamp_variant(variant: u8) -> u8 {
    if variant > MAX_CDNG_VARIANT {
        0
    } else {
        variant
    }
}

/// Export every frame as a DNG file through the DNG writer
pub fn export_cdng<W: DngWriter>(
    writer: &W,
    clip: &mut dyn RawClip,
    outputs: &mut dyn OutputProvider,
    request: &ExportRequest,
    token: &CancellationToken,
    reporter: &ProgressReporter,
) -> ExportResult<OutputReport> {
    if !outputs.supports(OutputKind::Frame) {
        return Err(ExportError::invalid("no frame output provider"));
    }
    token.check()?;

    let (stretch_x, stretch_y) = request.effective_stretch();
    let settings = DngSettings {
        variant: clamp_variant(request.cdng_variant),
        frame_rate: clip.frame_rate(),
        aspect: aspect_pairs(stretch_x, stretch_y),
    };
    if settings.variant != request.cdng_variant {
        warn!("CinemaDNG variant {} out of range, using 0", request.cdng_variant);
    }

    let naming = OutputNaming::new(
        &request.source_base_name,
        request.naming,
        clip.metadata().capture_date,
    );

    let mut handle = writer.init_writer(clip, &settings)?;
    let result = write_frames(writer, &mut handle, clip, outputs, &naming, token, reporter);
    writer.close_writer(handle);

    let files = result?;
    info!("Wrote {} DNG frames", files.len());
    Ok(OutputReport {
        frames: files.len() as u32,
        files,
        video_packets: 0,
        encoder: None,
        audio: AudioOutcome::None,
    })
}

fn write_frames<W: DngWriter>(
    writer: &W,
    handle: &mut W::Writer,
    clip: &mut dyn RawClip,
    outputs: &mut dyn OutputProvider,
    naming: &OutputNaming,
    token: &CancellationToken,
    reporter: &ProgressReporter,
) -> ExportResult<Vec<String>> {
    let total = clip.frame_count();
    let mut files = Vec::with_capacity(total as usize);

    for index in 0..total {
        token.check()?;

        let name = naming.frame_name(clip.frame_number(index), ".dng");
        let mut output = outputs.acquire_frame_output(index, &name)?;
        writer.write_frame(handle, clip, index, output.as_mut())?;
        files.push(name);

        reporter.report_frame(index, total);
        token.check()?;
    }

    Ok(files)
}
