// Export job - routes one request (or a batch) to the right session

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::audio::wav::write_wav;
use crate::domain::model::{ExportCodec, ExportRequest};
use crate::domain::naming::OutputNaming;
use crate::engine::batch::BatchExportContext;
use crate::engine::cancel::CancellationToken;
use crate::engine::cdng::export_cdng;
use crate::engine::container::{export_container, EncoderSource};
use crate::engine::progress::{JobControl, ProgressReporter};
use crate::engine::sequence::export_image_sequence;
use crate::engine::{AudioOutcome, OutputReport, SessionJob, SessionSettings};
use crate::error::{ExportError, ExportResult};
use crate::ports::{DngWriter, MediaBackend, OutputKind, OutputProvider, ProgressSink, RawClip};
use crate::preset::{select_video_preset, VideoPreset};

/// Job-wide settings
#[derive(Debug, Clone, Default)]
pub struct ExporterSettings {
    pub session: SessionSettings,
    /// Directory for staged WAV files; a temporary directory when unset
    pub audio_staging: Option<PathBuf>,
}

/// Result of exporting one clip
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportSummary {
    pub base_name: String,
    pub codec: ExportCodec,
    #[serde(flatten)]
    pub report: OutputReport,
}

/// A clip queued for batch export
pub struct BatchClip {
    pub base_name: String,
    pub clip: Box<dyn RawClip>,
}

impl BatchClip {
    pub fn new(base_name: impl Into<String>, clip: Box<dyn RawClip>) -> Self {
        Self {
            base_name: base_name.into(),
            clip,
        }
    }
}

/// Clip audio written to a WAV file for the muxer to read back
struct StagedAudio {
    // Removed with the directory on drop
    _dir: TempDir,
    path: PathBuf,
}

/// Runs export jobs against a media backend and DNG writer
pub struct Exporter<B, W> {
    backend: B,
    dng_writer: W,
    settings: ExporterSettings,
}

impl<B, W> Exporter<B, W>
where
    B: MediaBackend,
    W: DngWriter,
{
    pub fn new(backend: B, dng_writer: W, settings: ExporterSettings) -> Self {
        Self {
            backend,
            dng_writer,
            settings,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn settings(&self) -> &ExporterSettings {
        &self.settings
    }

    /// Export one clip
    pub fn export(
        &self,
        clip: &mut dyn RawClip,
        request: &ExportRequest,
        outputs: &mut dyn OutputProvider,
        control: &JobControl,
    ) -> ExportResult<ExportSummary> {
        request.validate()?;
        let reporter = control.reporter();
        let preset = select_video_preset(request);
        let report = self.run_clip(
            clip,
            request,
            &preset,
            outputs,
            EncoderSource::Negotiate,
            &control.token,
            &reporter,
        )?;

        Ok(ExportSummary {
            base_name: request.source_base_name.clone(),
            codec: request.codec,
            report,
        })
    }

    /// Export several clips under one configuration, sharing the encoder choice.
    ///
    /// Each clip's outputs are named from its own base name. Stops at the first
    /// failing clip.
    pub fn export_batch(
        &self,
        clips: &mut [BatchClip],
        request: &ExportRequest,
        outputs: &mut dyn OutputProvider,
        control: &JobControl,
    ) -> ExportResult<Vec<ExportSummary>> {
        if clips.is_empty() {
            return Err(ExportError::invalid("batch contains no clips"));
        }

        let overall = Arc::new(control.reporter());
        let mut context = BatchExportContext::init(request);
        let count = clips.len();
        let mut summaries = Vec::with_capacity(count);

        let result: ExportResult<()> = (|| {
            for (index, item) in clips.iter_mut().enumerate() {
                control.token.check()?;

                let clip_request = request.for_source(item.base_name.clone());
                clip_request.validate()?;
                info!("Batch clip {}/{}: {}", index + 1, count, item.base_name);

                let slice = Arc::new(BatchSlice {
                    overall: overall.clone(),
                    index,
                    count,
                });
                let reporter = ProgressReporter::new(control.token.clone(), slice);
                let preset = context.preset().clone();

                let report = self.run_clip(
                    item.clip.as_mut(),
                    &clip_request,
                    &preset,
                    outputs,
                    EncoderSource::Batch(&mut context),
                    &control.token,
                    &reporter,
                )?;
                summaries.push(ExportSummary {
                    base_name: item.base_name.clone(),
                    codec: request.codec,
                    report,
                });
            }
            Ok(())
        })();

        context.cleanup();
        result.map(|()| summaries)
    }

    #[allow(clippy::too_many_arguments)]
    fn run_clip(
        &self,
        clip: &mut dyn RawClip,
        request: &ExportRequest,
        preset: &VideoPreset,
        outputs: &mut dyn OutputProvider,
        encoder_source: EncoderSource<'_>,
        token: &CancellationToken,
        reporter: &ProgressReporter,
    ) -> ExportResult<OutputReport> {
        token.check()?;

        if request.codec == ExportCodec::AudioOnly {
            reporter.report(0);
            let report = export_audio_only(clip, request, outputs)?;
            reporter.report(100);
            return Ok(report);
        }

        // Audio preparation
        let mut staged = None;
        let mut audio = AudioOutcome::None;
        if request.include_audio && clip.audio_format().is_some() {
            if request.codec.is_container() {
                match self.stage_audio(clip, request) {
                    Ok(Some(stage)) => staged = Some(stage),
                    Ok(None) => debug!("Clip audio is empty, exporting video only"),
                    Err(e) => {
                        warn!("Audio staging failed, exporting video only: {}", e);
                        audio = AudioOutcome::Dropped {
                            reason: e.to_string(),
                        };
                    }
                }
            } else if outputs.supports(OutputKind::Audio) {
                audio = match write_sidecar(clip, request, outputs) {
                    Ok(Some(file)) => AudioOutcome::Sidecar { file },
                    Ok(None) => AudioOutcome::None,
                    Err(e) => {
                        warn!("Sidecar audio failed: {}", e);
                        AudioOutcome::Dropped {
                            reason: e.to_string(),
                        }
                    }
                };
            }
        }
        token.check()?;

        let job = SessionJob {
            request,
            preset,
            audio_source: staged.as_ref().map(|stage| stage.path.as_path()),
            settings: self.settings.session,
        };

        let mut report = match request.codec {
            ExportCodec::CinemaDng => export_cdng(&self.dng_writer, clip, outputs, request, token, reporter)?,
            codec if codec.is_image_sequence() => {
                reporter.report(0);
                export_image_sequence(&self.backend, clip, outputs, job, token, reporter)?
            }
            codec if codec.is_container() => {
                reporter.report(0);
                export_container(&self.backend, clip, outputs, job, encoder_source, token, reporter)?
            }
            codec => return Err(ExportError::invalid(format!("no export path for {}", codec))),
        };

        if report.audio == AudioOutcome::None {
            report.audio = audio;
        }
        if let AudioOutcome::Sidecar { file } = &report.audio {
            report.files.push(file.clone());
        }
        Ok(report)
    }

    /// Write the clip's audio into a staging WAV
    fn stage_audio(&self, clip: &mut dyn RawClip, request: &ExportRequest) -> ExportResult<Option<StagedAudio>> {
        let format = match clip.audio_format() {
            Some(format) => format,
            None => return Ok(None),
        };
        let data = clip.read_audio()?;
        if data.is_empty() {
            return Ok(None);
        }

        let mut builder = tempfile::Builder::new();
        builder.prefix("rawexport-audio-");
        let dir = match &self.settings.audio_staging {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };

        let path = dir.path().join(format!("{}.wav", request.source_base_name));
        let mut file = File::create(&path)
            .map_err(|e| ExportError::io(format!("failed to create {}: {}", path.display(), e)))?;
        let bytes = write_wav(&mut file, &format, &data)?;
        debug!("Staged {} bytes of audio at {}", bytes, path.display());

        Ok(Some(StagedAudio { _dir: dir, path }))
    }
}

/// Produce only the clip's audio as a WAV through the audio output handle
fn export_audio_only(
    clip: &mut dyn RawClip,
    request: &ExportRequest,
    outputs: &mut dyn OutputProvider,
) -> ExportResult<OutputReport> {
    if !outputs.supports(OutputKind::Audio) {
        return Err(ExportError::invalid("no audio output provider"));
    }
    let file = write_sidecar(clip, request, outputs)?
        .ok_or_else(|| ExportError::generic(format!("{} has no audio to export", request.source_base_name)))?;
    info!("Wrote audio {}", file);

    let mut report = OutputReport::empty();
    report.files.push(file.clone());
    report.audio = AudioOutcome::Standalone { file };
    Ok(report)
}

/// Write the clip's audio as `{base}.wav`; `None` when the clip has no audio
fn write_sidecar(
    clip: &mut dyn RawClip,
    request: &ExportRequest,
    outputs: &mut dyn OutputProvider,
) -> ExportResult<Option<String>> {
    let format = match clip.audio_format() {
        Some(format) => format,
        None => return Ok(None),
    };
    let data = clip.read_audio()?;
    if data.is_empty() {
        return Ok(None);
    }

    let naming = OutputNaming::new(
        &request.source_base_name,
        request.naming,
        clip.metadata().capture_date,
    );
    let name = naming.audio_name();
    let mut handle = outputs.acquire_audio_output(&name)?;
    write_wav(handle.as_mut(), &format, &data)?;
    Ok(Some(name))
}

/// Maps one clip's 0..100 onto its share of the batch
struct BatchSlice {
    overall: Arc<ProgressReporter>,
    index: usize,
    count: usize,
}

impl ProgressSink for BatchSlice {
    fn on_progress(&self, percent: u8) {
        self.overall
            .report(batch_percent(self.index, self.count, percent));
    }
}

fn batch_percent(index: usize, count: usize, percent: u8) -> u8 {
    if count == 0 {
        return percent;
    }
    let done = index as f64 * 100.0 + percent.min(100) as f64;
    (done / count as f64).floor().clamp(0.0, 100.0) as u8
}
