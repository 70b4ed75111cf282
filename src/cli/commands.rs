//! Command implementations

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use tempfile::TempDir;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::adapters::toml_config::ExportDefaults;
use crate::adapters::{DirectoryOutput, LibavBackend, LinearDngWriter, MediaFileClip, SyntheticClip};
use crate::app::{BatchClip, ExportSummary, Exporter, ExporterSettings};
use crate::cli::args::{BenchArgs, EncoderArgs, ExportArgs, ProbeArgs, ProgressMode};
use crate::config_initialization::{initialize_configuration_hierarchy, ConfigOverrides};
use crate::domain::model::*;
use crate::engine::cancel::CancellationToken;
use crate::engine::diagnostics::{frames_per_second, measure, probe_all, probe_codec, BenchMode, BenchSample, ProbeReport};
use crate::engine::progress::{
    ChannelProgress, ConsoleProgress, JobControl, JsonLinesProgress, LogProgress, NoOpProgress,
};
use crate::engine::SessionSettings;
use crate::ports::ProgressSink;
use crate::utils::{format_bytes, format_elapsed};

/// Extensions picked up when exporting a directory
pub const CLIP_EXTENSIONS: [&str; 9] = ["mov", "mp4", "m4v", "mkv", "mxf", "avi", "mts", "webm", "mcraw"];

/// Codecs benchmarked when none are named
pub const DEFAULT_BENCH_CODECS: [ExportCodec; 4] = [
    ExportCodec::H264,
    ExportCodec::H265,
    ExportCodec::ProRes,
    ExportCodec::Vp9,
];

fn parse_with<T>(value: &Option<String>, parse: fn(&str) -> crate::error::ExportResult<T>) -> Result<Option<T>> {
    value.as_deref().map(parse).transpose().map_err(Into::into)
}

/// `WIDTHxHEIGHT`
pub fn parse_size(value: &str) -> Result<(u32, u32)> {
    let (width, height) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| anyhow!("Invalid size '{}', expected WIDTHxHEIGHT", value))?;
    let width = width.trim().parse::<u32>().with_context(|| format!("Invalid width in '{}'", value))?;
    let height = height.trim().parse::<u32>().with_context(|| format!("Invalid height in '{}'", value))?;
    if width == 0 || height == 0 {
        bail!("Size '{}' must be positive on both axes", value);
    }
    Ok((width, height))
}

fn apply_encoder_args(request: &mut ExportRequest, args: &EncoderArgs, defaults: &ExportDefaults) {
    request.hardware_api = defaults.hardware_api;
    request.force_hardware = args.force_hardware;
    request.force_software = args.force_software;
}

/// Build the export request from arguments and resolved defaults
pub fn build_request(args: &ExportArgs, defaults: &ExportDefaults) -> Result<ExportRequest> {
    let mut request = ExportRequest::new(ExportCodec::parse(&args.codec)?, "clip");
    apply_encoder_args(&mut request, &args.encoder, defaults);
    request.scale_algorithm = defaults.scale_algorithm;
    request.naming = defaults.naming;
    request.include_audio = !args.no_audio;
    request.stretch_x = args.stretch_x;
    request.stretch_y = args.stretch_y;
    request.fps_override = args.fps;

    if let Some(size) = &args.resize {
        let (width, height) = parse_size(size)?;
        request = request.with_resize(width, height);
    }
    if let Some(variant) = args.cdng_variant {
        request.cdng_variant = variant;
    }
    if let Some(v) = parse_with(&args.prores_profile, ProResProfile::parse)? {
        request.prores_profile = v;
    }
    if let Some(v) = parse_with(&args.prores_encoder, ProResEncoder::parse)? {
        request.prores_encoder = v;
    }
    if let Some(v) = parse_with(&args.h264_quality, Quality::parse)? {
        request.h264_quality = v;
    }
    if let Some(v) = parse_with(&args.h264_container, VideoContainer::parse)? {
        request.h264_container = v;
    }
    if let Some(v) = parse_with(&args.h265_bit_depth, H265BitDepth::parse)? {
        request.h265_bit_depth = v;
    }
    if let Some(v) = parse_with(&args.h265_quality, Quality::parse)? {
        request.h265_quality = v;
    }
    if let Some(v) = parse_with(&args.h265_container, VideoContainer::parse)? {
        request.h265_container = v;
    }
    if let Some(v) = parse_with(&args.png_bit_depth, PngBitDepth::parse)? {
        request.png_bit_depth = v;
    }
    if let Some(v) = parse_with(&args.dnxhr_profile, DnxhrProfile::parse)? {
        request.dnxhr_profile = v;
    }
    if let Some(v) = parse_with(&args.dnxhd_profile, DnxhdProfile::parse)? {
        request.dnxhd_profile = v;
    }
    if let Some(v) = parse_with(&args.vp9_quality, Vp9Quality::parse)? {
        request.vp9_quality = v;
    }

    request.validate()?;
    Ok(request)
}

/// Clip files under `input`; a plain file is returned as is
pub fn collect_inputs(input: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        bail!("Input does not exist: {}", input.display());
    }

    let depth = if recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();
    for entry in WalkDir::new(input).max_depth(depth) {
        let entry = entry.with_context(|| format!("Failed to scan {}", input.display()))?;
        let matches = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| CLIP_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            .unwrap_or(false);
        if entry.file_type().is_file() && matches {
            files.push(entry.into_path());
        }
    }
    files.sort();

    if files.is_empty() {
        bail!("No clips found in {}", input.display());
    }
    Ok(files)
}

fn base_name(path: &Path) -> String {
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("clip");
    ExportRequest::base_name_from_file(file_name)
}

fn display_sink(mode: ProgressMode, label: &str) -> Arc<dyn ProgressSink> {
    match mode {
        ProgressMode::Log => Arc::new(LogProgress::new(label)),
        ProgressMode::Bar => Arc::new(ConsoleProgress::new()),
        ProgressMode::Json => Arc::new(JsonLinesProgress),
        ProgressMode::None => Arc::new(NoOpProgress),
    }
}

/// Channel sink for the worker plus a thread draining it into the display sink
fn progress_pipeline(mode: ProgressMode, label: &str) -> (Arc<dyn ProgressSink>, thread::JoinHandle<()>) {
    let (sink, receiver) = ChannelProgress::bounded();
    let display = display_sink(mode, label);
    let consumer = thread::spawn(move || {
        for percent in receiver {
            display.on_progress(percent);
        }
    });
    (Arc::new(sink), consumer)
}

fn exporter(defaults: &ExportDefaults) -> Result<Exporter<LibavBackend, LinearDngWriter>> {
    let backend = LibavBackend::new().context("Failed to initialize the media library")?;
    let settings = ExporterSettings {
        session: SessionSettings {
            threads: defaults.threads,
            decode_cores: defaults.threads,
        },
        audio_staging: defaults.audio_staging_dir.clone(),
    };
    Ok(Exporter::new(backend, LinearDngWriter::new(defaults.threads), settings))
}

fn total_size(paths: &[PathBuf]) -> u64 {
    paths
        .iter()
        .filter_map(|path| fs::metadata(path).ok())
        .map(|metadata| metadata.len())
        .sum()
}

/// Execute the export command
pub fn export(args: ExportArgs, config: Option<&Path>, token: CancellationToken) -> Result<Vec<ExportSummary>> {
    let overrides = ConfigOverrides {
        threads: args.encoder.threads,
        hardware_api: args.encoder.hardware_api.clone(),
        output_dir: args.output_dir.clone(),
        audio_staging_dir: args.audio_staging_dir.clone(),
        scale_algorithm: args.scale.clone(),
        naming: args.naming.clone(),
    };
    let defaults = initialize_configuration_hierarchy(config, &overrides)?;
    let request = build_request(&args, &defaults)?;
    let inputs = collect_inputs(&args.input, args.recursive)?;

    info!("Exporting {} clip(s) as {}", inputs.len(), request.codec);
    let exporter = exporter(&defaults)?;
    let mut outputs = DirectoryOutput::new(&defaults.output_dir)
        .with_context(|| format!("Failed to prepare {}", defaults.output_dir.display()))?;

    let label = match inputs.as_slice() {
        [single] => base_name(single),
        _ => format!("batch of {}", inputs.len()),
    };
    let (sink, consumer) = progress_pipeline(args.progress, &label);
    let control = JobControl::new(token, sink);
    let started = Instant::now();

    let result = match inputs.as_slice() {
        [single] => {
            let mut clip = MediaFileClip::open(single).with_context(|| format!("Failed to open {}", single.display()))?;
            exporter
                .export(&mut clip, &request.for_source(base_name(single)), &mut outputs, &control)
                .map(|summary| vec![summary])
        }
        _ => {
            let mut clips = inputs
                .iter()
                .map(|path| {
                    MediaFileClip::open(path)
                        .map(|clip| BatchClip::new(base_name(path), Box::new(clip)))
                        .with_context(|| format!("Failed to open {}", path.display()))
                })
                .collect::<Result<Vec<_>>>()?;
            exporter.export_batch(&mut clips, &request, &mut outputs, &control)
        }
    };

    drop(control);
    if consumer.join().is_err() {
        warn!("Progress display thread panicked");
    }

    let summaries = result.context("Export failed")?;
    let elapsed = started.elapsed();
    let frames: u32 = summaries.iter().map(|s| s.report.frames).sum();
    info!(
        "Wrote {} file(s), {} in {} ({:.1} fps)",
        outputs.created().len(),
        format_bytes(total_size(outputs.created())),
        format_elapsed(elapsed),
        frames_per_second(frames, elapsed)
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        for summary in &summaries {
            println!(
                "{}: {} frame(s), {} file(s), encoder {}",
                summary.base_name,
                summary.report.frames,
                summary.report.files.len(),
                summary
                    .report
                    .encoder
                    .as_ref()
                    .map(|e| e.name.as_str())
                    .unwrap_or("-")
            );
        }
    }
    Ok(summaries)
}

fn probe_row(report: &ProbeReport) -> String {
    let tried: Vec<&str> = report.attempts.iter().map(|a| a.encoder.as_str()).collect();
    match &report.selected {
        Some(name) => format!(
            "{}\t{}\t{}\ttried: {}",
            report.codec,
            name,
            if report.hardware == Some(true) { "hardware" } else { "software" },
            tried.join(", ")
        ),
        None => format!(
            "{}\tunavailable\t{}",
            report.codec,
            report.error.as_deref().unwrap_or("no encoder opened")
        ),
    }
}

/// Execute the probe command
pub fn probe(args: ProbeArgs, config: Option<&Path>) -> Result<Vec<ProbeReport>> {
    let overrides = ConfigOverrides {
        threads: args.encoder.threads,
        hardware_api: args.encoder.hardware_api.clone(),
        ..ConfigOverrides::default()
    };
    let defaults = initialize_configuration_hierarchy(config, &overrides)?;
    let backend = LibavBackend::new().context("Failed to initialize the media library")?;

    let mut template = ExportRequest::default();
    apply_encoder_args(&mut template, &args.encoder, &defaults);

    let reports = match &args.codec {
        Some(codec) => {
            template.codec = ExportCodec::parse(codec)?;
            vec![probe_codec(&backend, &template)]
        }
        None => probe_all(&backend, &template),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            println!("{}", probe_row(report));
        }
    }
    Ok(reports)
}

/// Execute the bench command
pub fn bench(args: BenchArgs, config: Option<&Path>, token: CancellationToken) -> Result<Vec<BenchSample>> {
    let overrides = ConfigOverrides {
        threads: args.threads,
        hardware_api: args.hardware_api.clone(),
        ..ConfigOverrides::default()
    };
    let defaults = initialize_configuration_hierarchy(config, &overrides)?;
    if args.fps <= 0.0 {
        bail!("Frame rate must be positive");
    }
    let codecs = if args.codecs.is_empty() {
        DEFAULT_BENCH_CODECS.to_vec()
    } else {
        args.codecs
            .iter()
            .map(|codec| ExportCodec::parse(codec).map_err(Into::into))
            .collect::<Result<Vec<_>>>()?
    };

    let scratch = TempDir::new().context("Failed to create scratch directory")?;
    let root = args.output_dir.clone().unwrap_or_else(|| scratch.path().to_path_buf());
    let exporter = exporter(&defaults)?;
    let control = JobControl::new(token.clone(), Arc::new(NoOpProgress));

    let mut samples = Vec::new();
    for codec in codecs {
        for mode in [BenchMode::Hardware, BenchMode::Software] {
            if token.is_cancelled() {
                bail!("Benchmark cancelled");
            }
            let mut request = mode.apply(ExportRequest::new(codec, "bench").with_audio(false));
            request.hardware_api = defaults.hardware_api;

            let sample = measure(codec, mode, || {
                let mut outputs = DirectoryOutput::new(root.join(format!("{}_{:?}", codec, mode).to_lowercase()))?;
                let mut clip = SyntheticClip::new(args.width, args.height, args.frames, args.fps);
                let summary = exporter.export(&mut clip, &request, &mut outputs, &control)?;
                Ok((summary.report.frames, summary.report.encoder.map(|e| e.name)))
            });
            if !args.json {
                println!("{}", sample.to_row());
            }
            samples.push(sample);
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&samples)?);
    }
    Ok(samples)
}
