//! Command-line argument definitions

use std::path::PathBuf;

use clap::{Args, ValueEnum};
use clap_num::number_range;

fn thread_count(value: &str) -> Result<usize, String> {
    number_range(value, 1, 256)
}

fn frame_count(value: &str) -> Result<u32, String> {
    number_range(value, 1, 100_000)
}

fn dimension(value: &str) -> Result<u32, String> {
    number_range(value, 2, 16_384)
}

/// Where export progress goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProgressMode {
    /// One log line per percentage
    Log,
    /// Progress bar on stderr
    Bar,
    /// `{"progress":N}` lines on stdout
    Json,
    None,
}

/// Encoder selection flags shared by export, probe and bench
#[derive(Args, Debug, Clone, Default)]
pub struct EncoderArgs {
    /// Hardware encoder family (mediacodec, videotoolbox, nvenc, qsv)
    #[arg(long)]
    pub hardware_api: Option<String>,

    /// Only try the hardware encoder
    #[arg(long, conflicts_with = "force_software")]
    pub force_hardware: bool,

    /// Never try the hardware encoder
    #[arg(long)]
    pub force_software: bool,

    /// Encoder and decoder threads
    #[arg(long, value_parser = thread_count)]
    pub threads: Option<usize>,
}

/// Arguments for the export command
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Input clip, or a directory of clips exported as one batch
    pub input: PathBuf,

    /// Output codec (cdng, prores, h264, h265, tiff, png, jpeg2000, dnxhr, dnxhd, vp9, audio)
    #[arg(short, long)]
    pub codec: String,

    /// Output directory
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    #[command(flatten)]
    pub encoder: EncoderArgs,

    /// Leave the clip's audio out
    #[arg(long)]
    pub no_audio: bool,

    /// Output size as WIDTHxHEIGHT
    #[arg(long)]
    pub resize: Option<String>,

    /// Horizontal anamorphic stretch
    #[arg(long, default_value_t = 1.0)]
    pub stretch_x: f32,

    /// Vertical anamorphic stretch
    #[arg(long, default_value_t = 1.0)]
    pub stretch_y: f32,

    /// Frame rate override
    #[arg(long)]
    pub fps: Option<f64>,

    /// Scaler interpolation (bicubic, bilinear, sinc, lanczos, spline)
    #[arg(long)]
    pub scale: Option<String>,

    /// File naming scheme (sequential, editor-reel)
    #[arg(long)]
    pub naming: Option<String>,

    /// ProRes profile (proxy, lt, standard, hq, 4444, xq)
    #[arg(long)]
    pub prores_profile: Option<String>,

    /// ProRes encoder (ks, aw)
    #[arg(long)]
    pub prores_encoder: Option<String>,

    /// H.264 quality (high, medium)
    #[arg(long)]
    pub h264_quality: Option<String>,

    /// H.264 container (mov, mp4, mkv)
    #[arg(long)]
    pub h264_container: Option<String>,

    /// H.265 bit depth (8, 10, 12)
    #[arg(long)]
    pub h265_bit_depth: Option<String>,

    /// H.265 quality (high, medium)
    #[arg(long)]
    pub h265_quality: Option<String>,

    /// H.265 container (mov, mp4, mkv)
    #[arg(long)]
    pub h265_container: Option<String>,

    /// PNG bit depth (8, 16)
    #[arg(long)]
    pub png_bit_depth: Option<String>,

    /// DNxHR profile (lb, sq, hq, hqx, 444)
    #[arg(long)]
    pub dnxhr_profile: Option<String>,

    /// DNxHD profile (1080p10, 1080p8, 720p10, 720p8)
    #[arg(long)]
    pub dnxhd_profile: Option<String>,

    /// VP9 quality (good, lossless)
    #[arg(long)]
    pub vp9_quality: Option<String>,

    /// CinemaDNG writer variant (0 = 16-bit, 1 = 14-bit, 2 = 12-bit)
    #[arg(long)]
    pub cdng_variant: Option<u8>,

    /// Directory for staged audio
    #[arg(long)]
    pub audio_staging_dir: Option<PathBuf>,

    /// Descend into subdirectories when the input is a directory
    #[arg(short, long)]
    pub recursive: bool,

    #[arg(long, value_enum, default_value_t = ProgressMode::Log)]
    pub progress: ProgressMode,

    /// Print export summaries as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the probe command
#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Codec to probe; every video codec when omitted
    #[arg(short, long)]
    pub codec: Option<String>,

    #[command(flatten)]
    pub encoder: EncoderArgs,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the bench command
#[derive(Args, Debug)]
pub struct BenchArgs {
    /// Codecs to benchmark; repeat the flag for several
    #[arg(short, long = "codec")]
    pub codecs: Vec<String>,

    /// Frames per run
    #[arg(long, default_value_t = 60, value_parser = frame_count)]
    pub frames: u32,

    #[arg(long, default_value_t = 1920, value_parser = dimension)]
    pub width: u32,

    #[arg(long, default_value_t = 1080, value_parser = dimension)]
    pub height: u32,

    #[arg(long, default_value_t = 30.0)]
    pub fps: f64,

    /// Keep outputs here instead of a temporary directory
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    #[arg(long, value_parser = thread_count)]
    pub threads: Option<usize>,

    #[arg(long)]
    pub hardware_api: Option<String>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_parsers() {
        assert_eq!(thread_count("8"), Ok(8));
        assert!(thread_count("0").is_err());
        assert!(frame_count("abc").is_err());
        assert!(dimension("1").is_err());
    }
}
