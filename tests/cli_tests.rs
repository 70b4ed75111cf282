//! Command-line surface: help, argument validation and failure exit codes

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Binary run from an empty directory with no configuration in scope
fn rawexport(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("rawexport").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("RUST_LOG")
        .env_remove("RAWEXPORT_CONFIG")
        .env_remove("RAWEXPORT_THREADS")
        .env_remove("RAWEXPORT_HARDWARE_API")
        .env_remove("RAWEXPORT_OUTPUT_DIR")
        .env_remove("RAWEXPORT_AUDIO_STAGING_DIR")
        .env_remove("RAWEXPORT_SCALE_ALGORITHM")
        .env_remove("RAWEXPORT_NAMING");
    cmd
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    rawexport(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("export"))
        .stdout(predicate::str::contains("probe"))
        .stdout(predicate::str::contains("bench"));
}

#[test]
fn test_export_help_shows_codec_options() {
    let dir = TempDir::new().unwrap();
    rawexport(&dir)
        .args(["export", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--codec"))
        .stdout(predicate::str::contains("--naming"))
        .stdout(predicate::str::contains("--force-software"));
}

#[test]
fn test_unknown_codec_exits_with_invalid_parameters() {
    let dir = TempDir::new().unwrap();
    rawexport(&dir)
        .args(["export", "clip.mov", "--codec", "theora"])
        .assert()
        .code(6)
        .stderr(predicate::str::contains("Unknown codec 'theora'"));
}

#[test]
fn test_empty_input_directory_fails() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("clips")).unwrap();
    rawexport(&dir)
        .args(["export", "clips", "--codec", "prores"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No clips found"));
}

#[test]
fn test_bad_resize_is_rejected() {
    let dir = TempDir::new().unwrap();
    rawexport(&dir)
        .args(["export", "clip.mov", "--codec", "h264", "--resize", "1920by1080"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("WIDTHxHEIGHT"));
}

#[test]
fn test_invalid_environment_override_fails() {
    let dir = TempDir::new().unwrap();
    rawexport(&dir)
        .env("RAWEXPORT_THREADS", "many")
        .args(["export", "clip.mov", "--codec", "h264"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("RAWEXPORT_"));
}

#[test]
fn test_conflicting_force_flags_are_a_usage_error() {
    let dir = TempDir::new().unwrap();
    rawexport(&dir)
        .args(["export", "clip.mov", "--codec", "h264", "--force-hardware", "--force-software"])
        .assert()
        .code(2);
}

#[test]
fn test_bench_frame_count_is_range_checked() {
    let dir = TempDir::new().unwrap();
    rawexport(&dir)
        .args(["bench", "--frames", "0"])
        .assert()
        .code(2);
}
