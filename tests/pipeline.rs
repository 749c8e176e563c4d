//! End-to-end runs of the pipeline against stub backends.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};

use gotcha::{Error, Pipeline, PipelineConfig, Raster, RecognitionBackend, RecognitionError};
use image::Rgb;
use tempfile::TempDir;

// ── Stub backends ────────────────────────────────────────────────────────────

struct Answer(&'static str);

impl RecognitionBackend for Answer {
    fn name(&self) -> &'static str {
        "answer"
    }

    fn recognize(&self, _: &Raster, _: u32) -> Result<String, RecognitionError> {
        Ok(self.0.to_string())
    }
}

struct Broken;

impl RecognitionBackend for Broken {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn recognize(&self, _: &Raster, _: u32) -> Result<String, RecognitionError> {
        Err(RecognitionError::Encode("tensor from byte buffer".into()))
    }
}

/// Remembers the raster and size hint it was handed.
#[derive(Default)]
struct Recorder(Mutex<Option<((u32, u32), u32)>>);

impl RecognitionBackend for Recorder {
    fn name(&self) -> &'static str {
        "recorder"
    }

    fn recognize(&self, raster: &Raster, size_hint: u32) -> Result<String, RecognitionError> {
        *self.0.lock().unwrap() = Some((raster.dimensions(), size_hint));
        Ok("seen".into())
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn write_captcha(dir: &Path, width: u32, height: u32) -> PathBuf {
    let path = dir.join("captcha.png");
    Raster::from_fn(width, height, |x, y| {
        if (x / 6 + y / 5) % 2 == 0 {
            Rgb([240, 240, 235])
        } else {
            Rgb([30, 40, 90])
        }
    })
    .save(&path)
    .unwrap();
    path
}

fn config_in(dir: &TempDir, input: PathBuf) -> PipelineConfig {
    PipelineConfig {
        output: dir.path().join("output.txt"),
        debug_image: dir.path().join("tmp.jpeg"),
        ..PipelineConfig::new(input)
    }
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[test]
fn writes_backend_answer_exactly() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_captcha(dir.path(), 100, 40);
    let config = config_in(&dir, input);
    let output = config.output.clone();

    let text = Pipeline::new(config)
        .unwrap()
        .run_with(Arc::new(Answer("AB3K")))
        .unwrap();

    assert_eq!(text, "AB3K");
    assert_eq!(fs::read(&output).unwrap(), b"AB3K");
}

#[test]
fn backend_fault_still_writes_empty_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_captcha(dir.path(), 100, 40);
    let config = config_in(&dir, input);
    let output = config.output.clone();

    let text = Pipeline::new(config)
        .unwrap()
        .run_with(Arc::new(Broken))
        .unwrap();

    assert_eq!(text, "");
    assert!(output.exists());
    assert_eq!(fs::read_to_string(&output).unwrap(), "");
}

#[test]
fn backend_sees_preprocessed_raster() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_captcha(dir.path(), 100, 40);
    let config = config_in(&dir, input);
    let debug_image = config.debug_image.clone();
    let recorder = Arc::new(Recorder::default());

    Pipeline::new(config)
        .unwrap()
        .run_with(recorder.clone())
        .unwrap();

    assert_eq!(*recorder.0.lock().unwrap(), Some(((200, 80), 64)));
    let debug = image::open(&debug_image).unwrap();
    assert_eq!((debug.width(), debug.height()), (200, 80));
}

#[test]
fn missing_input_is_fatal_and_leaves_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir, dir.path().join("missing.jpeg"));
    let output = config.output.clone();

    let err = Pipeline::new(config)
        .unwrap()
        .run_with(Arc::new(Answer("AB3K")))
        .unwrap_err();

    assert!(matches!(err, Error::InputNotFound { .. }), "got: {err}");
    assert!(!output.exists());
}

#[test]
fn missing_model_is_fatal_and_leaves_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_captcha(dir.path(), 60, 20);
    let config = PipelineConfig {
        backend: gotcha::BackendChoice::Predictor {
            model_dir: dir.path().join("tf_model"),
        },
        ..config_in(&dir, input)
    };
    let output = config.output.clone();

    let err = Pipeline::new(config).unwrap().run().unwrap_err();

    assert!(matches!(err, Error::BackendLoad(_)), "got: {err}");
    assert!(!output.exists());
}

#[test]
fn repeated_runs_are_identical() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_captcha(dir.path(), 90, 30);
    let config = config_in(&dir, input);
    let output = config.output.clone();
    let debug_image = config.debug_image.clone();
    let pipeline = Pipeline::new(config).unwrap();

    pipeline.run_with(Arc::new(Answer("x7Q2"))).unwrap();
    let first_output = fs::read(&output).unwrap();
    let first_debug = fs::read(&debug_image).unwrap();

    pipeline.run_with(Arc::new(Answer("x7Q2"))).unwrap();
    assert_eq!(fs::read(&output).unwrap(), first_output);
    assert_eq!(fs::read(&debug_image).unwrap(), first_debug);
}

#[test]
fn binary_exits_non_zero_for_missing_input() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("output.txt");

    let status = Command::new(env!("CARGO_BIN_EXE_gotcha"))
        .current_dir(dir.path())
        .arg("--input")
        .arg(dir.path().join("missing.jpeg"))
        .arg("--output")
        .arg(&output)
        .env_remove("RUST_LOG")
        .status()
        .unwrap();

    assert!(!status.success());
    assert!(!output.exists());
}

#[test]
fn binary_rejects_non_positive_resize() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_captcha(dir.path(), 40, 20);

    let out = Command::new(env!("CARGO_BIN_EXE_gotcha"))
        .current_dir(dir.path())
        .arg("-i")
        .arg(&input)
        .args(["-r", "0"])
        .output()
        .unwrap();

    assert!(!out.status.success());
    assert!(!dir.path().join("output.txt").exists());
    assert!(!dir.path().join("tmp.jpeg").exists());
}

/// Run the binary on a real captcha in `dir` with some extra arguments.
fn run_binary(dir: &Path, extra: &[&str]) -> std::process::Output {
    let input = write_captcha(dir, 40, 20);
    Command::new(env!("CARGO_BIN_EXE_gotcha"))
        .current_dir(dir)
        .arg("-i")
        .arg(&input)
        .args(extra)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn assert_rejected_as_usage(dir: &Path, extra: &[&str]) {
    let out = run_binary(dir, extra);
    let stderr = String::from_utf8_lossy(&out.stderr);

    assert!(!out.status.success(), "{extra:?} accepted");
    assert!(!stderr.contains("panicked"), "{extra:?} panicked: {stderr}");
    assert!(stderr.contains("invalid value"), "{extra:?}: {stderr}");
    assert!(!dir.join("output.txt").exists());
    assert!(!dir.join("tmp.jpeg").exists());
}

#[test]
fn binary_rejects_zero_timeout() {
    let dir = tempfile::tempdir().unwrap();
    assert_rejected_as_usage(dir.path(), &["--timeout", "0"]);
}

#[test]
fn binary_rejects_timeout_beyond_duration_range() {
    let dir = tempfile::tempdir().unwrap();
    assert_rejected_as_usage(dir.path(), &["--timeout", "1e20"]);
}

#[test]
fn binary_rejects_zero_size_hint() {
    let dir = tempfile::tempdir().unwrap();
    assert_rejected_as_usage(dir.path(), &["--size-hint", "0"]);
}

#[test]
fn binary_rejects_oversized_resize() {
    let dir = tempfile::tempdir().unwrap();
    let out = run_binary(dir.path(), &["-r", "1e9"]);
    let stderr = String::from_utf8_lossy(&out.stderr);

    assert!(!out.status.success());
    assert!(!stderr.contains("panicked"), "{stderr}");
    assert!(!dir.path().join("output.txt").exists());
    assert!(!dir.path().join("tmp.jpeg").exists());
}
