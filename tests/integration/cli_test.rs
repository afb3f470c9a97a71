use std::path::PathBuf;
use std::process::{Command, Output};

use fluid_stream_worker::config::WorkerConfig;

fn worker_binary() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_fluid-stream-worker"));
    command.env("RUST_LOG", "info");
    command
}

fn scratch_path(name: &str) -> PathBuf {
    std::env::temp_dir()
        .join(format!("fluid-cli-{}", uuid::Uuid::new_v4()))
        .join(name)
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[test]
fn test_fatal_error_is_reported_on_stderr() {
    let Output {
        status,
        stdout,
        stderr,
    } = worker_binary()
        .env("FLUID_WORKER_CONFIG", scratch_path("missing.json"))
        .output()
        .unwrap();

    assert_eq!(status.code(), Some(1));
    assert!(text(&stderr).contains("Worker failed"));
    assert!(text(&stderr).contains("Failed to read config file"));
    assert!(stdout.is_empty(), "stdout: {}", text(&stdout));
}

#[test]
fn test_init_config_writes_loadable_defaults() {
    let path = scratch_path("fluid-worker.json");

    let output = worker_binary()
        .arg("init-config")
        .arg(&path)
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", text(&output.stderr));
    assert!(output.stdout.is_empty());
    let written: WorkerConfig =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written.worker.queue, "fluid_request");

    if let Some(dir) = path.parent() {
        std::fs::remove_dir_all(dir).ok();
    }
}

#[test]
fn test_unknown_command_fails() {
    let output = worker_binary().arg("serve-forever").output().unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(text(&output.stderr).contains("Unknown command 'serve-forever'"));
}

#[test]
fn test_request_needs_a_frame_count() {
    let missing = worker_binary().arg("request").output().unwrap();
    assert_eq!(missing.status.code(), Some(1));
    assert!(text(&missing.stderr).contains("Missing frame count"));

    let invalid = worker_binary().args(["request", "three"]).output().unwrap();
    assert_eq!(invalid.status.code(), Some(1));
    assert!(text(&invalid.stderr).contains("Invalid frame count 'three'"));
}
