//! Worker subprocess spawning.
//!
//! Workers are this same binary re-executed in hidden `--internal-worker`
//! mode, via `std::process::Command`.

use super::channel::ChannelWriter;
use super::spec::WorkerSpec;
use crate::error::{HistfanError, Result};
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

/// Path of the executable to run as a worker.
pub fn worker_executable(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => std::env::current_exe()
            .map_err(|e| HistfanError::Setup(format!("Failed to get current executable: {}", e))),
    }
}

/// Arguments that put the binary into worker mode for `spec`.
pub fn worker_args(spec: &WorkerSpec, hold: Duration) -> Vec<String> {
    vec![
        "--internal-worker".to_string(),
        "--slot".to_string(),
        spec.slot.to_string(),
        "--delay-ms".to_string(),
        // --delay-ms is parsed as u64 on the worker side
        u64::try_from(hold.as_millis())
            .unwrap_or(u64::MAX)
            .to_string(),
        // Inputs may start with '-'
        "--".to_string(),
        spec.input_name.clone(),
    ]
}

/// Spawn a worker whose stdout is `writer`.
///
/// The `Command` (and with it the coordinator's copy of the write end) is
/// dropped before this returns.
pub fn spawn_worker(
    exe: &Path,
    spec: &WorkerSpec,
    hold: Duration,
    writer: ChannelWriter,
) -> Result<Pid> {
    let mut cmd = Command::new(exe);
    cmd.args(worker_args(spec, hold));
    cmd.stdin(Stdio::null());
    cmd.stdout(writer.into_stdio());
    cmd.stderr(Stdio::inherit()); // Worker errors go to parent's stderr

    let child = cmd.spawn().map_err(|e| {
        HistfanError::Setup(format!(
            "Failed to spawn worker for '{}': {}",
            spec.input_name, e
        ))
    })?;

    // Reaping is done by the notifier with waitpid(-1); the Child is only
    // a pid carrier.
    Ok(Pid::from_raw(child.id() as i32))
}
