pub mod docker;
pub mod native;

use std::{path::Path, process::Stdio, time::Duration};
use thiserror::Error;
use tokio::{process::Command, runtime::Runtime};

use crate::arch::Arch;

/// One sandboxed run: every invocation variant of `target` under `arch`
#[derive(Debug, Clone, Copy)]
pub struct ExecRequest<'a> {
    /// Read-only root of the unpacked firmware
    pub root: &'a Path,
    pub arch: Arch,
    /// Root-relative path with a leading slash
    pub target: &'a str,
    pub timeout: Duration,
}

#[derive(Error, Debug)]
pub enum HostError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("could not run sandbox: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("sandbox exited with {code:?}: {stderr}")]
    Exit { code: Option<i32>, stderr: String },
}

/// How the runner serializes its variant map on stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    Json,
    /// Python pickle, what the FACT qemu image prints
    Pickle,
}

/// - Runs a target under emulation, returning the runner's serialized output
/// - Tells whether the backing service is up at all
pub trait Host: Sync {
    fn is_alive(&self) -> bool;
    fn execute(&self, request: &ExecRequest) -> Result<Vec<u8>, HostError>;

    fn wire_format(&self) -> WireFormat {
        WireFormat::Json
    }
}

pub(crate) fn runtime() -> std::io::Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("qemu-probe-io")
        .enable_all()
        .build()
}

/// Runs `command` to completion and hands back stdout, killing it once `limit` passes
pub(crate) fn output_within(
    runtime: &Runtime,
    mut command: Command,
    limit: Duration,
) -> Result<Vec<u8>, HostError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    runtime.block_on(async {
        let child = command.spawn()?;

        // dropping the future on timeout drops the child, which kills it
        let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => return Err(HostError::Timeout(limit)),
        };

        if !output.status.success() {
            return Err(HostError::Exit {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output.stdout)
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::{output_within, runtime, HostError};
    use std::time::Duration;
    use tokio::process::Command;

    fn sh(script: &str) -> Command {
        let mut command = Command::new("/bin/sh");
        command.args(["-c", script]);
        command
    }

    #[test]
    fn captures_stdout() {
        let rt = runtime().unwrap();
        let out = output_within(&rt, sh("printf hello"), Duration::from_secs(5)).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn times_out() {
        let rt = runtime().unwrap();
        let err = output_within(&rt, sh("sleep 5"), Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, HostError::Timeout(_)));
    }

    #[test]
    fn failing_exit_status() {
        let rt = runtime().unwrap();
        let err = output_within(&rt, sh("echo nope >&2; exit 3"), Duration::from_secs(5))
            .unwrap_err();
        match err {
            HostError::Exit { code, stderr } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "nope");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_program() {
        let rt = runtime().unwrap();
        let command = Command::new("/nonexistent/qemu-probe-runner");
        let err = output_within(&rt, command, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, HostError::Spawn(_)));
    }
}
