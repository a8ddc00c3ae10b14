//! Runs one target under one architecture and classifies what came back

pub mod classify;
pub mod raw;

use serde::Serialize;
use std::{path::Path, time::Duration};
use tracing::{debug, warn};

use self::{classify::Normalized, raw::RawOutput};
use crate::{
    arch::Arch,
    host::{ExecRequest, Host, HostError},
};

/// Terminal failure of a single job, stored in place of its results
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ErrorMarker {
    #[serde(rename = "timeout")]
    Timeout,
    #[serde(rename = "process error")]
    ProcessError,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeOutcome {
    Completed(Normalized),
    /// Qemu ran but couldn't run the target, or nothing was produced at all.
    /// Not an error, there's just no result for this architecture.
    Rejected,
    Failed(ErrorMarker),
}

pub struct Probe<'a, H: Host + ?Sized> {
    host: &'a H,
    root: &'a Path,
    timeout: Duration,
}

impl<'a, H: Host + ?Sized> Probe<'a, H> {
    pub fn new(host: &'a H, root: &'a Path, timeout: Duration) -> Self {
        Self {
            host,
            root,
            timeout,
        }
    }

    pub fn run(&self, target: &str, arch: Arch) -> ProbeOutcome {
        let request = ExecRequest {
            root: self.root,
            arch,
            target,
            timeout: self.timeout,
        };

        let stdout = match self.host.execute(&request) {
            Ok(stdout) => stdout,
            Err(HostError::Timeout(limit)) => {
                warn!("{target} ({arch}) timed out after {limit:?}");
                return ProbeOutcome::Failed(ErrorMarker::Timeout);
            }
            Err(e) => {
                warn!("{target} ({arch}): {e}");
                return ProbeOutcome::Failed(ErrorMarker::ProcessError);
            }
        };

        let raw = match RawOutput::decode(self.host.wire_format(), &stdout) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("{target} ({arch}): could not decode runner output: {e}");
                return ProbeOutcome::Failed(ErrorMarker::ProcessError);
            }
        };

        // TODO: keep the clean variants instead of throwing the whole run away
        if raw.is_empty() || raw.contains_emulator_error() {
            debug!("{target} ({arch}) rejected by qemu");
            return ProbeOutcome::Rejected;
        }

        ProbeOutcome::Completed(classify::classify(raw))
    }
}
