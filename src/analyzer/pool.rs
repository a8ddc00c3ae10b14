use std::{
    collections::BTreeMap,
    path::Path,
    sync::{Mutex, PoisonError},
    thread,
};
use tracing::{debug, trace};

use super::{AnalysisError, ArchResult, FileResult};
use crate::{
    arch::Arch,
    config::ProbeConfig,
    host::Host,
    probe::{Probe, ProbeOutcome},
};

/// One (file, architecture) pair to run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Job {
    pub uid: String,
    /// Root-relative, leading slash
    pub path: String,
    pub arch: Arch,
}

/// Results keyed by file id, filled in by the workers as they finish
#[derive(Default)]
struct ResultStore {
    files: Mutex<BTreeMap<String, FileResult>>,
}

impl ResultStore {
    /// Only the insert itself is done under the lock
    fn merge(&self, job: Job, outcome: ProbeOutcome) {
        let result = match outcome {
            ProbeOutcome::Completed(normalized) => ArchResult::Completed(normalized),
            ProbeOutcome::Failed(error) => ArchResult::Failed { error },
            ProbeOutcome::Rejected => return,
        };

        let mut files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        files
            .entry(job.uid)
            .or_insert_with(|| FileResult {
                path: job.path,
                results: BTreeMap::new(),
                executable: false,
            })
            .results
            .insert(job.arch, result);
    }

    fn into_inner(self) -> BTreeMap<String, FileResult> {
        self.files
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Runs every job on `config.workers` threads and waits for all of them.
///
/// Files where every architecture was rejected don't show up at all.
pub fn run<H: Host + ?Sized>(
    jobs: Vec<Job>,
    host: &H,
    root: &Path,
    config: &ProbeConfig,
) -> Result<BTreeMap<String, FileResult>, AnalysisError> {
    let store = ResultStore::default();
    if jobs.is_empty() {
        return Ok(store.into_inner());
    }

    let workers = config.workers.max(1).min(jobs.len());
    debug!("{} jobs on {workers} workers", jobs.len());

    let (tx, rx) = flume::unbounded::<Job>();
    for job in jobs {
        tx.send(job)
            .map_err(|e| AnalysisError::Pool(e.to_string()))?;
    }
    // workers stop once the queue is drained
    drop(tx);

    thread::scope(|s| -> Result<(), AnalysisError> {
        for i in 0..workers {
            let rx = rx.clone();
            let store = &store;
            thread::Builder::new()
                .name(format!("probe-{i}"))
                .spawn_scoped(s, move || {
                    let probe = Probe::new(host, root, config.timeout);
                    for job in rx.iter() {
                        trace!("{} ({})", job.path, job.arch);
                        let outcome = probe.run(&job.path, job.arch);
                        store.merge(job, outcome);
                    }
                })
                .map_err(|e| AnalysisError::Pool(e.to_string()))?;
        }
        Ok(())
    })?;

    Ok(store.into_inner())
}
