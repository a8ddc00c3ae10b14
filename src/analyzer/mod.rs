//! Ties the pieces together for one analyzed object:
//! unpack, find what looks runnable, probe every (file, architecture) pair
//! on the pool, then decide what ran.

pub mod pool;
pub mod verdict;
pub mod walk;

use serde::Serialize;
use std::{
    collections::{BTreeMap, HashSet},
    path::PathBuf,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use self::{pool::Job, verdict::Tag, walk::host_path};
use crate::{
    arch::{self, Arch},
    config::ProbeConfig,
    detect::TypeDetector,
    extract::Extractor,
    host::Host,
    probe::{classify::Normalized, ErrorMarker},
    uid,
};

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("sandbox backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("worker pool: {0}")]
    Pool(String),
}

/// What one architecture made of one file
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ArchResult {
    Failed { error: ErrorMarker },
    Completed(Normalized),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileResult {
    pub path: String,
    pub results: BTreeMap<Arch, ArchResult>,
    pub executable: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisResult {
    /// Only there when something executable-looking was found
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<BTreeMap<String, FileResult>>,
    pub summary: Vec<String>,
    /// The object is itself an executable, its container takes care of it
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub parent_flag: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<Tag>,
}

/// The object being analyzed, as handed over by whoever unpacked it
#[derive(Clone, Debug)]
pub struct InputObject {
    pub uid: String,
    /// `None` when the object's bytes aren't on disk
    pub file_path: Option<PathBuf>,
    pub mime: String,
    /// Whatever was unpacked from this object, only emptiness is looked at
    pub files_included: Vec<String>,
}

pub struct Analyzer<H, D, E> {
    pub host: H,
    pub detector: D,
    pub extractor: E,
    pub config: ProbeConfig,
}

impl<H: Host, D: TypeDetector, E: Extractor> Analyzer<H, D, E> {
    pub fn new(host: H, detector: D, extractor: E, config: ProbeConfig) -> Self {
        Self {
            host,
            detector,
            extractor,
            config,
        }
    }

    pub fn run(&self, object: &InputObject) -> Result<AnalysisResult, AnalysisError> {
        if !self.host.is_alive() {
            error!("{}: sandbox backend not reachable", object.uid);
            return Err(AnalysisError::BackendUnavailable(object.uid.clone()));
        }

        let mut result = AnalysisResult::default();

        if self.config.is_executable_mime(&object.mime) {
            debug!("{} is an executable, deferring to its container", object.uid);
            result.parent_flag = true;
            return Ok(result);
        }

        if object.files_included.is_empty() {
            return Ok(result);
        }

        let Some(source) = &object.file_path else {
            error!("could not unpack {}: file path not found", object.uid);
            return Ok(result);
        };
        // removed on every way out of this function, after the pool is done
        let Some(extraction) = self.extractor.extract(source) else {
            return Ok(result);
        };

        let root = walk::find_root(extraction.path(), &self.config.extraction_folder);
        let candidates = walk::relevant_files(&root, &self.detector, &self.config);
        if candidates.is_empty() {
            return Ok(result);
        }

        let mut seen = HashSet::new();
        let mut jobs = Vec::new();
        for candidate in candidates {
            let uid = match uid::content_id_of(&host_path(&root, &candidate.path)) {
                Ok(uid) => uid,
                Err(e) => {
                    warn!("skipping {}: {e}", candidate.path);
                    continue;
                }
            };

            if !seen.insert(uid.clone()) {
                debug!("{} already queued as {uid}", candidate.path);
                continue;
            }

            jobs.extend(arch::resolve(&candidate.full_type).iter().map(|&arch| Job {
                uid: uid.clone(),
                path: candidate.path.clone(),
                arch,
            }));
        }

        info!(
            "{}: {} files, {} jobs",
            object.uid,
            seen.len(),
            jobs.len()
        );

        let mut files = pool::run(jobs, &self.host, &root, &self.config)?;
        drop(extraction);

        for file in files.values_mut() {
            file.executable = verdict::is_executable(&file.results);
        }

        result.summary = verdict::summarize(&files);
        result.tag = verdict::tag(&files);
        result.files = Some(files);

        Ok(result)
    }
}
