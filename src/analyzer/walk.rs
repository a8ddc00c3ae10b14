use std::path::{Component, Path, PathBuf};
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::{config::ProbeConfig, detect::TypeDetector};

/// A file worth running
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    /// Relative to the root, posix style with a leading slash
    pub path: String,
    pub full_type: String,
}

/// The unpacker may have put everything one level down
pub fn find_root(dir: &Path, extraction_folder: &str) -> PathBuf {
    let nested = dir.join(extraction_folder);
    if nested.is_dir() {
        nested
    } else {
        dir.to_path_buf()
    }
}

/// Regular files under `root` whose mime is one we can execute.
///
/// Symlinks are never followed or reported.
pub fn relevant_files<D: TypeDetector + ?Sized>(
    root: &Path,
    detector: &D,
    config: &ProbeConfig,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("skipping unreadable entry: {e}");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let Some(file_type) = detector.file_type(entry.path()) else {
            continue;
        };

        if !config.is_executable_mime(&file_type.mime) {
            continue;
        }

        let Some(path) = posix_path(root, entry.path()) else {
            continue;
        };

        trace!("{path}: {}", file_type.full);
        candidates.push(Candidate {
            path,
            full_type: file_type.full,
        });
    }

    candidates
}

/// `/usr/bin/ls` for `<root>/usr/bin/ls`
pub fn posix_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;

    let mut out = String::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                out.push('/');
                out.push_str(&part.to_string_lossy());
            }
            _ => return None,
        }
    }

    (!out.is_empty()).then_some(out)
}

/// Back from a candidate path to the file on disk
pub fn host_path(root: &Path, path: &str) -> PathBuf {
    root.join(path.trim_start_matches('/'))
}
