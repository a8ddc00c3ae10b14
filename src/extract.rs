//! Getting a container's contents onto disk for the duration of a run

use std::{
    fs::File,
    path::{Path, PathBuf},
};
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, error};

const TEMP_PREFIX: &str = "qemu_probe";

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0} is not a file")]
    MissingSource(PathBuf),
}

/// An unpacked tree. Temporary ones are deleted when this is dropped.
#[derive(Debug)]
pub enum Extraction {
    Temporary(TempDir),
    /// Already on disk and not ours to delete
    Existing(PathBuf),
}

impl Extraction {
    pub fn path(&self) -> &Path {
        match self {
            Extraction::Temporary(dir) => dir.path(),
            Extraction::Existing(path) => path,
        }
    }
}

pub trait Extractor: Sync {
    /// `None` if the source can't be unpacked, the reason is logged
    fn extract(&self, source: &Path) -> Option<Extraction>;
}

/// Directories are used as they are, anything else is treated as a tar archive
pub struct ArchiveExtractor;

impl ArchiveExtractor {
    fn unpack(&self, source: &Path) -> Result<TempDir, ExtractError> {
        if !source.is_file() {
            return Err(ExtractError::MissingSource(source.to_path_buf()));
        }

        let dir = tempfile::Builder::new().prefix(TEMP_PREFIX).tempdir()?;
        tar::Archive::new(File::open(source)?).unpack(dir.path())?;
        debug!("unpacked {} to {}", source.display(), dir.path().display());

        Ok(dir)
    }
}

impl Extractor for ArchiveExtractor {
    fn extract(&self, source: &Path) -> Option<Extraction> {
        if source.is_dir() {
            // bind mounts need an absolute source, docker reads `fw:` as a volume name
            return match source.canonicalize() {
                Ok(path) => Some(Extraction::Existing(path)),
                Err(e) => {
                    error!("could not resolve {}: {e}", source.display());
                    None
                }
            };
        }

        match self.unpack(source) {
            Ok(dir) => Some(Extraction::Temporary(dir)),
            Err(e) => {
                error!("could not unpack {}: {e}", source.display());
                None
            }
        }
    }
}
