//! Content identifiers: the same bytes get the same id, wherever they live

use sha2::{Digest, Sha256};
use std::{fs::File, io, path::Path};

pub fn content_id(data: &[u8]) -> String {
    format!("{}_{}", hex::encode(Sha256::digest(data)), data.len())
}

/// Streams the file instead of loading it whole
pub fn content_id_of(path: &Path) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let len = io::copy(&mut File::open(path)?, &mut hasher)?;
    Ok(format!("{}_{}", hex::encode(hasher.finalize()), len))
}
