//! Knobs for a probing run

use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 15;
pub const DEFAULT_WORKERS: usize = 8;
pub const DEFAULT_IMAGE: &str = "fact/qemu:latest";

/// Where the firmware root is bind mounted inside the sandbox
pub const FIRMWARE_MOUNT: &str = "/opt/firmware_root";

/// Unpackers may put the real root one level down, in a folder with this name
pub const EXTRACTION_FOLDER: &str = "fact_extracted";

pub const EXECUTABLE_MIMES: [&str; 2] = ["application/x-executable", "application/x-sharedlib"];

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Wall clock limit for a single sandbox run
    pub timeout: Duration,
    /// Width of the worker pool
    pub workers: usize,
    pub image: String,
    pub mount_point: String,
    pub extraction_folder: String,
    pub executable_mimes: Vec<String>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
            workers: DEFAULT_WORKERS,
            image: DEFAULT_IMAGE.to_string(),
            mount_point: FIRMWARE_MOUNT.to_string(),
            extraction_folder: EXTRACTION_FOLDER.to_string(),
            executable_mimes: EXECUTABLE_MIMES.iter().map(|m| m.to_string()).collect(),
        }
    }
}

impl ProbeConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// A pool needs at least one worker
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn is_executable_mime(&self, mime: &str) -> bool {
        self.executable_mimes.iter().any(|m| m == mime)
    }
}
