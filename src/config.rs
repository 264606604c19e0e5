use crate::error::{HoundError, Result};

/// Classes larger than this are skipped and reported as a recoverable failure.
pub const MAX_CLASS_SIZE: usize = 16 * 1024 * 1024; // 16MB

/// Scan driver settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Maximum size of a single class file in bytes
    pub max_class_size: usize,
    /// Scan classes on a rayon pool and merge per-class results afterwards
    pub parallel: bool,
    /// Worker threads used when `parallel` is set
    pub max_threads: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self { max_class_size: MAX_CLASS_SIZE, parallel: false, max_threads: available_threads() }
    }
}

impl ScanConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration and return errors for invalid settings
    pub fn validate(&self) -> Result<()> {
        if self.max_class_size == 0 {
            return Err(HoundError::configuration("max_class_size must be greater than 0"));
        }
        if self.max_threads == 0 {
            return Err(HoundError::configuration("max_threads must be greater than 0"));
        }
        Ok(())
    }

    /// Single-threaded, deterministic detection order
    #[must_use]
    pub fn sequential() -> Self {
        Self { parallel: false, ..Self::default() }
    }

    /// One rayon worker per available core
    #[must_use]
    pub fn parallel() -> Self {
        Self { parallel: true, ..Self::default() }
    }
}

fn available_threads() -> usize {
    std::thread::available_parallelism().map(std::num::NonZero::get).unwrap_or(1)
}
