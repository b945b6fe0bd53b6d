use crate::error::ScanError;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;

/// Delimiter used when the caller has no preference: project-root style paths at line start.
pub const DEFAULT_DELIMITER: &str = r"^/project_root/";

/// 1 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    /// Regular expression tested against every line; a match starts a new logical file.
    pub delimiter_pattern: String,
    /// Bytes per chunk. Must be > 0.
    pub chunk_size: usize,
    /// Worker threads for the parallel scan; `None` = available hardware parallelism.
    pub workers: Option<usize>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            delimiter_pattern: DEFAULT_DELIMITER.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: None,
        }
    }
}

impl ScanOptions {
    pub fn with_pattern(pattern: impl Into<String>) -> Self {
        Self {
            delimiter_pattern: pattern.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ScanError> {
        if self.chunk_size == 0 {
            return Err(ScanError::InvalidChunkSize);
        }
        if self.workers == Some(0) {
            return Err(ScanError::InvalidWorkerCount);
        }
        Ok(())
    }

    pub fn effective_workers(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let o = ScanOptions::default();
        assert_eq!(o.delimiter_pattern, "^/project_root/");
        assert_eq!(o.chunk_size, 1 << 20);
        assert!(o.effective_workers() >= 1);
        assert!(o.validate().is_ok());
    }

    #[test]
    fn rejects_zero_sizes() {
        let o = ScanOptions {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(matches!(o.validate(), Err(ScanError::InvalidChunkSize)));
        let o = ScanOptions {
            workers: Some(0),
            ..Default::default()
        };
        assert!(matches!(o.validate(), Err(ScanError::InvalidWorkerCount)));
    }
}
