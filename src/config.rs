//! Batch configuration

use crate::dispatch::DEFAULT_CAPACITY;
use crate::error::{BatchError, ErrorCategory, ErrorKind, Result};
use crate::operation::Suffixes;
use crate::walker::DEFAULT_HOUSEKEEPING;

/// Settings shared by every file of a batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    /// Maximum number of files processed at once.
    pub jobs: usize,
    pub suffixes: Suffixes,
    /// File names never handed to the tool during directory traversal.
    pub housekeeping: Vec<String>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            jobs: DEFAULT_CAPACITY,
            suffixes: Suffixes::default(),
            housekeeping: DEFAULT_HOUSEKEEPING.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl BatchConfig {
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.jobs == 0 {
            return Err(invalid("jobs must be at least 1"));
        }
        if self.suffixes.encrypted.is_empty() || self.suffixes.signature.is_empty() {
            return Err(invalid("suffixes must not be empty"));
        }
        if self.suffixes.encrypted == self.suffixes.signature {
            return Err(invalid(format!(
                "encrypted and signature suffixes must differ (both are {:?})",
                self.suffixes.encrypted
            )));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> BatchError {
    BatchError::with_kind(ErrorCategory::User, ErrorKind::InvalidConfig, msg)
}
