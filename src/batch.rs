//! One batch run: walk the target, fan the files out, collect the outcomes

use crate::config::BatchConfig;
use crate::dispatch::{Dispatcher, WorkUnit};
use crate::error::Result;
use crate::executor::{self, Outcome};
use crate::operation::Operation;
use crate::tool::CryptoTool;
use crate::walker;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What to do and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub operation: Operation,
    pub root: PathBuf,
    /// Recipient for encryption, signer for signing; ignored otherwise.
    pub key: Option<String>,
}

impl BatchRequest {
    pub fn new(operation: Operation, root: impl Into<PathBuf>, key: Option<String>) -> Self {
        Self {
            operation,
            root: root.into(),
            key,
        }
    }
}

/// The outcome for one file.
#[derive(Debug)]
pub struct FileReport {
    pub path: PathBuf,
    pub operation: Operation,
    pub outcome: Outcome,
}

/// Per-outcome counts for a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cleanup_failed: usize,
}

/// Every file report of a batch, in completion order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub files: Vec<FileReport>,
}

impl BatchReport {
    pub fn tally(&self) -> Tally {
        let mut tally = Tally::default();
        for report in &self.files {
            match report.outcome {
                Outcome::Completed { .. } | Outcome::Verified { .. } => tally.succeeded += 1,
                Outcome::Skipped => tally.skipped += 1,
                Outcome::MissingKey | Outcome::ToolFailed(_) => tally.failed += 1,
                Outcome::CleanupFailed { .. } => tally.cleanup_failed += 1,
            }
        }
        tally
    }

    pub fn get(&self, path: &Path) -> Option<&FileReport> {
        self.files.iter().find(|r| r.path == path)
    }

    pub fn has_failures(&self) -> bool {
        self.files.iter().any(|r| r.outcome.is_failure())
    }
}

/// Apply `request.operation` to every regular file under `request.root`.
///
/// Only an invalid configuration or a failure to walk the target is returned
/// as an error. If the walk fails part way, files already dispatched still run
/// to completion before the error is returned.
pub fn run(
    config: &BatchConfig,
    request: &BatchRequest,
    tool: Arc<dyn CryptoTool>,
) -> Result<BatchReport> {
    config.validate()?;

    let suffixes = config.suffixes.clone();
    let mut dispatcher = Dispatcher::new(config.jobs, move |unit: &WorkUnit| {
        let outcome = executor::execute(unit, tool.as_ref(), &suffixes);
        let report = FileReport {
            path: unit.path.clone(),
            operation: unit.operation,
            outcome,
        };
        log_report(&report);
        report
    });

    let key: Option<Arc<str>> = request
        .key
        .as_deref()
        .filter(|k| !k.is_empty())
        .map(Arc::from);
    let walked = walker::walk(&request.root, &config.housekeeping, |path| {
        dispatcher.submit(WorkUnit::with_shared_key(path, request.operation, key.clone()));
    });

    let submitted = dispatcher.submitted();
    let files = dispatcher.finish();
    if let Err(e) = walked {
        tracing::error!(dispatched = submitted, "traversal aborted: {}", e.chain_message());
        return Err(e);
    }

    let report = BatchReport { files };
    let tally = report.tally();
    tracing::info!(
        operation = %request.operation,
        files = submitted,
        succeeded = tally.succeeded,
        skipped = tally.skipped,
        failed = tally.failed,
        cleanup_failed = tally.cleanup_failed,
        "batch finished"
    );
    Ok(report)
}

fn log_report(report: &FileReport) {
    let path = report.path.display();
    match &report.outcome {
        Outcome::Skipped => {
            tracing::debug!(path = %path, operation = %report.operation, "skipped");
        }
        Outcome::MissingKey => {
            tracing::warn!(path = %path, "no key specified, not encrypting");
        }
        Outcome::ToolFailed(e) => {
            tracing::warn!(path = %path, "{}", e.chain_message());
        }
        Outcome::Completed { artifact } => match report.operation {
            Operation::Encrypt => tracing::info!(path = %path, "encrypted to {}", artifact.display()),
            Operation::Decrypt => tracing::info!(path = %path, "decrypted to {}", artifact.display()),
            _ => tracing::info!(path = %path, "signed to {}", artifact.display()),
        },
        Outcome::Verified {
            signature,
            original,
        } => {
            tracing::info!(
                "signature ok: {} <--> {}",
                original.display(),
                signature.display()
            );
        }
        Outcome::CleanupFailed { error, .. } => {
            tracing::warn!(path = %path, "cleanup failed: {}", error.chain_message());
        }
    }
}
