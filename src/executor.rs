//! Per-file operation execution
//!
//! Every operation follows the same shape: skip files that already carry the
//! operation's output suffix, derive the output name, run the external tool,
//! and only after it reports success remove the file the output replaces.

use crate::dispatch::WorkUnit;
use crate::error::{BatchError, ErrorCategory, ErrorKind};
use crate::operation::{self, Operation, Suffixes};
use crate::tool::{CryptoTool, Invocation};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// Terminal state of one work unit.
#[derive(Debug)]
pub enum Outcome {
    /// The file already has (or, for decrypt, lacks) the suffix; nothing ran.
    Skipped,
    /// Encryption needs a recipient and none was given; nothing ran.
    MissingKey,
    /// The tool failed; the filesystem was left alone.
    ToolFailed(BatchError),
    /// The tool succeeded and any follow-up removal succeeded.
    Completed { artifact: PathBuf },
    /// A detached signature checked out.
    Verified { signature: PathBuf, original: PathBuf },
    /// The tool succeeded but the source file could not be removed afterwards.
    CleanupFailed { artifact: PathBuf, error: BatchError },
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Outcome::MissingKey | Outcome::ToolFailed(_) | Outcome::CleanupFailed { .. }
        )
    }
}

/// Apply the unit's operation to its file.
pub fn execute(unit: &WorkUnit, tool: &dyn CryptoTool, suffixes: &Suffixes) -> Outcome {
    let path = unit.path.as_path();
    match unit.operation {
        Operation::Encrypt => encrypt(path, unit.key(), tool, suffixes),
        Operation::Decrypt => decrypt(path, tool, suffixes),
        Operation::Sign => sign(path, unit.key(), tool, suffixes),
        Operation::Verify => verify(path, tool, suffixes),
    }
}

fn encrypt(path: &Path, key: Option<&str>, tool: &dyn CryptoTool, suffixes: &Suffixes) -> Outcome {
    if operation::has_suffix(path, &suffixes.encrypted) {
        return Outcome::Skipped;
    }
    let Some(recipient) = key else {
        return Outcome::MissingKey;
    };

    let encrypted = operation::append_suffix(path, &suffixes.encrypted);
    let invocation = Invocation::new(
        vec![
            "--output".into(),
            encrypted.clone().into_os_string(),
            "--encrypt".into(),
            "--recipient".into(),
            recipient.into(),
            path.as_os_str().to_owned(),
        ],
        Some(encrypted.clone()),
    );
    if let Err(e) = tool.run(&invocation) {
        return Outcome::ToolFailed(e.with_context(format!("failed to encrypt {}", path.display())));
    }

    remove_replaced(path, encrypted)
}

fn decrypt(path: &Path, tool: &dyn CryptoTool, suffixes: &Suffixes) -> Outcome {
    let Some(decrypted) = operation::strip_suffix(path, &suffixes.encrypted) else {
        return Outcome::Skipped;
    };

    let invocation = Invocation::new(
        vec![
            "--output".into(),
            decrypted.clone().into_os_string(),
            "--decrypt".into(),
            path.as_os_str().to_owned(),
        ],
        Some(decrypted.clone()),
    );
    if let Err(e) = tool.run(&invocation) {
        return Outcome::ToolFailed(e.with_context(format!("failed to decrypt {}", path.display())));
    }

    remove_replaced(path, decrypted)
}

fn sign(path: &Path, key: Option<&str>, tool: &dyn CryptoTool, suffixes: &Suffixes) -> Outcome {
    if operation::has_suffix(path, &suffixes.signature) {
        return Outcome::Skipped;
    }

    let signature = operation::append_suffix(path, &suffixes.signature);
    let mut args: Vec<OsString> = vec![
        "--detach-sig".into(),
        "--output".into(),
        signature.clone().into_os_string(),
    ];
    // Without a key the tool falls back to its default signing identity.
    if let Some(signer) = key {
        args.push("--local-user".into());
        args.push(signer.into());
    }
    args.push("--sign".into());
    args.push(path.as_os_str().to_owned());

    match tool.run(&Invocation::new(args, Some(signature.clone()))) {
        Ok(()) => Outcome::Completed {
            artifact: signature,
        },
        Err(e) => Outcome::ToolFailed(e.with_context(format!("failed to sign {}", path.display()))),
    }
}

fn verify(path: &Path, tool: &dyn CryptoTool, suffixes: &Suffixes) -> Outcome {
    let (signature, original) = if operation::has_suffix(path, &suffixes.signature) {
        let original =
            operation::strip_suffix(path, &suffixes.signature).unwrap_or_else(|| path.to_path_buf());
        (path.to_path_buf(), original)
    } else {
        (
            operation::append_suffix(path, &suffixes.signature),
            path.to_path_buf(),
        )
    };

    let invocation = Invocation::new(
        vec!["--verify".into(), signature.clone().into_os_string()],
        None,
    );
    match tool.run(&invocation) {
        Ok(()) => Outcome::Verified {
            signature,
            original,
        },
        Err(e) => Outcome::ToolFailed(e.with_context(format!(
            "failed to verify {} against {}",
            original.display(),
            signature.display()
        ))),
    }
}

/// Remove `source` now that `artifact` supersedes it.
fn remove_replaced(source: &Path, artifact: PathBuf) -> Outcome {
    match fs::remove_file(source) {
        Ok(()) => Outcome::Completed { artifact },
        Err(e) => Outcome::CleanupFailed {
            error: BatchError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Cleanup,
                format!(
                    "{} was written but {} could not be removed",
                    artifact.display(),
                    source.display()
                ),
                e,
            ),
            artifact,
        },
    }
}
