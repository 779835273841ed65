//! Operations and the file naming conventions they rely on

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

/// The cryptographic operation applied to every file of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Encrypt,
    Decrypt,
    Sign,
    Verify,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Encrypt,
        Operation::Decrypt,
        Operation::Sign,
        Operation::Verify,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Operation::Encrypt => "encrypt",
            Operation::Decrypt => "decrypt",
            Operation::Sign => "sign",
            Operation::Verify => "verify",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Suffixes marking the output of encryption and detached signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suffixes {
    pub encrypted: String,
    pub signature: String,
}

impl Default for Suffixes {
    fn default() -> Self {
        Self {
            encrypted: ".encrypt".to_string(),
            signature: ".sig".to_string(),
        }
    }
}

/// Whether the final component of `path` ends with `suffix`.
pub fn has_suffix(path: &Path, suffix: &str) -> bool {
    path.file_name()
        .is_some_and(|name| name.as_encoded_bytes().ends_with(suffix.as_bytes()))
}

/// `path` with `suffix` appended to its final component.
pub fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut joined = OsString::from(path.as_os_str());
    joined.push(suffix);
    PathBuf::from(joined)
}

/// `path` with `suffix` removed from its final component.
///
/// Returns `None` when the name does not carry the suffix, or when removing it
/// would leave an empty file name.
pub fn strip_suffix(path: &Path, suffix: &str) -> Option<PathBuf> {
    let name = path.file_name()?;
    let stripped = strip_name(name, suffix)?;
    if stripped.is_empty() {
        return None;
    }
    Some(path.with_file_name(stripped))
}

fn strip_name(name: &std::ffi::OsStr, suffix: &str) -> Option<OsString> {
    if let Some(name) = name.to_str() {
        return name.strip_suffix(suffix).map(OsString::from);
    }

    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;
        name.as_bytes()
            .strip_suffix(suffix.as_bytes())
            .map(|kept| std::ffi::OsStr::from_bytes(kept).to_os_string())
    }

    #[cfg(not(unix))]
    {
        None
    }
}
