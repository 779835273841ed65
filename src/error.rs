use std::error::Error as StdError;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// Any failure that cannot be confidently attributed to any other error
    /// category in this enum.
    Internal,

    /// The user provided invalid input, such as a missing target or an
    /// out-of-range option.
    User,

    /// The external tool refused the operation or could not be started.
    External,
}

/// Fine-grained condition flags for consumers that want to branch on error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The target path could not be looked up (missing or inaccessible).
    TargetUnavailable,
    /// The target exists but is neither a regular file nor a directory.
    TargetUnsupported,
    /// Recursive enumeration of a directory failed part way.
    Traversal,
    /// The external tool could not be spawned.
    ToolSpawn,
    /// The external tool ran and exited unsuccessfully.
    ToolExit,
    /// The tool succeeded but removing the source file afterwards failed.
    Cleanup,
    /// Batch configuration values are out of range.
    InvalidConfig,
}

#[derive(Debug, Error)]
#[error("{msg}")]
pub struct BatchError {
    /// Broad error category, always provided.
    pub category: ErrorCategory,
    /// Optional specific condition tag. Any code consuming errors MUST handle
    /// the absence of a defined kind.
    pub kind: Option<ErrorKind>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    msg: String,
}

impl BatchError {
    /// Creates a new error that also tags the failure with a kind.
    pub fn with_kind(category: ErrorCategory, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that carries both a kind tag and the originating source error.
    pub fn with_kind_and_source(
        category: ErrorCategory,
        kind: ErrorKind,
        msg: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: Some(Box::new(source)),
            msg: msg.into(),
        }
    }

    /// The user-facing message carried by the error.
    pub fn message(&self) -> &str {
        &self.msg
    }

    /// Returns the preserved source error if present.
    pub fn source_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Wraps the current error with a higher-level message while preserving the original as source.
    pub fn with_context(self, msg: impl Into<String>) -> Self {
        let category = self.category;
        let kind = self.kind;
        Self {
            category,
            kind,
            source: Some(Box::new(self)),
            msg: msg.into(),
        }
    }

    /// Renders the message followed by every source in the chain, separated by `: `.
    pub fn chain_message(&self) -> String {
        let mut rendered = self.msg.clone();
        let mut next = StdError::source(self);
        while let Some(cause) = next {
            rendered.push_str(": ");
            rendered.push_str(&cause.to_string());
            next = cause.source();
        }
        rendered
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, BatchError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_with_context_keeps_kind_and_category() {
        let inner =
            BatchError::with_kind(ErrorCategory::User, ErrorKind::InvalidConfig, "jobs is 0");
        let outer = inner.with_context("loading batch settings");
        assert_eq!(outer.category, ErrorCategory::User);
        assert_eq!(outer.kind, Some(ErrorKind::InvalidConfig));
        assert_eq!(outer.message(), "loading batch settings");
        assert!(outer.source_error().is_some());
    }

    #[test]
    fn test_chain_message_includes_sources() {
        let err = BatchError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Cleanup,
            "failed to remove a.txt",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        )
        .with_context("a.txt.encrypt written");
        assert_eq!(
            err.chain_message(),
            "a.txt.encrypt written: failed to remove a.txt: denied"
        );
    }
}
