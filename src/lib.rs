//! gpgbatch - apply one gpg operation to every file under a path
//!
//! Files are discovered by [`walker`], fanned out by [`dispatch`] under a fixed
//! concurrency cap, and handled one by one by [`executor`], which shells out to
//! the external tool through [`tool`]. [`batch::run`] ties these together.

#![forbid(unsafe_code)]

pub mod batch;
pub mod completion;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod operation;
pub mod tool;
pub mod walker;

pub use batch::{BatchReport, BatchRequest, FileReport, Tally};
pub use config::BatchConfig;
pub use error::{BatchError, ErrorCategory, ErrorKind, Result};
pub use executor::Outcome;
pub use operation::{Operation, Suffixes};
pub use tool::{CryptoTool, GpgTool, Invocation};
