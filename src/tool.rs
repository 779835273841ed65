//! Invocation of the external signing/encryption tool
//!
//! The batch engine never inspects the tool's output for meaning: the exit
//! status is the only success signal. Captured stderr is kept for diagnostics.

use crate::error::{BatchError, ErrorCategory, ErrorKind, Result};
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Mutex;

/// Longest stderr excerpt carried in a failure message.
const STDERR_EXCERPT_LIMIT: usize = 512;

/// One call of the external tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Operation-specific arguments, in order.
    pub args: Vec<OsString>,
    /// The file the tool is expected to create, if any.
    pub output: Option<PathBuf>,
}

impl Invocation {
    pub fn new(args: Vec<OsString>, output: Option<PathBuf>) -> Self {
        Self { args, output }
    }

    /// The arguments rendered lossily, for logs and assertions.
    pub fn display_args(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }
}

/// Trait for running the external tool
pub trait CryptoTool: Send + Sync {
    /// Run the tool once, returning `Ok` only if it exited successfully.
    fn run(&self, invocation: &Invocation) -> Result<()>;
}

/// Runs `gpg` (or a compatible program) as a subprocess.
#[derive(Debug, Clone)]
pub struct GpgTool {
    program: OsString,
    extra_args: Vec<OsString>,
}

impl GpgTool {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            extra_args: Vec::new(),
        }
    }

    /// Arguments placed before the operation-specific ones on every call.
    pub fn with_extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl Default for GpgTool {
    fn default() -> Self {
        Self::new("gpg")
    }
}

impl CryptoTool for GpgTool {
    fn run(&self, invocation: &Invocation) -> Result<()> {
        let program = self.program.to_string_lossy();
        tracing::debug!(program = %program, args = ?invocation.display_args(), "invoking tool");

        // stdin stays attached so an interactive pinentry can still prompt.
        let child = Command::new(&self.program)
            .args(&self.extra_args)
            .args(&invocation.args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                BatchError::with_kind_and_source(
                    ErrorCategory::External,
                    ErrorKind::ToolSpawn,
                    format!("failed to start {}", program),
                    e,
                )
            })?;

        let output = child.wait_with_output().map_err(|e| {
            BatchError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::ToolSpawn,
                format!("failed to wait for {}", program),
                e,
            )
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        if !stderr.is_empty() {
            tracing::debug!(program = %program, stderr = %stderr, "tool stderr");
        }

        if output.status.success() {
            return Ok(());
        }

        let status = match output.status.code() {
            Some(code) => format!("exit status {}", code),
            None => "termination by signal".to_string(),
        };
        let msg = if stderr.is_empty() {
            format!("{} failed with {}", program, status)
        } else {
            format!("{} failed with {}: {}", program, status, excerpt(stderr))
        };
        Err(BatchError::with_kind(
            ErrorCategory::External,
            ErrorKind::ToolExit,
            msg,
        ))
    }
}

fn excerpt(text: &str) -> &str {
    if text.len() <= STDERR_EXCERPT_LIMIT {
        return text;
    }
    let mut end = STDERR_EXCERPT_LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// How a [`ScriptedTool`] responds to every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedResponse {
    /// Exit successfully, creating the invocation's output file if it names one.
    Succeed,
    /// Exit unsuccessfully without touching the filesystem.
    Fail,
}

/// Records invocations and answers them in-process (for testing)
#[derive(Debug)]
pub struct ScriptedTool {
    response: ScriptedResponse,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedTool {
    pub fn new(response: ScriptedResponse) -> Self {
        Self {
            response,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(ScriptedResponse::Succeed)
    }

    pub fn failing() -> Self {
        Self::new(ScriptedResponse::Fail)
    }

    /// Every invocation seen so far, in call order.
    pub fn calls(&self) -> Vec<Invocation> {
        match self.calls.lock() {
            Ok(calls) => calls.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl CryptoTool for ScriptedTool {
    fn run(&self, invocation: &Invocation) -> Result<()> {
        match self.calls.lock() {
            Ok(mut calls) => calls.push(invocation.clone()),
            Err(poisoned) => poisoned.into_inner().push(invocation.clone()),
        }

        match self.response {
            ScriptedResponse::Fail => Err(BatchError::with_kind(
                ErrorCategory::External,
                ErrorKind::ToolExit,
                "scripted tool failed with exit status 2",
            )),
            ScriptedResponse::Succeed => {
                if let Some(output) = &invocation.output {
                    fs::write(output, b"scripted output").map_err(|e| {
                        BatchError::with_kind_and_source(
                            ErrorCategory::Internal,
                            ErrorKind::ToolExit,
                            format!("failed to write {}", output.display()),
                            e,
                        )
                    })?;
                }
                Ok(())
            }
        }
    }
}
