//! gpgbatch CLI - encrypt, decrypt, sign or verify every file under a path
//!
//! Each file is handed to gpg in its own subprocess, with a bounded number of
//! subprocesses running at once.

use clap::{ArgGroup, Parser};
use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use gpgbatch::batch::{self, BatchRequest};
use gpgbatch::completion;
use gpgbatch::dispatch::DEFAULT_CAPACITY;
use gpgbatch::{BatchConfig, BatchError, ErrorCategory, ErrorKind, GpgTool, Operation, Result};

#[derive(Parser)]
#[command(name = "gpgbatch")]
#[command(version)]
#[command(about = "Apply one gpg operation to every file under a path.", long_about = None)]
#[command(group(
    ArgGroup::new("operation")
        .args(["encrypt", "decrypt", "sign", "verify"])
        .multiple(false)
))]
struct Cli {
    /// Encrypt each file to <FILE>.encrypt for the --key recipient, removing the original
    #[arg(short, long)]
    encrypt: bool,

    /// Decrypt each <FILE>.encrypt back to <FILE>, removing the encrypted copy
    #[arg(short, long)]
    decrypt: bool,

    /// Write a detached signature <FILE>.sig for each file
    #[arg(short, long)]
    sign: bool,

    /// Verify each file against its detached signature
    #[arg(short, long)]
    verify: bool,

    /// File or directory to process
    #[arg(short, long, value_name = "PATH", required_unless_present = "completion_script")]
    target: Option<PathBuf>,

    /// Recipient key (encrypt) or signing key (sign)
    #[arg(short, long, value_name = "KEY")]
    key: Option<String>,

    /// Number of files processed at once
    #[arg(short, long, value_name = "N", default_value_t = DEFAULT_CAPACITY)]
    jobs: usize,

    /// Program to run in place of gpg
    #[arg(long, value_name = "PROGRAM", env = "GPGBATCH_GPG", default_value = "gpg")]
    gpg: OsString,

    /// Extra argument for every gpg call, placed before the operation arguments
    #[arg(long = "gpg-arg", value_name = "ARG", allow_hyphen_values = true)]
    gpg_args: Vec<OsString>,

    /// Only report failures
    #[arg(short, long)]
    quiet: bool,

    /// Print a zsh completion script and exit
    #[arg(long)]
    completion_script: bool,
}

impl Cli {
    fn operation(&self) -> Option<Operation> {
        if self.encrypt {
            Some(Operation::Encrypt)
        } else if self.decrypt {
            Some(Operation::Decrypt)
        } else if self.sign {
            Some(Operation::Sign)
        } else if self.verify {
            Some(Operation::Verify)
        } else {
            None
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.quiet);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e.chain_message());
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    if cli.completion_script {
        print!("{}", completion::zsh_script(&program_name()));
        return Ok(());
    }

    let operation = cli.operation().ok_or_else(|| {
        BatchError::with_kind(
            ErrorCategory::User,
            ErrorKind::InvalidConfig,
            "missing one of --encrypt, --decrypt, --sign or --verify",
        )
    })?;
    let target = cli.target.ok_or_else(|| {
        BatchError::with_kind(
            ErrorCategory::User,
            ErrorKind::InvalidConfig,
            "missing --target",
        )
    })?;

    let config = BatchConfig::default().with_jobs(cli.jobs);
    let tool = GpgTool::new(cli.gpg).with_extra_args(cli.gpg_args);
    let request = BatchRequest::new(operation, target, cli.key);

    // Per-file failures are logged by the batch and do not change the exit status.
    batch::run(&config, &request, Arc::new(tool))?;
    Ok(())
}

fn init_logging(quiet: bool) {
    let default_directive = if quiet { "warn" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .init();
}

fn program_name() -> String {
    std::env::args_os()
        .next()
        .as_deref()
        .and_then(|arg0| Path::new(arg0).file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "gpgbatch".to_string())
}
