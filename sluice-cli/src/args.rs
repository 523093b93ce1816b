//! Command-line argument parsing

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use sluice_engine::FailurePolicy;

/// Sluice uploader
///
/// Flattens the given files and directories into a queue and uploads them
/// to the endpoint one at a time, preserving relative paths.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Upload endpoint (files POST to <endpoint>/<relative path>)
    #[arg(short, long)]
    pub endpoint: String,

    /// Files and directories to upload
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// What the queue does after a failed transfer
    #[arg(long = "on-failure", value_enum, default_value_t = OnFailure::Halt)]
    pub on_failure: OnFailure,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,
}

/// Failure policy as a command-line choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OnFailure {
    /// Stop at the failed file; nothing after it is attempted
    Halt,
    /// Leave the failure on record and keep uploading
    Skip,
}

impl From<OnFailure> for FailurePolicy {
    fn from(choice: OnFailure) -> Self {
        match choice {
            OnFailure::Halt => FailurePolicy::Halt,
            OnFailure::Skip => FailurePolicy::SkipAndContinue,
        }
    }
}
