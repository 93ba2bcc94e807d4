//! Error types for the judging pipeline.
//!
//! Errors fall into two classes. Batch-fatal errors (a candidate project that
//! will not build, a bad configuration, a report sink that stopped accepting
//! lines) abort the whole run. Everything else belongs to a single test case
//! and is folded into that case's verdict by the pipeline.

use crate::artifact::TestId;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Build-side step that produced a [`HarnessError::CommandFailed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildStep {
    /// Compiling a test source plus support library into a reference binary.
    Reference,
    /// Compiling a test source into LLVM bitcode for the candidate.
    Bitcode,
    /// Configure phase of the candidate project rebuild.
    Configure,
    /// Build phase of the candidate project rebuild.
    Compile,
}

impl BuildStep {
    /// Returns the step name as a static string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reference => "reference build",
            Self::Bitcode => "bitcode build",
            Self::Configure => "candidate configure",
            Self::Compile => "candidate build",
        }
    }

    /// Returns true for the two phases of the candidate project rebuild.
    #[must_use]
    pub const fn is_candidate_project(self) -> bool {
        matches!(self, Self::Configure | Self::Compile)
    }
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while building, running, or reporting.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A process could not be spawned or waited on.
    #[error("failed to run `{program}`: {source}")]
    Process {
        /// Program as it was given to the invocation.
        program: String,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A build step ran but exited unsuccessfully.
    #[error("{step} failed: `{program}` exited with {status}{}", stderr_suffix(.stderr))]
    CommandFailed {
        /// Which build step failed.
        step: BuildStep,
        /// Program as it was given to the invocation.
        program: String,
        /// Human readable exit status (`status 1`, `signal 9`, `timeout`).
        status: String,
        /// Captured standard error of the failed step.
        stderr: String,
    },

    /// Filesystem operation on an artifact failed.
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        /// Path being read, written, or removed.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The test source cannot be handed to the candidate as one argument.
    #[error("source of testcase {id} cannot be passed inline: {reason}")]
    InlineArgument {
        /// Test case whose source was rejected.
        id: TestId,
        /// Why the source was rejected.
        reason: &'static str,
    },

    /// Writing to the report sink failed.
    #[error("failed to write report: {0}")]
    Report(#[source] io::Error),
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim_end();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("\n{trimmed}")
    }
}

impl HarnessError {
    /// Wraps an I/O error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true if the error invalidates every verdict of the batch.
    #[must_use]
    pub const fn is_batch_fatal(&self) -> bool {
        match self {
            Self::CommandFailed { step, .. } => step.is_candidate_project(),
            Self::Config(_) | Self::Report(_) => true,
            Self::Process { .. } | Self::Io { .. } | Self::InlineArgument { .. } => false,
        }
    }
}

/// Result type for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;
