//! Byte-exact comparison of expected and actual output.
//!
//! No normalisation of any kind: a missing trailing newline is a failure.
//! A missing file is never equal to anything, including another missing file.

use serde::Serialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

/// Output read back from disk, keeping "absent" apart from "empty".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapturedOutput {
    /// The file exists with these bytes (possibly none).
    Present(Vec<u8>),
    /// The file does not exist.
    Missing,
}

impl CapturedOutput {
    /// Reads `path`; `NotFound` becomes [`CapturedOutput::Missing`].
    pub fn load(path: &Path) -> io::Result<Self> {
        match fs::read(path) {
            Ok(bytes) => Ok(Self::Present(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::Missing),
            Err(e) => Err(e),
        }
    }

    /// Bytes, if present.
    #[must_use]
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Present(bytes) => Some(bytes),
            Self::Missing => None,
        }
    }
}

impl From<&[u8]> for CapturedOutput {
    fn from(bytes: &[u8]) -> Self {
        Self::Present(bytes.to_vec())
    }
}

impl From<&str> for CapturedOutput {
    fn from(text: &str) -> Self {
        Self::Present(text.as_bytes().to_vec())
    }
}

/// Pipeline stage a per-case error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    /// Compiling the reference binary.
    ReferenceBuild,
    /// Running the reference binary.
    Oracle,
    /// Compiling the candidate's bitcode input.
    BitcodeBuild,
    /// Running the candidate.
    Candidate,
    /// Reading outputs back for comparison.
    Compare,
}

impl Stage {
    /// Returns the stage name as a static string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReferenceBuild => "reference build",
            Self::Oracle => "oracle",
            Self::BitcodeBuild => "bitcode build",
            Self::Candidate => "candidate",
            Self::Compare => "compare",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a test case failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FailureReason {
    /// No `std<NN>.txt`.
    ExpectedMissing,
    /// No `ans<NN>.txt`.
    ActualMissing,
    /// Both exist but differ.
    Mismatch {
        /// Length of the expected output.
        expected_len: usize,
        /// Length of the actual output.
        actual_len: usize,
        /// Offset of the first differing byte (the shorter length on a
        /// prefix match).
        first_difference: usize,
    },
    /// A pipeline stage failed before comparison could happen.
    Error {
        /// Stage that failed.
        stage: Stage,
        /// Rendered error.
        message: String,
    },
}

impl FailureReason {
    /// True for failures caused by the harness or toolchain rather than by
    /// the candidate's output.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExpectedMissing => f.write_str("expected output missing"),
            Self::ActualMissing => f.write_str("actual output missing"),
            Self::Mismatch {
                expected_len,
                actual_len,
                first_difference,
            } => write!(
                f,
                "output differs at byte {first_difference} \
                 (expected {expected_len} bytes, got {actual_len})"
            ),
            Self::Error { stage, message } => write!(f, "{stage} failed: {message}"),
        }
    }
}

/// Per-case grading decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "kebab-case")]
pub enum Verdict {
    /// Outputs are byte-identical.
    Passed,
    /// Anything else.
    Failed(FailureReason),
}

impl Verdict {
    /// True for [`Verdict::Passed`].
    #[must_use]
    pub const fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    /// Failure reason, if failed.
    #[must_use]
    pub const fn reason(&self) -> Option<&FailureReason> {
        match self {
            Self::Passed => None,
            Self::Failed(reason) => Some(reason),
        }
    }
}

/// Grades `actual` against `expected`.
#[must_use]
pub fn compare(expected: &CapturedOutput, actual: &CapturedOutput) -> Verdict {
    let (expected, actual) = match (expected, actual) {
        (CapturedOutput::Missing, _) => return Verdict::Failed(FailureReason::ExpectedMissing),
        (_, CapturedOutput::Missing) => return Verdict::Failed(FailureReason::ActualMissing),
        (CapturedOutput::Present(e), CapturedOutput::Present(a)) => (e, a),
    };
    if expected == actual {
        return Verdict::Passed;
    }
    let first_difference = expected
        .iter()
        .zip(actual.iter())
        .position(|(e, a)| e != a)
        .unwrap_or_else(|| expected.len().min(actual.len()));
    Verdict::Failed(FailureReason::Mismatch {
        expected_len: expected.len(),
        actual_len: actual.len(),
        first_difference,
    })
}

/// Loads both files and grades them.
pub fn compare_files(expected: &Path, actual: &Path) -> io::Result<Verdict> {
    Ok(compare(
        &CapturedOutput::load(expected)?,
        &CapturedOutput::load(actual)?,
    ))
}
