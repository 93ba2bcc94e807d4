//! Candidate runner: invoke the program under test on one test case under a
//! wall-clock limit and record the designated output stream.

use crate::artifact::{ArtifactKind, ArtifactLayout, TestCase, TestId};
use crate::build::remove_stale;
use crate::error::{HarnessError, Result};
use crate::process::{Capture, Invocation, ProcessOutcome};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How the test input reaches the candidate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvocationMode {
    /// `<candidate> <path>`
    #[default]
    FileArgument,
    /// `<candidate> <entire source text>`
    InlineArgument,
}

/// The stream that carries the candidate's observable output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputStream {
    /// Standard output; stderr is discarded.
    #[default]
    Stdout,
    /// Standard error; stdout is discarded.
    Stderr,
}

impl OutputStream {
    const fn captures(self) -> (Capture, Capture) {
        match self {
            Self::Stdout => (Capture::Piped, Capture::Discard),
            Self::Stderr => (Capture::Discard, Capture::Piped),
        }
    }

    fn select(self, outcome: ProcessOutcome) -> Vec<u8> {
        match self {
            Self::Stdout => outcome.stdout,
            Self::Stderr => outcome.stderr,
        }
    }
}

/// Which artifact of the test case the candidate consumes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CandidateInput {
    /// The C source `test<NN>.c`.
    #[default]
    Source,
    /// The bitcode `test<NN>.bc`.
    Bitcode,
}

/// Record of one candidate run; the output bytes live in `ans<NN>.txt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActualOutput {
    /// Test case.
    pub id: TestId,
    /// Path of `ans<NN>.txt`.
    #[serde(skip)]
    pub path: PathBuf,
    /// Stream whose bytes were written to `ans<NN>.txt`.
    pub stream: OutputStream,
    /// Exit code, if the candidate exited normally.
    pub exit_code: Option<i32>,
    /// Terminating signal, if any.
    pub signal: Option<i32>,
    /// True if the candidate was killed at the time limit.
    pub timed_out: bool,
    /// Wall-clock running time in milliseconds.
    pub elapsed_ms: u64,
}

impl ActualOutput {
    /// `status N`, `signal N` or `timeout`.
    #[must_use]
    pub fn status_label(&self) -> String {
        ProcessOutcome {
            exit_code: self.exit_code,
            signal: self.signal,
            timed_out: self.timed_out,
            ..ProcessOutcome::default()
        }
        .status_label()
    }
}

/// Runs the program under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRunner {
    binary: PathBuf,
    leading_args: Vec<String>,
    mode: InvocationMode,
    stream: OutputStream,
    input: CandidateInput,
    time_limit: Duration,
}

impl CandidateRunner {
    /// Default per-invocation time limit.
    pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_secs(1);

    /// File-argument runner capturing stdout with the default time limit.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            leading_args: Vec::new(),
            mode: InvocationMode::default(),
            stream: OutputStream::default(),
            input: CandidateInput::default(),
            time_limit: Self::DEFAULT_TIME_LIMIT,
        }
    }

    /// Sets the invocation mode.
    #[must_use]
    pub const fn mode(mut self, mode: InvocationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the captured stream.
    #[must_use]
    pub const fn stream(mut self, stream: OutputStream) -> Self {
        self.stream = stream;
        self
    }

    /// Sets which artifact is passed.
    #[must_use]
    pub const fn input(mut self, input: CandidateInput) -> Self {
        self.input = input;
        self
    }

    /// Sets the wall-clock limit.
    #[must_use]
    pub const fn time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = limit;
        self
    }

    /// Fixed arguments placed before the test argument.
    #[must_use]
    pub fn leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Candidate executable.
    #[must_use]
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Configured input artifact.
    #[must_use]
    pub const fn candidate_input(&self) -> CandidateInput {
        self.input
    }

    /// Runs the candidate once and writes the designated stream to `ans<NN>.txt`.
    ///
    /// Timeouts, crashes and non-zero exits are recorded, not raised; the
    /// partial output captured up to that point is what gets graded. An
    /// error means no run happened and `ans<NN>.txt` does not exist.
    pub fn run(&self, layout: &ArtifactLayout, case: &TestCase) -> Result<ActualOutput> {
        let path = layout.path(ArtifactKind::ActualOutput, case.id);
        remove_stale(&path)?;

        let (stdout, stderr) = self.stream.captures();
        let invocation = Invocation::new(&self.binary)
            .args(&self.leading_args)
            .arg(self.argument(layout, case)?)
            .current_dir(layout.dir())
            .stdout(stdout)
            .stderr(stderr)
            .timeout(self.time_limit);

        let outcome = invocation.run()?;
        if outcome.timed_out {
            tracing::warn!(id = %case.id, limit_ms = duration_ms(self.time_limit), "candidate timed out");
        }
        let record = ActualOutput {
            id: case.id,
            path: path.clone(),
            stream: self.stream,
            exit_code: outcome.exit_code,
            signal: outcome.signal,
            timed_out: outcome.timed_out,
            elapsed_ms: duration_ms(outcome.elapsed),
        };
        fs::write(&path, self.stream.select(outcome)).map_err(|e| HarnessError::io(&path, e))?;
        Ok(record)
    }

    fn argument(&self, layout: &ArtifactLayout, case: &TestCase) -> Result<OsString> {
        let file = match self.input {
            CandidateInput::Source => case.source_path.clone(),
            CandidateInput::Bitcode => layout.path(ArtifactKind::Bitcode, case.id),
        };
        match self.mode {
            InvocationMode::FileArgument => Ok(file.into_os_string()),
            InvocationMode::InlineArgument => {
                let text = fs::read(&file).map_err(|e| HarnessError::io(&file, e))?;
                inline_argument(case.id, text)
            }
        }
    }
}

/// Turns the raw source bytes into one argument without altering them.
fn inline_argument(id: TestId, text: Vec<u8>) -> Result<OsString> {
    if text.contains(&0) {
        return Err(HarnessError::InlineArgument {
            id,
            reason: "contains a NUL byte",
        });
    }
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStringExt;
        Ok(OsString::from_vec(text))
    }
    #[cfg(not(unix))]
    {
        String::from_utf8(text)
            .map(OsString::from)
            .map_err(|_| HarnessError::InlineArgument {
                id,
                reason: "is not valid UTF-8",
            })
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
