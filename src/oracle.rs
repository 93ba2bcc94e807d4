//! Oracle generation: run the reference binary and record its stdout as the
//! expected output of the test case.

use crate::artifact::{ArtifactKind, ArtifactLayout, TestId};
use crate::build::ReferenceArtifact;
use crate::error::{HarnessError, Result};
use crate::process::{Capture, Invocation};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Where expected outputs come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OracleSource {
    /// Build and run the reference program for every case.
    #[default]
    Compile,
    /// `std<NN>.txt` ships with the corpus and is used as-is.
    Prebuilt,
}

/// Expected output written for one test case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedOutput {
    /// Test case.
    pub id: TestId,
    /// Path of `std<NN>.txt`.
    pub path: PathBuf,
    /// Exit code of the reference run. Informational only.
    pub exit_code: Option<i32>,
    /// True if the safety deadline cut the reference short.
    pub timed_out: bool,
}

/// Runs reference binaries.
///
/// The reference is trusted to terminate, but a pathological case must not
/// stall a whole batch, so a generous deadline still applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleGenerator {
    deadline: Option<Duration>,
}

impl Default for OracleGenerator {
    fn default() -> Self {
        Self::new(Some(Self::DEFAULT_DEADLINE))
    }
}

impl OracleGenerator {
    /// Default safety deadline for a reference run.
    pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

    /// Generator with the given safety deadline (`None` waits forever).
    #[must_use]
    pub const fn new(deadline: Option<Duration>) -> Self {
        Self { deadline }
    }

    /// Runs `artifact` with no arguments and writes its stdout to `std<NN>.txt`.
    ///
    /// A non-zero exit or a crash is not an error: whatever the reference
    /// printed is the behaviour the candidate has to reproduce.
    pub fn generate(
        &self,
        layout: &ArtifactLayout,
        artifact: &ReferenceArtifact,
    ) -> Result<ExpectedOutput> {
        let path = layout.path(ArtifactKind::ExpectedOutput, artifact.id);
        let mut invocation = Invocation::new(&artifact.binary)
            .current_dir(layout.dir())
            .stdout(Capture::Piped)
            .stderr(Capture::Discard);
        if let Some(deadline) = self.deadline {
            invocation = invocation.timeout(deadline);
        }

        let outcome = invocation.run()?;
        if outcome.timed_out {
            tracing::warn!(id = %artifact.id, "reference run hit the safety deadline");
        } else if !outcome.success() {
            tracing::info!(
                id = %artifact.id,
                status = %outcome.status_label(),
                "reference exited unsuccessfully; output kept as oracle"
            );
        }

        fs::write(&path, &outcome.stdout).map_err(|e| HarnessError::io(&path, e))?;
        Ok(ExpectedOutput {
            id: artifact.id,
            path,
            exit_code: outcome.exit_code,
            timed_out: outcome.timed_out,
        })
    }
}
