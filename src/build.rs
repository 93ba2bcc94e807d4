//! Build orchestration: reference binaries, candidate bitcode inputs, and the
//! clean rebuild of a candidate project.
//!
//! Reference builds are never timed out. Their toolchain is trusted, so a
//! compiler that hangs is an environment problem, not a verdict.

use crate::artifact::{ArtifactKind, ArtifactLayout, TestCase, TestId};
use crate::error::{BuildStep, HarnessError, Result};
use crate::process::{Capture, Invocation, ProcessOutcome};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A program followed by its arguments, e.g. `["cmake", "--build", "."]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandLine(Vec<String>);

impl CommandLine {
    /// Creates a command line from its words.
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(words.into_iter().map(Into::into).collect())
    }

    /// Program word, if any.
    #[must_use]
    pub fn program(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// Words after the program.
    #[must_use]
    pub fn args(&self) -> &[String] {
        self.0.get(1..).unwrap_or_default()
    }

    /// True if there is no program word.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn invocation(&self, step: BuildStep) -> Result<Invocation> {
        let program = self
            .program()
            .ok_or_else(|| HarnessError::Config(format!("empty command line for {step}")))?;
        Ok(Invocation::new(program).args(self.args()))
    }
}

/// Compiled reference executable of one test case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceArtifact {
    /// Test case the binary belongs to.
    pub id: TestId,
    /// Path of `test<NN>.out`.
    pub binary: PathBuf,
}

/// Trusted C toolchain producing reference binaries.
///
/// Invoked as `<compiler> <flags...> [support library] test<NN>.c -o test<NN>.out`
/// from the testcase directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceToolchain {
    compiler: PathBuf,
    flags: Vec<String>,
}

impl ReferenceToolchain {
    /// Toolchain driven by `compiler`.
    pub fn new(compiler: impl Into<PathBuf>) -> Self {
        Self {
            compiler: compiler.into(),
            flags: Vec::new(),
        }
    }

    /// Extra words placed right after the compiler.
    #[must_use]
    pub fn with_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags = flags.into_iter().map(Into::into).collect();
        self
    }

    /// Compiles `case` into a fresh `test<NN>.out`.
    ///
    /// Any previous binary is removed first, so a failed build never leaves a
    /// stale executable behind.
    pub fn build_reference(
        &self,
        layout: &ArtifactLayout,
        case: &TestCase,
    ) -> Result<ReferenceArtifact> {
        let binary = layout.path(ArtifactKind::ReferenceBinary, case.id);
        remove_stale(&binary)?;

        let mut invocation = Invocation::new(&self.compiler)
            .args(&self.flags)
            .current_dir(layout.dir());
        if let Some(library) = &case.support_library {
            invocation = invocation.arg(library);
        }
        let invocation = invocation.arg(&case.source_path).arg("-o").arg(&binary);

        let outcome = invocation.run()?;
        check(BuildStep::Reference, &invocation, &outcome)?;
        tracing::debug!(id = %case.id, binary = %binary.display(), "reference built");
        Ok(ReferenceArtifact {
            id: case.id,
            binary,
        })
    }
}

/// Toolchain emitting LLVM bitcode for candidates that consume `.bc` files.
///
/// Invoked as `<compiler> <flags...> test<NN>.c -o test<NN>.bc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitcodeToolchain {
    compiler: PathBuf,
    flags: Vec<String>,
}

impl BitcodeToolchain {
    /// Default flags: unoptimised bitcode with full debug info.
    pub const DEFAULT_FLAGS: [&'static str; 4] = ["-emit-llvm", "-c", "-O0", "-g3"];

    /// Toolchain driven by `compiler` with [`Self::DEFAULT_FLAGS`].
    pub fn new(compiler: impl Into<PathBuf>) -> Self {
        Self {
            compiler: compiler.into(),
            flags: Self::DEFAULT_FLAGS.iter().map(ToString::to_string).collect(),
        }
    }

    /// Replaces the flags.
    #[must_use]
    pub fn with_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags = flags.into_iter().map(Into::into).collect();
        self
    }

    /// Compiles `case` into a fresh `test<NN>.bc` and returns its path.
    pub fn build_bitcode(&self, layout: &ArtifactLayout, case: &TestCase) -> Result<PathBuf> {
        let bitcode = layout.path(ArtifactKind::Bitcode, case.id);
        remove_stale(&bitcode)?;

        let invocation = Invocation::new(&self.compiler)
            .args(&self.flags)
            .arg(&case.source_path)
            .arg("-o")
            .arg(&bitcode)
            .current_dir(layout.dir());
        let outcome = invocation.run()?;
        check(BuildStep::Bitcode, &invocation, &outcome)?;
        Ok(bitcode)
    }
}

/// Candidate built from source with a configure-then-build tool.
///
/// [`rebuild`](Self::rebuild) always starts from an empty build directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateProject {
    build_dir: PathBuf,
    configure: CommandLine,
    build: CommandLine,
}

impl CandidateProject {
    /// Project whose two phases both run inside `build_dir`.
    pub fn new(build_dir: impl Into<PathBuf>, configure: CommandLine, build: CommandLine) -> Self {
        Self {
            build_dir: build_dir.into(),
            configure,
            build,
        }
    }

    /// Build directory that is wiped on every rebuild.
    #[must_use]
    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    /// Removes the build directory, recreates it, configures, and builds.
    ///
    /// A failure of either phase is batch-fatal.
    pub fn rebuild(&self) -> Result<()> {
        match fs::remove_dir_all(&self.build_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(HarnessError::io(&self.build_dir, e)),
        }
        fs::create_dir_all(&self.build_dir).map_err(|e| HarnessError::io(&self.build_dir, e))?;

        for (step, line) in [
            (BuildStep::Configure, &self.configure),
            (BuildStep::Compile, &self.build),
        ] {
            let invocation = line
                .invocation(step)?
                .current_dir(&self.build_dir)
                .stdout(Capture::Discard);
            tracing::info!(step = %step, command = %invocation.command_line(), "running");
            let outcome = invocation.run()?;
            check(step, &invocation, &outcome)?;
        }
        tracing::info!(build_dir = %self.build_dir.display(), "candidate project rebuilt");
        Ok(())
    }
}

fn check(step: BuildStep, invocation: &Invocation, outcome: &ProcessOutcome) -> Result<()> {
    if outcome.success() {
        return Ok(());
    }
    Err(HarnessError::CommandFailed {
        step,
        program: invocation.program_display(),
        status: outcome.status_label(),
        stderr: outcome.stderr_lossy(),
    })
}

/// Deletes `path` if it exists.
pub(crate) fn remove_stale(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(HarnessError::io(path, e)),
    }
}
