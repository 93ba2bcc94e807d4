//! Harness configuration.
//!
//! A deployment fixes the ID range, the reference toolchain, how the
//! candidate is invoked and which stream it answers on. Three presets
//! reproduce the known corpus layouts; anything else comes from a TOML file
//! (feature `config-file`).
//!
//! Relative paths resolve against the testcase directory, which is also the
//! working directory of every process the harness spawns. Program names
//! without a path separator (`gcc`, `sh`) are left for `PATH` lookup.

use crate::build::CommandLine;
use crate::candidate::{CandidateInput, InvocationMode, OutputStream};
use crate::error::{HarnessError, Result};
use crate::oracle::OracleSource;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default highest test ID of every known corpus.
pub const DEFAULT_MAX_ID: u32 = 29;

/// Named deployments matching the known corpora.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum Preset {
    /// Prebuilt interpreter given the source path, answering on stdout.
    #[default]
    AstInterpreter,
    /// Interpreter rebuilt with CMake, given the source text, answering on stderr.
    AstInterpreterProject,
    /// LLVM pass given a bitcode file, checked against shipped oracles.
    LlvmPass,
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Directory holding `test<NN>.c` and receiving all artifacts.
    pub testcase_dir: PathBuf,
    /// Highest test ID; the batch covers `0..=max_id`.
    pub max_id: u32,
    /// Worker threads; `0` uses every available core.
    pub jobs: usize,
    /// Exit non-zero when fewer than all cases pass.
    pub strict_exit: bool,
    /// Oracle side.
    pub reference: ReferenceConfig,
    /// Program under test.
    pub candidate: CandidateConfig,
    /// Bitcode toolchain, required when the candidate consumes bitcode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitcode: Option<BitcodeConfig>,
}

/// Reference toolchain and oracle settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReferenceConfig {
    /// Build oracles or use shipped ones.
    pub oracle: OracleSource,
    /// C compiler.
    pub compiler: String,
    /// Words placed right after the compiler.
    pub flags: Vec<String>,
    /// Support library compiled together with every test source. An empty
    /// path disables it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub support_library: Option<PathBuf>,
    /// Safety deadline for a reference run in milliseconds; `0` disables it.
    pub run_timeout_ms: u64,
}

/// Candidate settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CandidateConfig {
    /// Executable under test.
    pub binary: PathBuf,
    /// Fixed arguments before the test argument.
    pub args: Vec<String>,
    /// Path or inline text.
    pub mode: InvocationMode,
    /// Stream holding the answer.
    pub stream: OutputStream,
    /// Source or bitcode.
    pub input: CandidateInput,
    /// Wall-clock limit per run in milliseconds.
    pub timeout_ms: u64,
    /// Rebuild the candidate from source before the batch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectConfig>,
}

/// Clean-rebuild recipe for a candidate built from source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Build directory, wiped on every run. Both phases run inside it.
    pub build_dir: PathBuf,
    /// Configure phase.
    pub configure: CommandLine,
    /// Build phase.
    pub build: CommandLine,
}

/// Bitcode toolchain settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BitcodeConfig {
    /// Clang driver.
    pub compiler: String,
    /// Flags; defaults to `-emit-llvm -c -O0 -g3`.
    #[serde(default = "default_bitcode_flags")]
    pub flags: Vec<String>,
}

fn default_bitcode_flags() -> Vec<String> {
    crate::build::BitcodeToolchain::DEFAULT_FLAGS
        .iter()
        .map(ToString::to_string)
        .collect()
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            testcase_dir: PathBuf::from("."),
            max_id: DEFAULT_MAX_ID,
            jobs: 0,
            strict_exit: true,
            reference: ReferenceConfig::default(),
            candidate: CandidateConfig::default(),
            bitcode: None,
        }
    }
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            oracle: OracleSource::Compile,
            compiler: "gcc".to_string(),
            flags: Vec::new(),
            support_library: Some(PathBuf::from("lib.c")),
            run_timeout_ms: 30_000,
        }
    }
}

impl Default for CandidateConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("./ast-interpreter"),
            args: Vec::new(),
            mode: InvocationMode::FileArgument,
            stream: OutputStream::Stdout,
            input: CandidateInput::Source,
            timeout_ms: 1_000,
            project: None,
        }
    }
}

impl HarnessConfig {
    /// Configuration of a named deployment.
    #[must_use]
    pub fn preset(preset: Preset) -> Self {
        let mut config = Self::default();
        match preset {
            Preset::AstInterpreter => {}
            Preset::AstInterpreterProject => {
                config.reference.support_library = Some(PathBuf::from("lib_std.c"));
                config.candidate.binary = PathBuf::from("build/ast-interpreter");
                config.candidate.mode = InvocationMode::InlineArgument;
                config.candidate.stream = OutputStream::Stderr;
                config.candidate.project = Some(ProjectConfig {
                    build_dir: PathBuf::from("build"),
                    configure: CommandLine::new([
                        "cmake",
                        "-DCMAKE_BUILD_TYPE=Debug",
                        "-DLLVM_DIR=/usr/local/llvm10ra",
                        "../..",
                    ]),
                    build: CommandLine::new(["cmake", "--build", "."]),
                });
            }
            Preset::LlvmPass => {
                config.reference.oracle = OracleSource::Prebuilt;
                config.reference.support_library = None;
                config.candidate.binary = PathBuf::from("./llvmassignment");
                config.candidate.input = CandidateInput::Bitcode;
                config.bitcode = Some(BitcodeConfig {
                    compiler: "/usr/local/llvm10ra/bin/clang".to_string(),
                    flags: default_bitcode_flags(),
                });
            }
        }
        config
    }

    /// Parses a TOML document; missing keys take their defaults.
    #[cfg(feature = "config-file")]
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| HarnessError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a TOML file. A relative `testcase_dir` is taken relative to the
    /// file's own directory.
    #[cfg(feature = "config-file")]
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| HarnessError::io(path, e))?;
        let mut config = Self::from_toml_str(&text)
            .map_err(|e| HarnessError::Config(format!("{}: {e}", path.display())))?;
        if config.testcase_dir.is_relative() {
            if let Some(parent) = path.parent() {
                config.testcase_dir = parent.join(&config.testcase_dir);
            }
        }
        Ok(config)
    }

    /// Applies command line overrides.
    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(dir) = &overrides.testcase_dir {
            self.testcase_dir.clone_from(dir);
        }
        if let Some(max_id) = overrides.max_id {
            self.max_id = max_id;
        }
        if let Some(jobs) = overrides.jobs {
            self.jobs = jobs;
        }
        if let Some(timeout_ms) = overrides.timeout_ms {
            self.candidate.timeout_ms = timeout_ms;
        }
        if overrides.lenient {
            self.strict_exit = false;
        }
    }

    /// Rejects combinations the pipeline cannot run.
    pub fn validate(&self) -> Result<()> {
        if self.candidate.timeout_ms == 0 {
            return Err(HarnessError::Config(
                "candidate.timeout_ms must be positive".into(),
            ));
        }
        if self.candidate.binary.as_os_str().is_empty() {
            return Err(HarnessError::Config("candidate.binary is empty".into()));
        }
        if self.reference.oracle == OracleSource::Compile && self.reference.compiler.is_empty() {
            return Err(HarnessError::Config("reference.compiler is empty".into()));
        }
        if self.candidate.input == CandidateInput::Bitcode {
            if self.candidate.mode == InvocationMode::InlineArgument {
                return Err(HarnessError::Config(
                    "bitcode input cannot be passed inline".into(),
                ));
            }
            if self.bitcode.is_none() {
                return Err(HarnessError::Config(
                    "bitcode input requires a [bitcode] section".into(),
                ));
            }
        }
        if let Some(project) = &self.candidate.project {
            if project.configure.is_empty() || project.build.is_empty() {
                return Err(HarnessError::Config(
                    "candidate.project commands must not be empty".into(),
                ));
            }
        }
        Ok(())
    }

    /// Candidate time limit.
    #[must_use]
    pub const fn candidate_time_limit(&self) -> Duration {
        Duration::from_millis(self.candidate.timeout_ms)
    }

    /// Reference safety deadline, if enabled.
    #[must_use]
    pub const fn reference_deadline(&self) -> Option<Duration> {
        match self.reference.run_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

/// Values given on the command line that take precedence over the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    /// Replacement testcase directory.
    pub testcase_dir: Option<PathBuf>,
    /// Replacement highest ID.
    pub max_id: Option<u32>,
    /// Replacement worker count.
    pub jobs: Option<usize>,
    /// Replacement candidate time limit.
    pub timeout_ms: Option<u64>,
    /// Exit zero even when cases fail.
    pub lenient: bool,
}

/// Resolves a program: absolute and separator-free names are kept, other
/// relative paths are joined onto `base`.
#[must_use]
pub fn resolve_program(base: &Path, program: &Path) -> PathBuf {
    if program.is_absolute() || program.components().count() <= 1 {
        program.to_path_buf()
    } else {
        base.join(program)
    }
}

/// Resolves a data path against `base`.
#[must_use]
pub fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_the_file_argument_deployment() {
        let config = HarnessConfig::default();
        assert_eq!(config, HarnessConfig::preset(Preset::AstInterpreter));
        assert_eq!(config.max_id, 29);
        assert_eq!(config.candidate.mode, InvocationMode::FileArgument);
        assert_eq!(config.candidate.stream, OutputStream::Stdout);
        assert_eq!(config.candidate_time_limit(), Duration::from_secs(1));
        assert_eq!(config.reference.support_library, Some(PathBuf::from("lib.c")));
        config.validate().unwrap();
    }

    #[test]
    fn project_preset_rebuilds_and_reads_stderr() {
        let config = HarnessConfig::preset(Preset::AstInterpreterProject);
        assert_eq!(config.candidate.mode, InvocationMode::InlineArgument);
        assert_eq!(config.candidate.stream, OutputStream::Stderr);
        let project = config.candidate.project.as_ref().unwrap();
        assert_eq!(project.configure.program(), Some("cmake"));
        assert_eq!(project.build.args(), ["--build", "."]);
        config.validate().unwrap();
    }

    #[test]
    fn llvm_pass_preset_uses_prebuilt_oracles() {
        let config = HarnessConfig::preset(Preset::LlvmPass);
        assert_eq!(config.reference.oracle, OracleSource::Prebuilt);
        assert_eq!(config.candidate.input, CandidateInput::Bitcode);
        assert_eq!(
            config.bitcode.as_ref().unwrap().flags,
            ["-emit-llvm", "-c", "-O0", "-g3"]
        );
        config.validate().unwrap();
    }

    #[test]
    fn inline_bitcode_is_rejected() {
        let mut config = HarnessConfig::preset(Preset::LlvmPass);
        config.candidate.mode = InvocationMode::InlineArgument;
        assert!(matches!(config.validate(), Err(HarnessError::Config(_))));

        let mut config = HarnessConfig::default();
        config.candidate.input = CandidateInput::Bitcode;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut config = HarnessConfig::default();
        config.candidate.timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn overrides_take_precedence() {
        let mut config = HarnessConfig::default();
        config.apply(&Overrides {
            testcase_dir: Some(PathBuf::from("corpus")),
            max_id: Some(0),
            jobs: Some(1),
            timeout_ms: Some(250),
            lenient: true,
        });
        assert_eq!(config.testcase_dir, PathBuf::from("corpus"));
        assert_eq!(config.max_id, 0);
        assert_eq!(config.jobs, 1);
        assert_eq!(config.candidate.timeout_ms, 250);
        assert!(!config.strict_exit);
    }

    #[test]
    fn program_resolution() {
        let base = Path::new("/corpus");
        assert_eq!(resolve_program(base, Path::new("gcc")), PathBuf::from("gcc"));
        assert_eq!(
            resolve_program(base, Path::new("./ast-interpreter")),
            PathBuf::from("/corpus/./ast-interpreter")
        );
        assert_eq!(
            resolve_program(base, Path::new("build/ast-interpreter")),
            PathBuf::from("/corpus/build/ast-interpreter")
        );
        assert_eq!(
            resolve_program(base, Path::new("/usr/bin/clang")),
            PathBuf::from("/usr/bin/clang")
        );
        assert_eq!(resolve_path(base, Path::new("lib.c")), PathBuf::from("/corpus/lib.c"));
    }

    #[test]
    fn reference_deadline_zero_disables() {
        let mut config = HarnessConfig::default();
        assert_eq!(config.reference_deadline(), Some(Duration::from_secs(30)));
        config.reference.run_timeout_ms = 0;
        assert_eq!(config.reference_deadline(), None);
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_fills_missing_keys_with_defaults() {
        let config = HarnessConfig::from_toml_str(
            r#"
            max_id = 3

            [candidate]
            binary = "build/ast-interpreter"
            mode = "inline-argument"
            stream = "stderr"

            [candidate.project]
            build_dir = "build"
            configure = ["cmake", ".."]
            build = ["cmake", "--build", "."]
            "#,
        )
        .unwrap();
        assert_eq!(config.max_id, 3);
        assert_eq!(config.candidate.timeout_ms, 1_000);
        assert_eq!(config.candidate.stream, OutputStream::Stderr);
        assert_eq!(config.reference.compiler, "gcc");
        assert!(config.candidate.project.is_some());
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_rejects_unknown_keys() {
        let err = HarnessConfig::from_toml_str("max_idd = 3\n").unwrap_err();
        assert!(matches!(err, HarnessError::Config(_)));
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn load_resolves_testcase_dir_next_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("judge.toml");
        std::fs::write(&path, "testcase_dir = \"cases\"\n").unwrap();
        let config = HarnessConfig::load(&path).unwrap();
        assert_eq!(config.testcase_dir, dir.path().join("cases"));
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn preset_survives_a_toml_round_trip() {
        let config = HarnessConfig::preset(Preset::AstInterpreterProject);
        let text = toml::to_string(&config).unwrap();
        assert_eq!(HarnessConfig::from_toml_str(&text).unwrap(), config);
    }
}
