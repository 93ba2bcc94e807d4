//! Judgebench: a batch judge for program-analysis assignments.
//!
//! # Overview
//!
//! A testcase directory holds numbered C programs `test00.c` .. `testNN.c`.
//! For each one the judge builds a reference binary, runs it to capture the
//! expected output, runs the candidate tool on the same input under a
//! wall-clock limit, and compares the two outputs byte for byte.
//!
//! # Module Structure
//!
//! - [`artifact`]: Test IDs and the on-disk file naming scheme
//! - [`process`]: Child processes with capture, timeout and group kill
//! - [`build`]: Reference, bitcode and candidate project builds
//! - [`oracle`]: Expected output generation
//! - [`candidate`]: Running the program under test
//! - [`compare`]: Byte-exact verdicts
//! - [`report`]: Per-case lines, run summary and report sinks
//! - [`pipeline`]: Per-case pipeline and the parallel batch runner
//! - [`config`]: Deployment presets and TOML configuration
//! - [`error`](mod@error): Error types
//!
//! # Example
//!
//! ```no_run
//! use judgebench::{Harness, HarnessConfig, Preset, TextReporter};
//!
//! let config = HarnessConfig::preset(Preset::AstInterpreter);
//! let harness = Harness::from_config(&config)?;
//! let mut out = TextReporter::new(std::io::stdout());
//! let result = harness.run(&mut out)?;
//! assert!(result.summary.passed <= result.summary.total);
//! # Ok::<(), judgebench::HarnessError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

pub mod artifact;
pub mod build;
pub mod candidate;
pub mod compare;
pub mod config;
pub mod error;
pub mod oracle;
pub mod pipeline;
pub mod process;
pub mod report;

pub use artifact::{ArtifactKind, ArtifactLayout, IdRange, TestCase, TestId};
pub use build::{BitcodeToolchain, CandidateProject, CommandLine, ReferenceToolchain};
pub use candidate::{ActualOutput, CandidateInput, CandidateRunner, InvocationMode, OutputStream};
pub use compare::{CapturedOutput, FailureReason, Stage, Verdict, compare};
pub use config::{HarnessConfig, Overrides, Preset};
pub use error::{HarnessError, Result};
pub use oracle::{OracleGenerator, OracleSource};
pub use pipeline::{BatchResult, Harness, ReferenceStage};
pub use report::{CaseReport, JsonReporter, ReportSink, RunSummary, TextReporter};
