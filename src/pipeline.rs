//! The per-test-case pipeline and the batch runner.
//!
//! Each case runs build, oracle, candidate and compare on its own artifact
//! files, so cases are independent. The batch hands IDs to a bounded pool of
//! workers. The candidate project rebuild happens once, before any worker
//! starts.

use crate::artifact::{ArtifactKind, ArtifactLayout, IdRange, TestCase, TestId};
use crate::build::{BitcodeToolchain, CandidateProject, ReferenceToolchain, remove_stale};
use crate::candidate::CandidateRunner;
use crate::compare::{FailureReason, Stage, Verdict, compare_files};
use crate::config::{HarnessConfig, resolve_path, resolve_program};
use crate::error::{HarnessError, Result};
use crate::oracle::{OracleGenerator, OracleSource};
use crate::report::{CaseReport, OrderedEmitter, ReportSink, RunSummary};
use crossbeam_queue::SegQueue;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

/// Reference build plus oracle run.
#[derive(Debug, Clone)]
pub struct ReferenceStage {
    /// Compiler for `test<NN>.out`.
    pub toolchain: ReferenceToolchain,
    /// Runner producing `std<NN>.txt`.
    pub oracle: OracleGenerator,
}

/// Outcome of a whole batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    /// Fold of all verdicts.
    pub summary: RunSummary,
    /// One report per case, in ID order.
    pub reports: Vec<CaseReport>,
}

/// A configured judge.
#[derive(Debug, Clone)]
pub struct Harness {
    layout: ArtifactLayout,
    range: IdRange,
    jobs: usize,
    reference: Option<ReferenceStage>,
    bitcode: Option<BitcodeToolchain>,
    candidate: CandidateRunner,
    project: Option<CandidateProject>,
}

impl Harness {
    /// Judge over `range` using shipped oracles and no project rebuild.
    pub fn new(layout: ArtifactLayout, range: IdRange, candidate: CandidateRunner) -> Self {
        Self {
            layout,
            range,
            jobs: 1,
            reference: None,
            bitcode: None,
            candidate,
            project: None,
        }
    }

    /// Builds oracles with `stage` instead of using shipped ones.
    #[must_use]
    pub fn with_reference(mut self, stage: ReferenceStage) -> Self {
        self.reference = Some(stage);
        self
    }

    /// Compiles bitcode for the candidate before each run.
    #[must_use]
    pub fn with_bitcode(mut self, toolchain: BitcodeToolchain) -> Self {
        self.bitcode = Some(toolchain);
        self
    }

    /// Rebuilds the candidate from source before the batch.
    #[must_use]
    pub fn with_project(mut self, project: CandidateProject) -> Self {
        self.project = Some(project);
        self
    }

    /// Worker count; `0` uses every available core.
    #[must_use]
    pub const fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    /// Assembles a judge from configuration.
    pub fn from_config(config: &HarnessConfig) -> Result<Self> {
        config.validate()?;
        let dir = std::path::absolute(&config.testcase_dir)
            .map_err(|e| HarnessError::io(&config.testcase_dir, e))?;

        let mut layout = ArtifactLayout::new(&dir);
        let library = config.reference.support_library.as_deref();
        if let Some(library) = library.filter(|p| !p.as_os_str().is_empty()) {
            layout = layout.with_support_library(resolve_path(&dir, library));
        }

        let candidate_config = &config.candidate;
        let candidate = CandidateRunner::new(resolve_program(&dir, &candidate_config.binary))
            .leading_args(candidate_config.args.iter().cloned())
            .mode(candidate_config.mode)
            .stream(candidate_config.stream)
            .input(candidate_config.input)
            .time_limit(config.candidate_time_limit());

        let mut harness = Self::new(layout, IdRange::up_to(config.max_id), candidate)
            .jobs(config.jobs);

        if config.reference.oracle == OracleSource::Compile {
            let compiler = resolve_program(&dir, Path::new(&config.reference.compiler));
            harness = harness.with_reference(ReferenceStage {
                toolchain: ReferenceToolchain::new(compiler)
                    .with_flags(config.reference.flags.iter().cloned()),
                oracle: OracleGenerator::new(config.reference_deadline()),
            });
        }
        if let Some(bitcode) = &config.bitcode {
            let compiler = resolve_program(&dir, Path::new(&bitcode.compiler));
            harness = harness
                .with_bitcode(BitcodeToolchain::new(compiler).with_flags(bitcode.flags.iter().cloned()));
        }
        if let Some(project) = &candidate_config.project {
            harness = harness.with_project(CandidateProject::new(
                resolve_path(&dir, &project.build_dir),
                project.configure.clone(),
                project.build.clone(),
            ));
        }
        Ok(harness)
    }

    /// Artifact layout in use.
    #[must_use]
    pub const fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    /// Configured ID range.
    #[must_use]
    pub const fn range(&self) -> IdRange {
        self.range
    }

    /// One-time batch preparation: the candidate project rebuild, if any.
    pub fn prepare(&self) -> Result<()> {
        if let Some(project) = &self.project {
            project.rebuild().inspect_err(|e| {
                tracing::error!(error = %e, "candidate project build failed, aborting batch");
            })?;
        }
        Ok(())
    }

    /// Prepares, then grades every case, streaming reports into `sink`.
    pub fn run(&self, sink: &mut (dyn ReportSink + Send)) -> Result<BatchResult> {
        self.prepare()?;
        self.run_batch(sink)
    }

    /// Grades every case in the range. Expects [`prepare`](Self::prepare) to
    /// have succeeded.
    pub fn run_batch(&self, sink: &mut (dyn ReportSink + Send)) -> Result<BatchResult> {
        let ids: Vec<TestId> = self.range.iter().collect();
        let workers = self.worker_count(ids.len());
        tracing::info!(cases = ids.len(), workers, "starting batch");

        let queue = SegQueue::new();
        for id in &ids {
            queue.push(*id);
        }
        let abort = AtomicBool::new(false);
        let sink_error = Mutex::new(None);
        let emitter = Mutex::new(OrderedEmitter::new(sink, ids));

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    while !abort.load(Ordering::Acquire) {
                        let Some(id) = queue.pop() else {
                            break;
                        };
                        let report = self.run_case(id);
                        if let Err(e) = emitter.lock().push(report) {
                            abort.store(true, Ordering::Release);
                            sink_error.lock().get_or_insert(e);
                        }
                    }
                });
            }
        });

        if let Some(e) = sink_error.into_inner() {
            tracing::error!(error = %e, "report sink failed, batch aborted");
            return Err(HarnessError::Report(e));
        }
        let reports = emitter.into_inner().into_released();
        let summary = RunSummary::from_reports(self.range.total(), &reports);
        sink.finish(&summary).map_err(HarnessError::Report)?;
        tracing::info!(passed = summary.passed, total = summary.total, "batch finished");
        Ok(BatchResult { summary, reports })
    }

    /// Runs the full pipeline for one case. Never fails: errors become a
    /// failed verdict naming the stage.
    pub fn run_case(&self, id: TestId) -> CaseReport {
        let span = tracing::info_span!("testcase", id = %id);
        let _guard = span.enter();
        let case = self.layout.test_case(id);
        match self.grade(&case) {
            Ok(report) => {
                tracing::debug!(passed = report.verdict.is_passed(), "graded");
                report
            }
            Err((stage, error)) => {
                tracing::warn!(stage = %stage, error = %error, "testcase errored");
                CaseReport {
                    id,
                    verdict: Verdict::Failed(FailureReason::Error {
                        stage,
                        message: error.to_string(),
                    }),
                    candidate: None,
                }
            }
        }
    }

    fn grade(&self, case: &TestCase) -> std::result::Result<CaseReport, (Stage, HarnessError)> {
        let expected = self.layout.path(ArtifactKind::ExpectedOutput, case.id);
        self.clear_artifacts(case.id)?;

        if let Some(reference) = &self.reference {
            let artifact = reference
                .toolchain
                .build_reference(&self.layout, case)
                .map_err(at(Stage::ReferenceBuild))?;
            reference
                .oracle
                .generate(&self.layout, &artifact)
                .map_err(at(Stage::Oracle))?;
        }
        if let Some(bitcode) = &self.bitcode {
            bitcode
                .build_bitcode(&self.layout, case)
                .map_err(at(Stage::BitcodeBuild))?;
        }

        let actual = self
            .candidate
            .run(&self.layout, case)
            .map_err(at(Stage::Candidate))?;
        let verdict = compare_files(&expected, &actual.path)
            .map_err(|e| (Stage::Compare, HarnessError::io(&actual.path, e)))?;
        Ok(CaseReport {
            id: case.id,
            verdict,
            candidate: Some(actual),
        })
    }

    /// Removes artifacts this run is about to regenerate. A failure is
    /// charged to the stage that owns the artifact.
    fn clear_artifacts(&self, id: TestId) -> std::result::Result<(), (Stage, HarnessError)> {
        if self.reference.is_some() {
            remove_stale(&self.layout.path(ArtifactKind::ExpectedOutput, id))
                .map_err(at(Stage::Oracle))?;
        }
        if self.bitcode.is_some() {
            remove_stale(&self.layout.path(ArtifactKind::Bitcode, id))
                .map_err(at(Stage::BitcodeBuild))?;
        }
        remove_stale(&self.layout.path(ArtifactKind::ActualOutput, id))
            .map_err(at(Stage::Candidate))?;
        Ok(())
    }

    fn worker_count(&self, cases: usize) -> usize {
        let wanted = if self.jobs == 0 {
            thread::available_parallelism().map_or(1, NonZeroUsize::get)
        } else {
            self.jobs
        };
        wanted.clamp(1, cases.max(1))
    }
}

fn at(stage: Stage) -> impl Fn(HarnessError) -> (Stage, HarnessError) {
    move |error| (stage, error)
}
