//! Verdict reporting and the run summary.
//!
//! Per-case lines stream as soon as a case (and every case before it) is
//! graded. The summary is a fold over the verdicts, with the denominator
//! fixed by the configured range rather than by how many cases ran.

use crate::artifact::TestId;
use crate::candidate::ActualOutput;
use crate::compare::Verdict;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Write};

/// Everything known about one graded test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseReport {
    /// Test case.
    pub id: TestId,
    /// Grading decision.
    #[serde(flatten)]
    pub verdict: Verdict,
    /// Candidate run metadata, when the candidate ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate: Option<ActualOutput>,
}

impl CaseReport {
    /// Text line in the corpus' traditional format.
    #[must_use]
    pub fn line(&self) -> String {
        if self.verdict.is_passed() {
            format!("Testcase {} Passed!", self.id)
        } else {
            format!("Testcase {} failed!", self.id)
        }
    }

    /// Detail lines explaining a failure; empty for passes.
    #[must_use]
    pub fn details(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(reason) = self.verdict.reason() {
            lines.push(format!("  {reason}"));
            if let Some(candidate) = &self.candidate {
                if candidate.timed_out || candidate.exit_code != Some(0) {
                    lines.push(format!("  candidate: {}", candidate.status_label()));
                }
            }
        }
        lines
    }
}

/// Aggregate over all verdicts of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Cases graded as passed.
    pub passed: u64,
    /// Cases that produced a verdict.
    pub attempted: u64,
    /// Cases in the configured range.
    pub total: u64,
}

impl RunSummary {
    /// Empty summary for a range of `total` cases.
    #[must_use]
    pub const fn new(total: u64) -> Self {
        Self {
            passed: 0,
            attempted: 0,
            total,
        }
    }

    /// Folds one verdict in.
    #[must_use]
    pub fn record(self, verdict: &Verdict) -> Self {
        Self {
            passed: self.passed + u64::from(verdict.is_passed()),
            attempted: self.attempted + 1,
            total: self.total,
        }
    }

    /// Combines partial summaries over disjoint case sets of the same range.
    #[must_use]
    pub const fn merge(self, other: Self) -> Self {
        Self {
            passed: self.passed + other.passed,
            attempted: self.attempted + other.attempted,
            total: self.total,
        }
    }

    /// Folds a whole sequence of reports.
    pub fn from_reports<'a>(total: u64, reports: impl IntoIterator<Item = &'a CaseReport>) -> Self {
        reports
            .into_iter()
            .fold(Self::new(total), |summary, report| summary.record(&report.verdict))
    }

    /// True when every case in the range passed.
    #[must_use]
    pub const fn all_passed(&self) -> bool {
        self.passed == self.total
    }

    /// `"<passed> / <total> testcase passed."`
    #[must_use]
    pub fn line(&self) -> String {
        format!("{} / {} testcase passed.", self.passed, self.total)
    }
}

/// Destination of per-case reports and the final summary.
pub trait ReportSink {
    /// Called once per case, in ascending ID order.
    fn case(&mut self, report: &CaseReport) -> io::Result<()>;

    /// Called exactly once after the last case.
    fn finish(&mut self, summary: &RunSummary) -> io::Result<()>;
}

/// Human-readable report in the corpus' traditional format.
#[derive(Debug)]
pub struct TextReporter<W> {
    out: W,
    verbose: bool,
}

impl<W: Write> TextReporter<W> {
    /// Reporter writing to `out`.
    pub const fn new(out: W) -> Self {
        Self {
            out,
            verbose: false,
        }
    }

    /// Also print mismatch details (stage errors are always printed).
    #[must_use]
    pub const fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Returns the writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ReportSink for TextReporter<W> {
    fn case(&mut self, report: &CaseReport) -> io::Result<()> {
        writeln!(self.out, "{}", report.line())?;
        let is_error = report.verdict.reason().is_some_and(|r| r.is_error());
        if self.verbose || is_error {
            for detail in report.details() {
                writeln!(self.out, "{detail}")?;
            }
        }
        self.out.flush()
    }

    fn finish(&mut self, summary: &RunSummary) -> io::Result<()> {
        writeln!(self.out, "{}", summary.line())?;
        self.out.flush()
    }
}

#[derive(Serialize)]
struct JsonDocument<'a> {
    generated_at: DateTime<Utc>,
    summary: &'a RunSummary,
    cases: &'a [CaseReport],
}

/// Collects reports and writes a single JSON document on finish.
#[derive(Debug)]
pub struct JsonReporter<W> {
    out: W,
    cases: Vec<CaseReport>,
}

impl<W: Write> JsonReporter<W> {
    /// Reporter writing to `out`.
    pub const fn new(out: W) -> Self {
        Self {
            out,
            cases: Vec::new(),
        }
    }

    /// Returns the writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ReportSink for JsonReporter<W> {
    fn case(&mut self, report: &CaseReport) -> io::Result<()> {
        self.cases.push(report.clone());
        Ok(())
    }

    fn finish(&mut self, summary: &RunSummary) -> io::Result<()> {
        let doc = JsonDocument {
            generated_at: Utc::now(),
            summary,
            cases: &self.cases,
        };
        serde_json::to_writer_pretty(&mut self.out, &doc)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writeln!(self.out)?;
        self.out.flush()
    }
}

/// Releases reports to a sink in ascending ID order as they complete out of
/// order.
pub(crate) struct OrderedEmitter<'s> {
    sink: &'s mut (dyn ReportSink + Send),
    order: Vec<TestId>,
    next: usize,
    pending: BTreeMap<TestId, CaseReport>,
    released: Vec<CaseReport>,
}

impl<'s> OrderedEmitter<'s> {
    pub(crate) fn new(sink: &'s mut (dyn ReportSink + Send), order: Vec<TestId>) -> Self {
        Self {
            sink,
            order,
            next: 0,
            pending: BTreeMap::new(),
            released: Vec::new(),
        }
    }

    /// Accepts one report and flushes every report that is now in order.
    pub(crate) fn push(&mut self, report: CaseReport) -> io::Result<()> {
        self.pending.insert(report.id, report);
        while let Some(id) = self.order.get(self.next).copied() {
            let Some(report) = self.pending.remove(&id) else {
                break;
            };
            self.sink.case(&report)?;
            self.released.push(report);
            self.next += 1;
        }
        Ok(())
    }

    /// Reports released so far, in order.
    pub(crate) fn into_released(self) -> Vec<CaseReport> {
        self.released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::{FailureReason, Stage};

    fn report(id: u32, verdict: Verdict) -> CaseReport {
        CaseReport {
            id: TestId::new(id),
            verdict,
            candidate: None,
        }
    }

    fn mismatch() -> Verdict {
        Verdict::Failed(FailureReason::Mismatch {
            expected_len: 2,
            actual_len: 0,
            first_difference: 0,
        })
    }

    #[test]
    fn lines_match_corpus_format() {
        assert_eq!(report(0, Verdict::Passed).line(), "Testcase 00 Passed!");
        assert_eq!(report(13, mismatch()).line(), "Testcase 13 failed!");
        let summary = RunSummary::new(1).record(&Verdict::Passed);
        assert_eq!(summary.line(), "1 / 1 testcase passed.");
    }

    #[test]
    fn summary_is_a_fold_with_fixed_denominator() {
        let reports = [report(0, Verdict::Passed), report(1, mismatch())];
        let summary = RunSummary::from_reports(30, &reports);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.total, 30);
        assert!(!summary.all_passed());
        assert_eq!(summary.line(), "1 / 30 testcase passed.");
    }

    #[test]
    fn merge_adds_partial_summaries() {
        let left = RunSummary::new(4).record(&Verdict::Passed).record(&mismatch());
        let right = RunSummary::new(4).record(&Verdict::Passed).record(&Verdict::Passed);
        let merged = left.merge(right);
        assert_eq!(merged.passed, 3);
        assert_eq!(merged.attempted, 4);
        assert!(!merged.all_passed());
    }

    #[test]
    fn text_reporter_prints_stage_errors_even_when_quiet() {
        let mut sink = TextReporter::new(Vec::new());
        sink.case(&report(0, Verdict::Passed)).unwrap();
        sink.case(&report(1, mismatch())).unwrap();
        sink.case(&report(
            2,
            Verdict::Failed(FailureReason::Error {
                stage: Stage::ReferenceBuild,
                message: "gcc exited with status 1".into(),
            }),
        ))
        .unwrap();
        sink.finish(&RunSummary {
            passed: 1,
            attempted: 3,
            total: 3,
        })
        .unwrap();

        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(
            text,
            "Testcase 00 Passed!\n\
             Testcase 01 failed!\n\
             Testcase 02 failed!\n  \
             reference build failed: gcc exited with status 1\n\
             1 / 3 testcase passed.\n"
        );
    }

    #[test]
    fn verbose_text_reporter_explains_mismatches() {
        let mut sink = TextReporter::new(Vec::new()).verbose(true);
        let mut failed = report(1, mismatch());
        failed.candidate = Some(ActualOutput {
            id: TestId::new(1),
            path: "ans01.txt".into(),
            stream: crate::candidate::OutputStream::Stdout,
            exit_code: None,
            signal: Some(11),
            timed_out: false,
            elapsed_ms: 3,
        });
        sink.case(&failed).unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert!(text.contains("output differs at byte 0"));
        assert!(text.contains("candidate: signal 11"));
    }

    #[test]
    fn json_reporter_emits_one_document() {
        let mut sink = JsonReporter::new(Vec::new());
        sink.case(&report(0, Verdict::Passed)).unwrap();
        sink.case(&report(1, mismatch())).unwrap();
        sink.finish(&RunSummary::new(2).record(&Verdict::Passed).record(&mismatch()))
            .unwrap();

        let doc: serde_json::Value = serde_json::from_slice(&sink.into_inner()).unwrap();
        assert_eq!(doc["summary"]["passed"], 1);
        assert_eq!(doc["summary"]["total"], 2);
        assert_eq!(doc["cases"][0]["id"], 0);
        assert_eq!(doc["cases"][0]["verdict"], "passed");
        assert_eq!(doc["cases"][1]["reason"]["kind"], "mismatch");
        assert!(doc["generated_at"].is_string());
    }

    #[test]
    fn ordered_emitter_releases_in_id_order() {
        let mut sink = TextReporter::new(Vec::new());
        let order: Vec<TestId> = (0..4).map(TestId::new).collect();
        let mut emitter = OrderedEmitter::new(&mut sink, order);

        emitter.push(report(2, Verdict::Passed)).unwrap();
        emitter.push(report(1, mismatch())).unwrap();
        assert!(emitter.released.is_empty());
        emitter.push(report(0, Verdict::Passed)).unwrap();
        assert_eq!(emitter.released.len(), 3);
        emitter.push(report(3, Verdict::Passed)).unwrap();

        let ids: Vec<u32> = emitter.into_released().iter().map(|r| r.id.get()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert!(text.starts_with("Testcase 00 Passed!\nTestcase 01 failed!\nTestcase 02"));
    }
}
