//! Worker counters, per-file results and run totals
//!
//! Workers own their [`Counters`] and hand them over exactly once, by value,
//! when they exit. Merging is plain addition, so the order in which workers
//! finish does not change the totals.

use serde::Serialize;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::path::PathBuf;

/// Acceptable share of errors in a file
pub const DEFAULT_ERROR_THRESHOLD: f64 = 0.01;

/// Per-worker outcome tally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    /// Records written to the store
    pub processed: u64,
    /// Lines or writes that failed
    pub errors: u64,
}

impl Counters {
    pub fn new(processed: u64, errors: u64) -> Self {
        Self { processed, errors }
    }
}

impl Add for Counters {
    type Output = Counters;

    fn add(self, rhs: Counters) -> Counters {
        Counters {
            processed: self.processed + rhs.processed,
            errors: self.errors + rhs.errors,
        }
    }
}

impl AddAssign for Counters {
    fn add_assign(&mut self, rhs: Counters) {
        *self = *self + rhs;
    }
}

impl Sum for Counters {
    fn sum<I: Iterator<Item = Counters>>(iter: I) -> Counters {
        iter.fold(Counters::default(), Add::add)
    }
}

/// Which pool a report came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerKind {
    Parse,
    Write,
}

/// Final counters a worker hands back when its queue closes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerReport {
    pub kind: WorkerKind,
    pub counters: Counters,
}

/// Collects worker reports for one file
#[derive(Debug, Default)]
pub struct Aggregator {
    totals: Counters,
    parse_reports: usize,
    write_reports: usize,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, report: WorkerReport) {
        match report.kind {
            WorkerKind::Parse => self.parse_reports += 1,
            WorkerKind::Write => self.write_reports += 1,
        }
        self.totals += report.counters;
    }

    /// Count lines rejected before they reached a parse worker
    pub fn reject_lines(&mut self, count: u64) {
        self.totals.errors += count;
    }

    /// Number of (parse, write) reports received so far
    pub fn reports(&self) -> (usize, usize) {
        (self.parse_reports, self.write_reports)
    }

    pub fn totals(&self) -> Counters {
        self.totals
    }

    /// Freeze the merged counters into the file's result
    pub fn finish(self, path: PathBuf, lines_read: u64) -> FileResult {
        FileResult {
            path,
            lines_read,
            processed: self.totals.processed,
            errors: self.totals.errors,
        }
    }
}

/// Outcome of loading one file, derived after all its work drained
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileResult {
    pub path: PathBuf,
    pub lines_read: u64,
    pub processed: u64,
    pub errors: u64,
}

impl FileResult {
    /// `errors / max(processed, 1)`
    pub fn error_rate(&self) -> f64 {
        self.errors as f64 / self.processed.max(1) as f64
    }
}

/// Advisory accept/reject decision for a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Accept,
    Reject,
}

/// Accept a file when its error rate is strictly below the threshold
pub fn evaluate(result: &FileResult, threshold: f64) -> Verdict {
    if result.error_rate() < threshold {
        Verdict::Accept
    } else {
        Verdict::Reject
    }
}

/// Totals over every file of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunTotals {
    pub files: u64,
    pub lines_read: u64,
    pub processed: u64,
    pub errors: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub failed: u64,
}

impl RunTotals {
    pub fn record(&mut self, result: &FileResult, verdict: Verdict) {
        self.files += 1;
        self.lines_read += result.lines_read;
        self.processed += result.processed;
        self.errors += result.errors;
        match verdict {
            Verdict::Accept => self.accepted += 1,
            Verdict::Reject => self.rejected += 1,
        }
    }

    /// Count a file whose pipeline could not complete
    ///
    /// Work done before the failure still happened and is added in.
    pub fn record_failure(&mut self, partial: Option<&FileResult>) {
        self.files += 1;
        self.failed += 1;
        if let Some(partial) = partial {
            self.lines_read += partial.lines_read;
            self.processed += partial.processed;
            self.errors += partial.errors;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn result(processed: u64, errors: u64) -> FileResult {
        FileResult {
            path: PathBuf::from("logs/a.tsv.gz"),
            lines_read: processed + errors,
            processed,
            errors,
        }
    }

    #[test]
    fn test_two_percent_errors_rejected() {
        let r = result(100, 2);
        assert_eq!(r.error_rate(), 0.02);
        assert_eq!(evaluate(&r, DEFAULT_ERROR_THRESHOLD), Verdict::Reject);
    }

    #[test]
    fn test_clean_file_accepted() {
        assert_eq!(evaluate(&result(100, 0), DEFAULT_ERROR_THRESHOLD), Verdict::Accept);
    }

    #[test]
    fn test_rate_at_threshold_rejected() {
        assert_eq!(evaluate(&result(100, 1), DEFAULT_ERROR_THRESHOLD), Verdict::Reject);
    }

    #[test]
    fn test_nothing_processed_uses_one_as_denominator() {
        assert_eq!(result(0, 3).error_rate(), 3.0);
        assert_eq!(result(0, 0).error_rate(), 0.0);
        assert_eq!(evaluate(&result(0, 0), DEFAULT_ERROR_THRESHOLD), Verdict::Accept);
    }

    #[test]
    fn test_aggregator_counts_reports() {
        let mut agg = Aggregator::new();
        agg.merge(WorkerReport {
            kind: WorkerKind::Parse,
            counters: Counters::new(0, 2),
        });
        agg.merge(WorkerReport {
            kind: WorkerKind::Write,
            counters: Counters::new(98, 1),
        });

        assert_eq!(agg.reports(), (1, 1));
        let file = agg.finish(PathBuf::from("x"), 101);
        assert_eq!((file.lines_read, file.processed, file.errors), (101, 98, 3));
    }

    #[test]
    fn test_run_totals() {
        let mut totals = RunTotals::default();
        totals.record(&result(100, 0), Verdict::Accept);
        totals.record(&result(100, 2), Verdict::Reject);
        totals.record_failure(None);

        assert_eq!(totals.files, 3);
        assert_eq!(totals.processed, 200);
        assert_eq!(totals.errors, 2);
        assert_eq!((totals.accepted, totals.rejected, totals.failed), (1, 1, 1));
    }

    #[test]
    fn test_failed_file_keeps_partial_counts() {
        let mut totals = RunTotals::default();
        totals.record(&result(10, 0), Verdict::Accept);
        totals.record_failure(Some(&result(40, 3)));

        assert_eq!((totals.files, totals.failed), (2, 1));
        assert_eq!(totals.lines_read, 53);
        assert_eq!(totals.processed, 50);
        assert_eq!(totals.errors, 3);
        assert_eq!((totals.accepted, totals.rejected), (1, 0));
    }

    fn counters() -> impl Strategy<Value = Vec<Counters>> {
        proptest::collection::vec(
            (0u64..1_000_000, 0u64..1_000_000).prop_map(|(p, e)| Counters::new(p, e)),
            0..50,
        )
    }

    proptest! {
        #[test]
        fn prop_merge_order_does_not_matter(
            (reports, shuffled) in counters()
                .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle()))
        ) {
            let sequential: Counters = reports.iter().copied().sum();

            let mut agg = Aggregator::new();
            for counters in shuffled {
                agg.merge(WorkerReport { kind: WorkerKind::Write, counters });
            }

            prop_assert_eq!(sequential, agg.totals());
        }

        #[test]
        fn prop_merge_is_associative(a in counters(), b in counters()) {
            let left: Counters = a.iter().copied().sum::<Counters>() + b.iter().copied().sum();
            let all: Counters = a.iter().chain(b.iter()).copied().sum();
            prop_assert_eq!(left, all);
        }
    }
}
