//! Run reporting: aggregate counts, console summary, JSON report file.

pub mod json;

use serde::{Deserialize, Serialize};

use crate::model::{CaseResult, CaseStatus};

/// Aggregate counts over one run's results.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunSummary {
    pub fn from_results(results: &[CaseResult]) -> Self {
        let mut summary = Self {
            total: results.len(),
            ..Self::default()
        };
        for result in results {
            match result.status {
                CaseStatus::Passed => summary.passed += 1,
                CaseStatus::Failed => summary.failed += 1,
                CaseStatus::Skipped => summary.skipped += 1,
            }
        }
        summary
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.passed as f64 / self.total as f64
    }
}

/// Print the end-of-run summary to stderr, then one line per failed case.
pub fn print_summary(results: &[CaseResult]) {
    let summary = RunSummary::from_results(results);
    eprintln!(
        "total: {}  passed: {}  failed: {}  skipped: {}  pass rate: {:.1}%",
        summary.total,
        summary.passed,
        summary.failed,
        summary.skipped,
        summary.pass_rate() * 100.0
    );
    for result in results.iter().filter(|r| r.status == CaseStatus::Failed) {
        eprintln!("FAILED [{}] {}: {}", result.module, result.name, result.error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CaseDetail, Module, TestCase, UiCase};

    fn result(name: &str, passed: bool) -> CaseResult {
        let case: TestCase<UiCase> =
            serde_json::from_str(&format!(r#"{{"name": "{name}"}}"#)).unwrap();
        let mut r = CaseResult::begin(
            &case,
            Module::Ui,
            CaseDetail::Ui {
                screenshots: Vec::new(),
            },
        );
        if passed {
            r.pass();
        } else {
            r.fail("boom");
        }
        r.finish();
        r
    }

    #[test]
    fn summary_counts_by_status() {
        let results = vec![result("a", true), result("b", false), result("c", true)];
        let summary = RunSummary::from_results(&results);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 0);
        assert!(summary.has_failures());
        assert!((summary.pass_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_run_has_no_failures_and_zero_rate() {
        let summary = RunSummary::from_results(&[]);
        assert_eq!(summary.total, 0);
        assert!(!summary.has_failures());
        assert_eq!(summary.pass_rate(), 0.0);
    }
}
