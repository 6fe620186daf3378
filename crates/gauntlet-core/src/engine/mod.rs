//! Execution engine: the interpreter seam, the scheduler and result
//! aggregation.

pub mod api;
pub mod scheduler;
pub mod ssh;
pub mod ui;

use async_trait::async_trait;

use crate::model::{CasePayload, CaseResult, Module, TestCase};

/// Case name made safe for use in an artifact filename.
pub(crate) fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// One backend's case executor. Implementations hold only read-only
/// configuration copied at construction; every mutable session resource
/// (HTTP client, SSH session, browser session) is created inside
/// `execute` so nothing is shared between concurrently running cases.
///
/// `execute` is infallible by contract: whatever goes wrong is captured
/// as a failed [`CaseResult`] and never propagated to the scheduler.
#[async_trait]
pub trait Interpreter: Send + Sync + 'static {
    type Payload: CasePayload;

    fn module(&self) -> Module;

    async fn execute(&self, case: &TestCase<Self::Payload>) -> CaseResult;
}

/// Collects results from possibly-parallel workers. Pure concatenation
/// with a null filter: a worker that produced nothing is dropped rather
/// than inserted as a placeholder. No re-sorting, no deduplication.
#[derive(Debug, Default)]
pub struct Aggregator {
    results: Vec<CaseResult>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: Option<CaseResult>) {
        match result {
            Some(r) => self.results.push(r),
            None => tracing::warn!("worker produced no result; dropping"),
        }
    }

    pub fn extend(&mut self, results: Vec<CaseResult>) {
        self.results.extend(results);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn into_results(self) -> Vec<CaseResult> {
        self.results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CaseDetail, CaseStatus, UiCase};

    fn result(name: &str) -> CaseResult {
        let case: TestCase<UiCase> =
            serde_json::from_str(&format!(r#"{{"name": "{name}"}}"#)).unwrap();
        let mut r = CaseResult::begin(
            &case,
            Module::Ui,
            CaseDetail::Ui {
                screenshots: Vec::new(),
            },
        );
        r.pass();
        r.finish();
        r
    }

    #[test]
    fn aggregator_drops_null_results_and_keeps_order() {
        let mut agg = Aggregator::new();
        agg.push(Some(result("a")));
        agg.push(None);
        agg.push(Some(result("b")));

        let results = agg.into_results();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].name, "a");
        assert_eq!(results[1].name, "b");
        assert!(results.iter().all(|r| r.status == CaseStatus::Passed));
    }
}
