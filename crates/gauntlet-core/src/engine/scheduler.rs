//! Bounded-concurrency case scheduler shared by all three backends.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::engine::{Aggregator, Interpreter};
use crate::model::{CaseResult, TestCase};

/// Runs a filtered case collection either sequentially or on a worker
/// pool sized exactly at the requested concurrency. There is no ordering
/// between parallel cases and no cross-case cancellation: one case's
/// failure or timeout never touches its siblings, and every submitted
/// case yields exactly one result.
#[derive(Debug, Clone)]
pub struct Scheduler {
    parallel: usize,
}

impl Scheduler {
    pub fn new(parallel: usize) -> Self {
        Self {
            parallel: parallel.max(1),
        }
    }

    /// Execute `cases`, returning results in declared order when
    /// sequential and in completion order when parallel. An empty input
    /// is "nothing to report", not an error.
    pub async fn run<I: Interpreter>(
        &self,
        interpreter: Arc<I>,
        cases: Vec<TestCase<I::Payload>>,
    ) -> Vec<CaseResult> {
        if cases.is_empty() {
            tracing::warn!(module = %interpreter.module(), "no matching cases");
            return Vec::new();
        }

        let total = cases.len();
        tracing::info!(
            module = %interpreter.module(),
            cases = total,
            parallel = self.parallel,
            "starting run"
        );

        let mut aggregator = Aggregator::new();
        if self.parallel <= 1 || total <= 1 {
            for case in &cases {
                aggregator.push(Some(interpreter.execute(case).await));
            }
        } else {
            let sem = Arc::new(Semaphore::new(self.parallel));
            let mut join_set = JoinSet::new();
            for case in cases {
                let Ok(permit) = sem.clone().acquire_owned().await else {
                    break;
                };
                let interpreter = interpreter.clone();
                join_set.spawn(async move {
                    let _permit = permit;
                    interpreter.execute(&case).await
                });
            }
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok(result) => aggregator.push(Some(result)),
                    Err(e) => {
                        tracing::warn!(error = %e, "worker task did not complete");
                        aggregator.push(None);
                    }
                }
            }
        }

        tracing::info!(
            module = %interpreter.module(),
            results = aggregator.len(),
            "run complete"
        );
        aggregator.into_results()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CaseDetail, CaseStatus, Module, UiCase};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Scripted backend: fails cases whose name starts with "bad",
    /// optionally sleeping to scramble completion order.
    struct ScriptedInterpreter {
        executed: AtomicUsize,
        stagger: bool,
    }

    impl ScriptedInterpreter {
        fn new(stagger: bool) -> Self {
            Self {
                executed: AtomicUsize::new(0),
                stagger,
            }
        }
    }

    #[async_trait]
    impl Interpreter for ScriptedInterpreter {
        type Payload = UiCase;

        fn module(&self) -> Module {
            Module::Ui
        }

        async fn execute(&self, case: &TestCase<UiCase>) -> CaseResult {
            let n = self.executed.fetch_add(1, Ordering::SeqCst);
            if self.stagger {
                // Later submissions finish earlier.
                tokio::time::sleep(Duration::from_millis(20u64.saturating_sub(n as u64))).await;
            }
            let mut result = CaseResult::begin(
                case,
                Module::Ui,
                CaseDetail::Ui {
                    screenshots: Vec::new(),
                },
            );
            if case.name.starts_with("bad") {
                result.fail("scripted failure");
            } else {
                result.pass();
            }
            result.finish();
            result
        }
    }

    fn cases(names: &[&str]) -> Vec<TestCase<UiCase>> {
        names
            .iter()
            .map(|n| serde_json::from_str(&format!(r#"{{"name": "{n}"}}"#)).unwrap())
            .collect()
    }

    fn outcome_multiset(results: &[CaseResult]) -> Vec<(String, CaseStatus)> {
        let mut pairs: Vec<_> = results
            .iter()
            .map(|r| (r.name.clone(), r.status))
            .collect();
        pairs.sort();
        pairs
    }

    #[tokio::test]
    async fn every_submitted_case_produces_exactly_one_result() {
        let interpreter = Arc::new(ScriptedInterpreter::new(true));
        let input = cases(&["a", "bad-b", "c", "d", "e"]);
        let results = Scheduler::new(3).run(interpreter.clone(), input).await;
        assert_eq!(results.len(), 5);
        assert_eq!(interpreter.executed.load(Ordering::SeqCst), 5);

        let mut names: Vec<_> = results.iter().map(|r| r.name.clone()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 5, "no duplicate results");
    }

    #[tokio::test]
    async fn concurrency_changes_ordering_but_not_outcomes() {
        let input = cases(&["a", "bad-b", "c", "bad-d", "e", "f"]);

        let sequential = Scheduler::new(1)
            .run(Arc::new(ScriptedInterpreter::new(false)), input.clone())
            .await;
        let parallel = Scheduler::new(4)
            .run(Arc::new(ScriptedInterpreter::new(true)), input)
            .await;

        assert_eq!(outcome_multiset(&sequential), outcome_multiset(&parallel));
    }

    #[tokio::test]
    async fn sequential_preserves_declared_order() {
        let input = cases(&["first", "second", "third"]);
        let results = Scheduler::new(1)
            .run(Arc::new(ScriptedInterpreter::new(false)), input)
            .await;
        let names: Vec<_> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn empty_input_is_nothing_to_report() {
        let results = Scheduler::new(8)
            .run(Arc::new(ScriptedInterpreter::new(false)), Vec::new())
            .await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn single_case_runs_sequentially_regardless_of_parallelism() {
        let interpreter = Arc::new(ScriptedInterpreter::new(false));
        let results = Scheduler::new(16)
            .run(interpreter.clone(), cases(&["only"]))
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, CaseStatus::Passed);
    }
}
