use std::path::Path;

use crate::model::CaseResult;
use crate::report::RunSummary;

/// Write the run report as pretty-printed JSON. Parent directories are
/// created as needed.
pub fn write_json(results: &[CaseResult], out: &Path) -> anyhow::Result<()> {
    let report = serde_json::json!({
        "generated_at": chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        "summary": RunSummary::from_results(results),
        "results": results,
    });
    if let Some(parent) = out.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(out, serde_json::to_string_pretty(&report)?)?;
    tracing::info!(path = %out.display(), "report written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CaseDetail, CaseStatus, Module, TestCase, UiCase};

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
    fn report_contains_summary_and_flat_results() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("reports").join("run.json");

        write_json(&[result("login works")], &out).unwrap();

        let text = std::fs::read_to_string(&out).unwrap();
        let report: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(report["summary"]["total"], 1);
        assert_eq!(report["summary"]["passed"], 1);
        assert_eq!(report["results"][0]["name"], "login works");
        assert_eq!(report["results"][0]["status"], "passed");
        // The per-backend detail is flattened into the result object.
        assert!(report["results"][0].get("detail").is_none());
    }

    #[test]
    fn results_round_trip_through_the_report() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("run.json");
        write_json(&[result("a"), result("b")], &out).unwrap();

        let report: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        let results: Vec<CaseResult> =
            serde_json::from_value(report["results"].clone()).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.status == CaseStatus::Passed));
        assert!(results.iter().all(|r| r.module == Module::Ui));
    }
}
