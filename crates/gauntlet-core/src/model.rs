//! Case and result model shared by every backend.
//!
//! A [`TestCase`] is one JSON document: a common envelope (name,
//! description, tags, submodule) flattened together with one
//! backend-specific payload. Exactly one [`CaseResult`] is produced per
//! attempted case, whatever happens during execution.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Execution domain a case belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Module {
    Api,
    Ui,
    Ssh,
}

impl Module {
    pub fn as_str(&self) -> &'static str {
        match self {
            Module::Api => "api",
            Module::Ui => "ui",
            Module::Ssh => "ssh",
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one case. Starts at `Skipped`, moves to `Failed` on the
/// first violated expectation or caught error, and to `Passed` only when
/// execution reaches the end with nothing recorded against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    Skipped,
    Passed,
    Failed,
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CaseStatus::Skipped => "skipped",
            CaseStatus::Passed => "passed",
            CaseStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

fn default_case_name() -> String {
    "unnamed case".to_string()
}

/// One declarative test case: common envelope plus a backend payload.
/// Immutable once loaded; the payload type decides which interpreter may
/// execute it.
#[derive(Debug, Clone, Deserialize)]
pub struct TestCase<P> {
    #[serde(default = "default_case_name")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub submodule: String,
    #[serde(flatten)]
    pub payload: P,
}

/// Marker bound for backend payloads loaded by the case store.
pub trait CasePayload: DeserializeOwned + Clone + Send + Sync + 'static {}
impl<T: DeserializeOwned + Clone + Send + Sync + 'static> CasePayload for T {}

fn default_method() -> String {
    "GET".to_string()
}

fn default_expected_status() -> u16 {
    200
}

/// HTTP backend payload: one request and its expected outcome.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiCase {
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub params: HashMap<String, String>,
    /// Form-encoded body fields. Ignored when `json` is present.
    #[serde(default)]
    pub data: HashMap<String, String>,
    #[serde(default)]
    pub json: Option<serde_json::Value>,
    /// Per-request timeout in seconds; falls back to the backend timeout.
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default = "default_expected_status")]
    pub expected_status: u16,
    /// Keys that must exist in the decoded JSON body with equal values.
    #[serde(default)]
    pub expected_response: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    pub validate_schema: Option<serde_json::Value>,
}

fn default_ssh_port() -> u16 {
    22
}

/// SSH backend payload: one connection, an ordered command list and
/// per-command expectations keyed by command name.
#[derive(Debug, Clone, Deserialize)]
pub struct SshCase {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Private key path; takes precedence over `password` when both are set.
    #[serde(default)]
    pub key_file: Option<PathBuf>,
    #[serde(default)]
    pub commands: Vec<Command>,
    #[serde(default)]
    pub expected_results: HashMap<String, CommandExpectation>,
}

/// One remote command. Each command runs as an independent exec channel:
/// `cd` and environment changes do not persist to the next command.
#[derive(Debug, Clone, Deserialize)]
pub struct Command {
    #[serde(default)]
    pub name: Option<String>,
    pub command: String,
    /// Per-command timeout in seconds; falls back to the backend timeout.
    #[serde(default)]
    pub timeout: Option<u64>,
}

impl Command {
    /// Display name: explicit name or a positional placeholder.
    pub fn display_name(&self, index: usize) -> String {
        match &self.name {
            Some(n) if !n.is_empty() => n.clone(),
            _ => format!("command {}", index + 1),
        }
    }
}

/// A single required substring or a list of required substrings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn as_slice(&self) -> Vec<&str> {
        match self {
            OneOrMany::One(s) => vec![s.as_str()],
            OneOrMany::Many(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

/// Expected outcome for one named command: exact exit code plus stdout and
/// stderr containment, checked in that order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommandExpectation {
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub stdout: Option<OneOrMany>,
    #[serde(default)]
    pub stderr: Option<OneOrMany>,
}

/// UI backend payload: target URL and an ordered step list.
#[derive(Debug, Clone, Deserialize)]
pub struct UiCase {
    /// Falls back to the configured base URL when absent.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// One ordered UI interaction. The action name is kept as a string here
/// and parsed into the closed [`crate::engine::ui::Action`] set at
/// execution time, so an unknown action fails the case rather than the
/// load.
#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub locator: Option<Locator>,
    /// Action payload; meaning depends on the action (input text, script
    /// body, assertion operand, sleep seconds).
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    /// Post-action sleep in seconds.
    #[serde(default)]
    pub wait: f64,
    #[serde(default)]
    pub screenshot: bool,
}

impl Step {
    pub fn display_name(&self, index: usize) -> String {
        match &self.name {
            Some(n) if !n.is_empty() => n.clone(),
            _ => format!("step {}", index + 1),
        }
    }

    pub fn value_str(&self) -> &str {
        match &self.value {
            Some(serde_json::Value::String(s)) => s.as_str(),
            _ => "",
        }
    }

    pub fn value_f64(&self) -> Option<f64> {
        match &self.value {
            Some(serde_json::Value::Number(n)) => n.as_f64(),
            Some(serde_json::Value::String(s)) => s.parse().ok(),
            _ => None,
        }
    }
}

fn default_locator_type() -> String {
    "css".to_string()
}

/// Element locator: strategy name plus expression.
#[derive(Debug, Clone, Deserialize)]
pub struct Locator {
    #[serde(rename = "type", default = "default_locator_type")]
    pub kind: String,
    #[serde(default)]
    pub value: String,
}

/// Snapshot of the request an API case issued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSnapshot {
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub params: HashMap<String, String>,
    pub data: HashMap<String, String>,
    pub json: Option<serde_json::Value>,
}

/// Snapshot of the response an API case received. Absent entirely on
/// transport failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub content: String,
    /// Best-effort decode; `None` is not itself a failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<serde_json::Value>,
}

/// Transcript entry for one executed SSH command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub name: String,
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub status: CaseStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

/// Backend-specific portion of a result, flattened into the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CaseDetail {
    Api {
        request: RequestSnapshot,
        #[serde(skip_serializing_if = "Option::is_none")]
        response: Option<ResponseSnapshot>,
    },
    Ssh {
        command_results: Vec<CommandResult>,
    },
    Ui {
        screenshots: Vec<PathBuf>,
    },
}

/// The uniform outcome record, one per attempted case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResult {
    pub name: String,
    pub description: String,
    pub module: Module,
    pub submodule: String,
    pub status: CaseStatus,
    pub start_time: String,
    pub start_timestamp: i64,
    pub end_time: String,
    pub end_timestamp: i64,
    /// Seconds.
    pub duration: f64,
    pub error: String,
    pub traceback: String,
    #[serde(flatten)]
    pub detail: CaseDetail,
}

fn now_human(ts: chrono::DateTime<chrono::Local>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

impl CaseResult {
    /// Open a result for a case about to run: status `skipped`, start
    /// stamps taken now, end stamps unset until [`CaseResult::finish`].
    pub fn begin<P>(case: &TestCase<P>, module: Module, detail: CaseDetail) -> Self {
        let now = chrono::Local::now();
        Self {
            name: case.name.clone(),
            description: case.description.clone(),
            module,
            submodule: case.submodule.clone(),
            status: CaseStatus::Skipped,
            start_time: now_human(now),
            start_timestamp: now.timestamp_millis(),
            end_time: String::new(),
            end_timestamp: 0,
            duration: 0.0,
            error: String::new(),
            traceback: String::new(),
            detail,
        }
    }

    /// Record the first failure. Later calls keep the original error.
    pub fn fail(&mut self, error: impl Into<String>) {
        if self.status == CaseStatus::Failed {
            return;
        }
        self.status = CaseStatus::Failed;
        self.error = error.into();
    }

    pub fn fail_with_trace(&mut self, error: impl Into<String>, traceback: impl Into<String>) {
        let was_failed = self.status == CaseStatus::Failed;
        self.fail(error);
        if !was_failed {
            self.traceback = traceback.into();
        }
    }

    /// Mark passed, unless a failure was already recorded.
    pub fn pass(&mut self) {
        if self.status != CaseStatus::Failed {
            self.status = CaseStatus::Passed;
        }
    }

    /// Stamp end time and duration. Idempotent enough for `finally`-style
    /// call sites: always reflects the latest call.
    pub fn finish(&mut self) {
        let now = chrono::Local::now();
        self.end_time = now_human(now);
        self.end_timestamp = now.timestamp_millis();
        self.duration = (self.end_timestamp - self.start_timestamp).max(0) as f64 / 1000.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_defaults_apply() {
        let case: TestCase<ApiCase> = serde_json::from_str(r#"{"endpoint": "/ping"}"#).unwrap();
        assert_eq!(case.name, "unnamed case");
        assert!(case.tags.is_empty());
        assert_eq!(case.payload.method, "GET");
        assert_eq!(case.payload.expected_status, 200);
    }

    #[test]
    fn ssh_expectation_accepts_one_or_many() {
        let one: CommandExpectation =
            serde_json::from_str(r#"{"exit_code": 0, "stdout": "ok"}"#).unwrap();
        assert_eq!(one.stdout.unwrap().as_slice(), vec!["ok"]);

        let many: CommandExpectation =
            serde_json::from_str(r#"{"stderr": ["warn", "deprecated"]}"#).unwrap();
        assert_eq!(many.stderr.unwrap().as_slice(), vec!["warn", "deprecated"]);
    }

    #[test]
    fn result_detail_flattens_per_backend() {
        let case: TestCase<SshCase> = serde_json::from_str(r#"{"host": "h"}"#).unwrap();
        let mut result = CaseResult::begin(
            &case,
            Module::Ssh,
            CaseDetail::Ssh {
                command_results: Vec::new(),
            },
        );
        result.pass();
        result.finish();

        let v = serde_json::to_value(&result).unwrap();
        assert_eq!(v["module"], "ssh");
        assert_eq!(v["status"], "passed");
        assert!(v["command_results"].as_array().unwrap().is_empty());
        assert!(v.get("screenshots").is_none());
        assert!(result.duration >= 0.0);
    }

    #[test]
    fn fail_keeps_first_error_and_pass_cannot_override() {
        let case: TestCase<UiCase> = serde_json::from_str("{}").unwrap();
        let mut result = CaseResult::begin(
            &case,
            Module::Ui,
            CaseDetail::Ui {
                screenshots: Vec::new(),
            },
        );
        result.fail("first");
        result.fail("second");
        result.pass();
        assert_eq!(result.status, CaseStatus::Failed);
        assert_eq!(result.error, "first");
    }

    #[test]
    fn statuses_sort_for_outcome_comparison() {
        let mut statuses = vec![CaseStatus::Failed, CaseStatus::Skipped, CaseStatus::Passed];
        statuses.sort();
        assert_eq!(
            statuses,
            vec![CaseStatus::Skipped, CaseStatus::Passed, CaseStatus::Failed]
        );
    }

    #[test]
    fn step_value_accessors() {
        let step: Step =
            serde_json::from_str(r#"{"action": "wait", "value": "1.5"}"#).unwrap();
        assert_eq!(step.value_f64(), Some(1.5));
        let step: Step =
            serde_json::from_str(r#"{"action": "input", "value": "hello"}"#).unwrap();
        assert_eq!(step.value_str(), "hello");
    }
}
