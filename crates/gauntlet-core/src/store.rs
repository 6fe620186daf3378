//! Case discovery.
//!
//! Walks a backend's `testcases` directory, deserializes one case per
//! `.json` file and applies the tag filter at load time. "No cases" is
//! not an error: a missing or empty directory yields an empty Vec.

use std::path::Path;

use crate::model::{CasePayload, TestCase};

/// OR-semantics tag predicate. An empty request matches everything;
/// otherwise any requested tag (trimmed of surrounding whitespace) must be
/// present verbatim — case-sensitive, no wildcards.
pub fn matches_tags(case_tags: &[String], requested: &[String]) -> bool {
    if requested.is_empty() {
        return true;
    }
    requested
        .iter()
        .map(|t| t.trim())
        .any(|t| case_tags.iter().any(|c| c == t))
}

/// Load every case under `root` (or `root/<submodule>`), excluding cases
/// whose tags fail the filter. Files that fail to parse are logged and
/// skipped, never fatal.
///
/// Submodule resolution: a submodule-scoped load forces the value; an
/// explicit non-empty `submodule` field wins otherwise; the fallback is
/// the first path segment below `root`.
pub fn load_cases<P: CasePayload>(
    root: &Path,
    submodule: Option<&str>,
    tags: &[String],
) -> Vec<TestCase<P>> {
    let dir = match submodule {
        Some(sub) => root.join(sub),
        None => root.to_path_buf(),
    };
    if !dir.is_dir() {
        tracing::warn!(dir = %dir.display(), "case directory does not exist");
        return Vec::new();
    }

    let mut cases = Vec::new();
    for entry in walkdir::WalkDir::new(&dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
    {
        let path = entry.path();
        if !entry.file_type().is_file()
            || path.extension().and_then(|e| e.to_str()) != Some("json")
        {
            continue;
        }

        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "failed to read case file");
                continue;
            }
        };
        let mut case: TestCase<P> = match serde_json::from_str(&text) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "failed to parse case file");
                continue;
            }
        };

        if !matches_tags(&case.tags, tags) {
            continue;
        }

        match submodule {
            Some(sub) => case.submodule = sub.to_string(),
            None if case.submodule.is_empty() => {
                if let Some(first) = path
                    .strip_prefix(root)
                    .ok()
                    .and_then(|rel| rel.parent())
                    .and_then(|p| p.components().next())
                {
                    case.submodule = first.as_os_str().to_string_lossy().into_owned();
                }
            }
            None => {}
        }

        cases.push(case);
    }

    tracing::debug!(count = cases.len(), dir = %dir.display(), "loaded cases");
    cases
}
