//! Runtime configuration.
//!
//! Layout on disk, resolved once at startup and passed by reference:
//!
//! ```text
//! config/
//!   config.yaml            # common settings
//!   config_<env>.yaml      # environment overlay, deep-merged over common
//!   modules/
//!     api.user.yaml        # per-submodule override, keyed by file stem
//!     ui.login.yaml
//! ```
//!
//! Submodule overrides replace scalar fields; header maps merge with the
//! submodule keys winning on conflict.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::ConfigError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout: u64,
    /// Default headers; case-level headers win on key conflict.
    pub headers: HashMap<String, String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout: 30,
            headers: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// chrome, firefox or edge; anything else falls back to chrome.
    pub browser: String,
    pub headless: bool,
    pub base_url: String,
    /// Element-wait timeout in seconds.
    pub timeout: u64,
    /// Address of a running WebDriver endpoint.
    pub webdriver_url: String,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            browser: "chrome".to_string(),
            headless: true,
            base_url: String::new(),
            timeout: 30,
            webdriver_url: "http://localhost:4444".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// Connect and per-command timeout in seconds; a command's own
    /// `timeout` field overrides it.
    pub timeout: u64,
    /// Default credentials for cases that omit them.
    pub username: Option<String>,
    pub password: Option<String>,
    pub key_file: Option<PathBuf>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            timeout: 30,
            username: None,
            password: None,
            key_file: None,
        }
    }
}

/// Per-submodule override. One shape shared by all three backends; only
/// the fields the backend knows are consulted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModuleOverride {
    pub base_url: Option<String>,
    pub timeout: Option<u64>,
    pub headers: Option<HashMap<String, String>>,
    pub browser: Option<String>,
    pub headless: Option<bool>,
    pub webdriver_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub key_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub ui: UiConfig,
    pub ssh: SshConfig,
    /// Keyed `<module>.<submodule>`, e.g. `api.user`.
    pub modules: HashMap<String, ModuleOverride>,
}

impl Config {
    /// Load `config.yaml` plus the `<env>` overlay and module overrides
    /// from `dir`. Missing files are fine; unparseable ones are fatal.
    pub fn load(dir: &Path, env: &str) -> Result<Self, ConfigError> {
        let mut merged = read_yaml(&dir.join("config.yaml"))?
            .unwrap_or(serde_yaml::Value::Mapping(Default::default()));

        if let Some(overlay) = read_yaml(&dir.join(format!("config_{env}.yaml")))? {
            deep_merge(&mut merged, overlay);
        }

        let mut config: Config = serde_yaml::from_value(merged).map_err(|source| {
            ConfigError::Parse {
                path: dir.join("config.yaml").display().to_string(),
                source,
            }
        })?;

        let modules_dir = dir.join("modules");
        if modules_dir.is_dir() {
            for entry in std::fs::read_dir(&modules_dir).into_iter().flatten().flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                    continue;
                }
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                let module: ModuleOverride =
                    serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
                        path: path.display().to_string(),
                        source,
                    })?;
                config.modules.insert(stem.to_string(), module);
            }
        }

        Ok(config)
    }

    fn module(&self, module: &str, submodule: Option<&str>) -> Option<&ModuleOverride> {
        let sub = submodule?;
        self.modules.get(&format!("{module}.{sub}"))
    }

    /// Effective API settings for an optional submodule scope.
    pub fn api_for(&self, submodule: Option<&str>) -> ApiConfig {
        let mut cfg = self.api.clone();
        if let Some(m) = self.module("api", submodule) {
            if let Some(v) = &m.base_url {
                cfg.base_url = v.clone();
            }
            if let Some(v) = m.timeout {
                cfg.timeout = v;
            }
            if let Some(h) = &m.headers {
                cfg.headers.extend(h.clone());
            }
        }
        cfg
    }

    pub fn ui_for(&self, submodule: Option<&str>) -> UiConfig {
        let mut cfg = self.ui.clone();
        if let Some(m) = self.module("ui", submodule) {
            if let Some(v) = &m.base_url {
                cfg.base_url = v.clone();
            }
            if let Some(v) = &m.browser {
                cfg.browser = v.clone();
            }
            if let Some(v) = m.headless {
                cfg.headless = v;
            }
            if let Some(v) = m.timeout {
                cfg.timeout = v;
            }
            if let Some(v) = &m.webdriver_url {
                cfg.webdriver_url = v.clone();
            }
        }
        cfg
    }

    pub fn ssh_for(&self, submodule: Option<&str>) -> SshConfig {
        let mut cfg = self.ssh.clone();
        if let Some(m) = self.module("ssh", submodule) {
            if let Some(v) = m.timeout {
                cfg.timeout = v;
            }
            if let Some(v) = &m.username {
                cfg.username = Some(v.clone());
            }
            if let Some(v) = &m.password {
                cfg.password = Some(v.clone());
            }
            if let Some(v) = &m.key_file {
                cfg.key_file = Some(v.clone());
            }
        }
        cfg
    }

    /// Known submodule override keys, optionally filtered by module type.
    pub fn modules_list(&self, module_type: Option<&str>) -> Vec<String> {
        let mut keys: Vec<String> = self
            .modules
            .keys()
            .filter(|k| match module_type {
                Some(t) => k.starts_with(&format!("{t}.")),
                None => true,
            })
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

fn read_yaml(path: &Path) -> Result<Option<serde_yaml::Value>, ConfigError> {
    if !path.is_file() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let value = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    Ok(Some(value))
}

/// Recursive mapping merge; the overlay wins on scalar conflict.
fn deep_merge(base: &mut serde_yaml::Value, overlay: serde_yaml::Value) {
    match (base, overlay) {
        (serde_yaml::Value::Mapping(base_map), serde_yaml::Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, text: &str) {
        std::fs::write(dir.join(name), text).unwrap();
    }

    #[test]
    fn env_overlay_deep_merges_over_common() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "config.yaml",
            "api:\n  base_url: http://common\n  timeout: 10\n  headers:\n    X-Common: '1'\n",
        );
        write(
            dir.path(),
            "config_test.yaml",
            "api:\n  base_url: http://test\n",
        );

        let config = Config::load(dir.path(), "test").unwrap();
        assert_eq!(config.api.base_url, "http://test");
        assert_eq!(config.api.timeout, 10);
        assert_eq!(config.api.headers["X-Common"], "1");
    }

    #[test]
    fn missing_files_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path(), "prod").unwrap();
        assert_eq!(config.api.timeout, 30);
        assert_eq!(config.ui.browser, "chrome");
        assert!(config.modules.is_empty());
    }

    #[test]
    fn unparseable_config_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "config.yaml", "api: [not-a-mapping\n");
        assert!(Config::load(dir.path(), "test").is_err());
    }

    #[test]
    fn submodule_override_replaces_scalars_and_merges_headers() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "config.yaml",
            "api:\n  base_url: http://base\n  headers:\n    A: '1'\n    B: '2'\n",
        );
        let modules = dir.path().join("modules");
        std::fs::create_dir(&modules).unwrap();
        write(
            &modules,
            "api.user.yaml",
            "base_url: http://user\ntimeout: 5\nheaders:\n  B: '9'\n  C: '3'\n",
        );

        let config = Config::load(dir.path(), "test").unwrap();

        let scoped = config.api_for(Some("user"));
        assert_eq!(scoped.base_url, "http://user");
        assert_eq!(scoped.timeout, 5);
        assert_eq!(scoped.headers["A"], "1");
        assert_eq!(scoped.headers["B"], "9");
        assert_eq!(scoped.headers["C"], "3");

        let unscoped = config.api_for(None);
        assert_eq!(unscoped.base_url, "http://base");

        assert_eq!(config.modules_list(Some("api")), vec!["api.user"]);
        assert!(config.modules_list(Some("ui")).is_empty());
    }
}
