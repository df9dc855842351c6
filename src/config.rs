//! XDG paths and `config.toml` load/merge/save.
//!
//! Grounded on `leta/utils/config.py`: same default values, same merge
//! semantics (nested tables merge key-by-key, everything else is
//! overwritten by the user file), same atomic write-then-rename on save.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

const APP_QUALIFIER: &str = "";
const APP_ORG: &str = "";
const APP_NAME: &str = "leta";

fn project_dirs() -> ProjectDirs {
    ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .expect("no home directory could be determined for this platform")
}

#[must_use]
pub fn cache_dir() -> PathBuf {
    project_dirs().cache_dir().to_path_buf()
}

#[must_use]
pub fn config_dir() -> PathBuf {
    project_dirs().config_dir().to_path_buf()
}

#[must_use]
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

#[must_use]
pub fn socket_path() -> PathBuf {
    cache_dir().join("daemon.sock")
}

#[must_use]
pub fn pid_path() -> PathBuf {
    cache_dir().join("daemon.pid")
}

#[must_use]
pub fn lock_path() -> PathBuf {
    cache_dir().join("daemon.lock")
}

#[must_use]
pub fn log_dir() -> PathBuf {
    cache_dir().join("log")
}

pub const DEFAULT_CACHE_SIZE_BYTES: u64 = 256 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub log_level: String,
    pub request_timeout: u64,
    pub hover_cache_size: u64,
    pub symbol_cache_size: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            request_timeout: 30,
            hover_cache_size: DEFAULT_CACHE_SIZE_BYTES,
            symbol_cache_size: DEFAULT_CACHE_SIZE_BYTES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspacesConfig {
    pub roots: Vec<String>,
    pub excluded_languages: Vec<String>,
}

impl Default for WorkspacesConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            excluded_languages: vec!["json".into(), "yaml".into(), "html".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormattingConfig {
    pub tab_size: u32,
    pub insert_spaces: bool,
}

impl Default for FormattingConfig {
    fn default() -> Self {
        Self {
            tab_size: 4,
            insert_spaces: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerOverride {
    #[serde(default)]
    pub command: Option<Vec<String>>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub init_options: Option<serde_json::Value>,
    #[serde(default)]
    pub preferred: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub daemon: DaemonConfig,
    pub workspaces: WorkspacesConfig,
    pub formatting: FormattingConfig,
    pub servers: HashMap<String, ServerOverride>,
}

/// Load the config file, merging it over the defaults. Missing file is not
/// an error; it just means all defaults apply.
pub fn load() -> Result<Config> {
    let path = config_path();
    if !path.exists() {
        return Ok(Config::default());
    }
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let user: toml::Value =
        toml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))?;
    let mut base = toml::Value::try_from(Config::default())?;
    merge_toml(&mut base, &user);
    Ok(base.try_into()?)
}

fn merge_toml(base: &mut toml::Value, overlay: &toml::Value) {
    if let (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) = (base, overlay) {
        for (key, value) in overlay_table {
            match base_table.get_mut(key) {
                Some(existing) if existing.is_table() && value.is_table() => {
                    merge_toml(existing, value);
                }
                _ => {
                    base_table.insert(key.clone(), value.clone());
                }
            }
        }
    }
}

/// Write the config back atomically: write to a sibling temp file, then
/// rename over the target.
pub fn save(config: &Config) -> Result<()> {
    let path = config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let text = toml::to_string_pretty(config)?;
    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, text)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

pub fn add_workspace_root(config: &mut Config, root: &std::path::Path) -> Result<()> {
    let root_str = root
        .canonicalize()
        .unwrap_or_else(|_| root.to_path_buf())
        .to_string_lossy()
        .into_owned();
    if !config.workspaces.roots.contains(&root_str) {
        config.workspaces.roots.push(root_str);
        save(config)?;
    }
    Ok(())
}

pub fn remove_workspace_root(config: &mut Config, root: &std::path::Path) -> Result<bool> {
    let root_str = root
        .canonicalize()
        .unwrap_or_else(|_| root.to_path_buf())
        .to_string_lossy()
        .into_owned();
    let before = config.workspaces.roots.len();
    config.workspaces.roots.retain(|r| r != &root_str);
    let removed = config.workspaces.roots.len() != before;
    if removed {
        save(config)?;
    }
    Ok(removed)
}

/// Remove workspace roots that no longer exist on disk. Returns the
/// removed roots.
pub fn cleanup_stale_workspace_roots(config: &mut Config) -> Result<Vec<String>> {
    let mut removed = Vec::new();
    let mut valid = Vec::new();
    for root in config.workspaces.roots.drain(..) {
        if PathBuf::from(&root).is_dir() {
            valid.push(root);
        } else {
            removed.push(root);
        }
    }
    config.workspaces.roots = valid;
    if !removed.is_empty() {
        save(config)?;
    }
    Ok(removed)
}

const WORKSPACE_MARKERS: &[&str] = &[
    ".git",
    "pyproject.toml",
    "setup.py",
    "setup.cfg",
    "Cargo.toml",
    "package.json",
    "go.mod",
    "Makefile",
    "CMakeLists.txt",
    ".project",
    "build.gradle",
    "pom.xml",
    "mix.exs",
    "Gemfile",
    "requirements.txt",
];

/// Walk up from `path` looking for the deepest directory containing a
/// workspace marker.
#[must_use]
pub fn detect_workspace_root(path: &std::path::Path) -> Option<PathBuf> {
    let mut current = if path.is_file() {
        path.parent()?.to_path_buf()
    } else {
        path.to_path_buf()
    };
    loop {
        if WORKSPACE_MARKERS.iter().any(|m| current.join(m).exists()) {
            return Some(current);
        }
        match current.parent() {
            Some(parent) if parent != current => current = parent.to_path_buf(),
            _ => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_python_defaults() {
        let c = Config::default();
        assert_eq!(c.daemon.request_timeout, 30);
        assert_eq!(c.daemon.hover_cache_size, DEFAULT_CACHE_SIZE_BYTES);
        assert_eq!(
            c.workspaces.excluded_languages,
            vec!["json", "yaml", "html"]
        );
        assert_eq!(c.formatting.tab_size, 4);
        assert!(c.formatting.insert_spaces);
    }

    #[test]
    fn add_and_remove_workspace_root_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config_home = dir.path().join("config");
        std::env::set_var("XDG_CONFIG_HOME", &config_home);
        let mut config = Config::default();
        let root = dir.path().to_path_buf();
        add_workspace_root(&mut config, &root).unwrap();
        add_workspace_root(&mut config, &root).unwrap();
        assert_eq!(config.workspaces.roots.len(), 1);
        let removed = remove_workspace_root(&mut config, &root).unwrap();
        assert!(removed);
        assert!(config.workspaces.roots.is_empty());
    }

    #[test]
    fn detect_workspace_root_finds_cargo_toml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]\n").unwrap();
        let nested = dir.path().join("src").join("deep");
        std::fs::create_dir_all(&nested).unwrap();
        let found = detect_workspace_root(&nested).unwrap();
        assert_eq!(found, dir.path());
    }
}
