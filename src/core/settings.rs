//! Operator settings for intercept.
//!
//! Settings come from an optional TOML file and a few environment variables. Everything has a
//! default, so a machine without `/etc/intercept.toml` works out of the box.
//!
//! ```toml
//! config_dir = "/etc/interceptor.d"
//! search_path = ["/usr/local/bin", "/usr/bin", "/bin"]
//! interpreter = "/usr/local/bin/intercept"
//! editor = "vim"
//! ```

use crate::core::error::InterceptError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Rule files live here unless overridden.
pub const DEFAULT_CONFIG_DIR: &str = "/etc/interceptor.d";
/// Settings file read when `INTERCEPT_SETTINGS` is not set.
pub const DEFAULT_SETTINGS_FILE: &str = "/etc/intercept.toml";

pub const ENV_SETTINGS: &str = "INTERCEPT_SETTINGS";
pub const ENV_CONFIG_DIR: &str = "INTERCEPT_CONFIG_DIR";
pub const ENV_SEARCH_PATH: &str = "INTERCEPT_SEARCH_PATH";

/// On-disk shape of the settings file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SettingsFile {
    pub config_dir: Option<PathBuf>,
    pub search_path: Option<Vec<PathBuf>>,
    pub interpreter: Option<PathBuf>,
    pub editor: Option<String>,
}

/// Fully resolved settings for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub config_dir: PathBuf,
    pub search_path: Vec<PathBuf>,
    /// Binary the generated wrappers hand control to.
    pub interpreter: PathBuf,
    pub editor: Option<String>,
}

impl SettingsFile {
    /// Parse a settings file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, InterceptError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| InterceptError::SettingsError(format!("{}: {}", path.display(), e)))
    }
}

impl Settings {
    /// Resolve settings from the process environment.
    ///
    /// `config_dir_override` is the `--config-dir` flag and beats everything else.
    pub fn from_env(config_dir_override: Option<PathBuf>) -> Result<Self, InterceptError> {
        let settings_path = std::env::var_os(ENV_SETTINGS)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE));
        let file = SettingsFile::load(&settings_path)?;

        let env_config_dir = std::env::var_os(ENV_CONFIG_DIR).map(PathBuf::from);
        let env_search_path = std::env::var_os(ENV_SEARCH_PATH);
        let path_var = std::env::var_os("PATH");

        let interpreter = match file.interpreter.clone() {
            Some(p) => p,
            None => std::env::current_exe()?,
        };

        Ok(Self::resolve(
            file,
            config_dir_override.or(env_config_dir),
            env_search_path.as_deref().map(split_search_path),
            path_var.as_deref().map(split_search_path).unwrap_or_default(),
            interpreter,
        ))
    }

    /// Apply precedence rules without touching the environment.
    pub fn resolve(
        file: SettingsFile,
        config_dir: Option<PathBuf>,
        search_path: Option<Vec<PathBuf>>,
        path_var: Vec<PathBuf>,
        interpreter: PathBuf,
    ) -> Self {
        Settings {
            config_dir: config_dir
                .or(file.config_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR)),
            search_path: search_path.or(file.search_path).unwrap_or(path_var),
            interpreter,
            editor: file.editor,
        }
    }
}

/// Split a `PATH`-style list, dropping empty entries.
pub fn split_search_path(raw: &std::ffi::OsStr) -> Vec<PathBuf> {
    std::env::split_paths(raw)
        .filter(|p| !p.as_os_str().is_empty())
        .collect()
}
