//! Runtime configuration.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::{RuntimeError, RuntimeResult};

/// Environment variable naming the entrypoint script.
pub const INIT_ENV: &str = "WFLUA_INIT";

/// Environment variable naming the runtime library directory.
pub const RUNTIME_DIR_ENV: &str = "WFLUA_RUNTIME_DIR";

/// Where the runtime looks for scripts.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct RuntimeConfig {
    /// File names tried in order; the first one that exists is run.
    #[builder(default = "default_entrypoints()")]
    #[serde(default = "default_entrypoints")]
    pub entrypoints: Vec<String>,

    /// Directory entrypoints are resolved against (None = current directory).
    #[builder(default)]
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Runtime library directory prepended to `package.path`.
    #[builder(default = "default_runtime_dir()")]
    #[serde(default = "default_runtime_dir")]
    pub runtime_dir: PathBuf,

    /// Run the entrypoint at all.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_entrypoints() -> Vec<String> {
    vec!["init".to_string(), "init.lua".to_string()]
}

fn default_runtime_dir() -> PathBuf {
    match option_env!("WFLUA_RUNTIME_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wflua")
            .join("runtime"),
    }
}

fn default_true() -> bool {
    true
}

impl RuntimeConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref entrypoints) = self.entrypoints {
            if entrypoints.is_empty() {
                return Err("At least one entrypoint is required".to_string());
            }
            if entrypoints.iter().any(|e| e.is_empty()) {
                return Err("Entrypoint names cannot be empty".to_string());
            }
        }
        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            entrypoints: default_entrypoints(),
            working_dir: None,
            runtime_dir: default_runtime_dir(),
            enabled: true,
        }
    }
}

impl RuntimeConfig {
    /// Create a new runtime config builder.
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::default()
    }

    /// Default location of the config file.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wflua")
            .join("wflua.toml")
    }

    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(source: &str) -> RuntimeResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| RuntimeError::Config {
            message: e.to_string(),
        })?;
        if config.entrypoints.is_empty() {
            return Err(RuntimeError::Config {
                message: "At least one entrypoint is required".to_string(),
            });
        }
        Ok(config)
    }

    /// Load from `path`, or the defaults if the file does not exist.
    pub fn load_from(path: &Path) -> RuntimeResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Load the user's config file, then apply environment overrides.
    pub fn load() -> RuntimeResult<Self> {
        let config = Self::load_from(&Self::default_path())?;
        Ok(config.with_overrides(
            std::env::var_os(INIT_ENV),
            std::env::var_os(RUNTIME_DIR_ENV),
        ))
    }

    /// Replace the entrypoint and runtime directory when given.
    pub fn with_overrides(mut self, init: Option<OsString>, runtime_dir: Option<OsString>) -> Self {
        if let Some(init) = init.filter(|s| !s.is_empty()) {
            self.entrypoints = vec![init.to_string_lossy().into_owned()];
        }
        if let Some(dir) = runtime_dir.filter(|s| !s.is_empty()) {
            self.runtime_dir = PathBuf::from(dir);
        }
        self
    }

    /// Directory entrypoints are resolved against.
    pub fn base_dir(&self) -> PathBuf {
        self.working_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    /// The first entrypoint candidate that is an existing file.
    pub fn resolve_entrypoint(&self) -> RuntimeResult<PathBuf> {
        let dir = self.base_dir();
        self.entrypoints
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
            .ok_or_else(|| RuntimeError::NoEntrypoint {
                dir,
                tried: self.entrypoints.clone(),
            })
    }

    /// The `package.path` prefix for the runtime directory.
    pub fn package_path_prefix(&self) -> String {
        let dir = self.runtime_dir.display();
        format!("{dir}/?.lua;{dir}/?/init.lua;")
    }
}
