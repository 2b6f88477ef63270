//! Configuration surface for the gantry workspace.
//!
//! Everything is serde-defaulted so an absent or empty `gantry.toml`
//! yields a working configuration. The front end supplies overrides for
//! tool locations, per-tool extra arguments, environment overlays, and
//! the task conflict policy.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// File name looked up in the workspace directory.
pub const CONFIG_FILE: &str = "gantry.toml";

fn default_restart_delay_ms() -> u64 {
    3000
}

/// What to do when a task is requested while one is already running in
/// the same category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// Kill the running task, then start the new one.
    #[default]
    StopRunning,
    /// Drop the new request without error.
    Ignore,
    /// Ask the front end; a dismissed prompt counts as `Ignore`.
    Ask,
}

/// Launch configuration for one external tool.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolConfig {
    /// Executable name or path.
    #[serde(default)]
    pub command: String,
    /// Extra arguments appended after the built-in ones.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment overlay applied on top of the inherited environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl ToolConfig {
    fn named(command: &str) -> Self {
        Self {
            command: command.to_string(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }
}

/// One entry per external tool the workspace shells out to.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsConfig {
    /// Build tool: compiles the project and emits machine-readable
    /// diagnostics on stdout.
    #[serde(default = "default_build")]
    pub build: ToolConfig,
    /// Completion daemon: long-lived, line-protocol child process.
    #[serde(default = "default_daemon")]
    pub daemon: ToolConfig,
    #[serde(default = "default_formatter")]
    pub formatter: ToolConfig,
    /// Symbol indexer used for workspace-wide symbol search.
    #[serde(default = "default_indexer")]
    pub indexer: ToolConfig,
    /// Toolchain multiplexer commands are routed through when set.
    #[serde(default = "default_mux")]
    pub mux: ToolConfig,
}

fn default_build() -> ToolConfig {
    ToolConfig::named("cargo")
}

fn default_daemon() -> ToolConfig {
    ToolConfig::named("racer")
}

fn default_formatter() -> ToolConfig {
    ToolConfig::named("rustfmt")
}

fn default_indexer() -> ToolConfig {
    ToolConfig::named("rustsym")
}

fn default_mux() -> ToolConfig {
    ToolConfig::named("rustup")
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            build: default_build(),
            daemon: default_daemon(),
            formatter: default_formatter(),
            indexer: default_indexer(),
            mux: default_mux(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
    /// Delay before the completion daemon is relaunched after a crash.
    #[serde(default = "default_restart_delay_ms")]
    pub daemon_restart_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tools: ToolsConfig::default(),
            conflict_policy: ConflictPolicy::default(),
            daemon_restart_delay_ms: default_restart_delay_ms(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl Config {
    /// Load `gantry.toml` from `dir`. An absent file yields the default
    /// configuration; an unreadable or malformed file is an error.
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(CONFIG_FILE);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };
        toml::from_str(&text).map_err(|source| ConfigError::Parse { path, source })
    }
}
