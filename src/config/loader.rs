//! Configuration loading with multi-layer merge

use super::CollaboratorConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level autods configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AutodsConfig {
    /// Engine and server defaults
    #[serde(default)]
    pub defaults: Defaults,

    /// Collaborator service endpoints
    #[serde(default)]
    pub collaborators: CollaboratorsConfig,
}

/// Global default settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    /// Address the status/decision API binds to
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Per-call timeout for collaborator invocations, in seconds
    #[serde(default = "default_collaborator_timeout")]
    pub collaborator_timeout: u64,

    /// Self-heal retry cap for the execution stage
    #[serde(default = "default_max_heal_attempts")]
    pub max_heal_attempts: u32,

    /// Minimum spacing between self-heal attempts, in seconds
    #[serde(default = "default_heal_delay")]
    pub heal_delay_secs: u64,
}

fn default_bind() -> String {
    "127.0.0.1:8700".into()
}

fn default_collaborator_timeout() -> u64 {
    180
}

fn default_max_heal_attempts() -> u32 {
    3
}

fn default_heal_delay() -> u64 {
    5
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            collaborator_timeout: default_collaborator_timeout(),
            max_heal_attempts: default_max_heal_attempts(),
            heal_delay_secs: default_heal_delay(),
        }
    }
}

/// The three collaborator endpoints
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CollaboratorsConfig {
    #[serde(default = "default_generator")]
    pub generator: CollaboratorConfig,

    #[serde(default = "default_sandbox")]
    pub sandbox: CollaboratorConfig,

    #[serde(default = "default_discovery")]
    pub discovery: CollaboratorConfig,
}

fn default_generator() -> CollaboratorConfig {
    CollaboratorConfig::with_base_url("http://localhost:8010")
}

fn default_sandbox() -> CollaboratorConfig {
    CollaboratorConfig::with_base_url("http://localhost:8001")
}

fn default_discovery() -> CollaboratorConfig {
    CollaboratorConfig::with_base_url("http://localhost:8020")
}

impl Default for CollaboratorsConfig {
    fn default() -> Self {
        Self {
            generator: default_generator(),
            sandbox: default_sandbox(),
            discovery: default_discovery(),
        }
    }
}

impl AutodsConfig {
    /// Load configuration from the standard hierarchy
    ///
    /// Load order (later overrides earlier):
    /// 1. Built-in defaults
    /// 2. ~/.config/autods/config.toml
    /// 3. autods.toml (project)
    pub fn load(project_dir: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(user_config_path) = Self::user_config_path() {
            if user_config_path.exists() {
                let user_config = Self::load_file(&user_config_path)
                    .with_context(|| format!("loading {}", user_config_path.display()))?;
                config.merge(user_config);
            }
        }

        let project_config_path = project_dir
            .map(|p| p.join("autods.toml"))
            .unwrap_or_else(|| PathBuf::from("autods.toml"));

        if project_config_path.exists() {
            let project_config = Self::load_file(&project_config_path)
                .with_context(|| format!("loading {}", project_config_path.display()))?;
            config.merge(project_config);
        }

        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_file(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Get the user config path (~/.config/autods/config.toml)
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("autods/config.toml"))
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: Self) {
        if other.defaults.bind != default_bind() {
            self.defaults.bind = other.defaults.bind;
        }
        if other.defaults.collaborator_timeout != default_collaborator_timeout() {
            self.defaults.collaborator_timeout = other.defaults.collaborator_timeout;
        }
        if other.defaults.max_heal_attempts != default_max_heal_attempts() {
            self.defaults.max_heal_attempts = other.defaults.max_heal_attempts;
        }
        if other.defaults.heal_delay_secs != default_heal_delay() {
            self.defaults.heal_delay_secs = other.defaults.heal_delay_secs;
        }

        if other.collaborators.generator != default_generator() {
            self.collaborators.generator = other.collaborators.generator;
        }
        if other.collaborators.sandbox != default_sandbox() {
            self.collaborators.sandbox = other.collaborators.sandbox;
        }
        if other.collaborators.discovery != default_discovery() {
            self.collaborators.discovery = other.collaborators.discovery;
        }
    }
}
