//! Orchestrator configuration, loadable from TOML.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::approval::NonInteractivePolicy;
use crate::context::{ContextBudget, DEFAULT_RESERVED_TOKENS};
use crate::lifecycle::DEFAULT_FIRE_THRESHOLD;

pub const DEFAULT_MODEL: &str = "gpt-4";
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;
pub const DEFAULT_WARN_THRESHOLD: f64 = 0.8;
pub const DEFAULT_BASE_BRANCH: &str = "main";
pub const DEFAULT_OUTPUT_DIR: &str = "output";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub model_tag: String,
    /// Overrides the model's default window.
    pub max_tokens: Option<usize>,
    pub reserved_tokens: usize,
    /// Fraction of the window at which usage warnings start.
    pub warn_threshold: f64,
    pub max_iterations: u32,
    pub auto_approve: bool,
    pub non_interactive_policy: NonInteractivePolicy,
    pub integrate: bool,
    pub base_branch: String,
    pub branch_name: Option<String>,
    pub fire_threshold: f64,
    pub output_dir: PathBuf,
    /// Repository integration requests are filed against.
    pub repository: Option<String>,
    pub owner: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            model_tag: DEFAULT_MODEL.to_string(),
            max_tokens: None,
            reserved_tokens: DEFAULT_RESERVED_TOKENS,
            warn_threshold: DEFAULT_WARN_THRESHOLD,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            auto_approve: false,
            non_interactive_policy: NonInteractivePolicy::default(),
            integrate: false,
            base_branch: DEFAULT_BASE_BRANCH.to_string(),
            branch_name: None,
            fire_threshold: DEFAULT_FIRE_THRESHOLD,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            repository: None,
            owner: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_toml_str(s: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Window size after applying the `max_tokens` override.
    pub fn effective_max_tokens(&self) -> usize {
        self.max_tokens
            .unwrap_or_else(|| ContextBudget::for_model(&self.model_tag).max_tokens)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_iterations == 0 {
            return Err(ConfigError::Invalid(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        let max = self.effective_max_tokens();
        if self.reserved_tokens >= max {
            return Err(ConfigError::Invalid(format!(
                "reserved_tokens ({}) must be below max_tokens ({max})",
                self.reserved_tokens
            )));
        }
        if !(self.warn_threshold > 0.0 && self.warn_threshold <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "warn_threshold must be in (0, 1], got {}",
                self.warn_threshold
            )));
        }
        if self.model_tag.trim().is_empty() {
            return Err(ConfigError::Invalid("model_tag must not be empty".to_string()));
        }
        Ok(())
    }

    /// `owner/repository`, or just the repository when no owner is set.
    pub fn repository_slug(&self) -> Option<String> {
        let repo = self.repository.as_deref().map(str::trim).filter(|r| !r.is_empty())?;
        match self.owner.as_deref().map(str::trim).filter(|o| !o.is_empty()) {
            Some(owner) => Some(format!("{owner}/{repo}")),
            None => Some(repo.to_string()),
        }
    }

    /// The context budget described by this config.
    pub fn budget(&self) -> ConfigResult<ContextBudget> {
        ContextBudget::new(
            self.model_tag.clone(),
            self.effective_max_tokens(),
            self.reserved_tokens,
        )
        .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}
