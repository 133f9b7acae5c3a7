use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::delivery::{GitAuth, MergeStrategy, MergeStrategyMap};
use crate::orchestrator::{MergeSettings, StepBudgets};

/// Main configuration structure for provisio
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProvisioConfig {
    /// Git delivery configuration
    pub git: GitConfig,
    /// Observability settings
    pub observability: ObservabilityConfig,
    /// Workflow engine settings
    pub orchestrator: OrchestratorConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GitConfig {
    /// Token for authenticated remotes (can be set via env var)
    pub token: Option<String>,
    /// Committer identity
    pub username: String,
    pub email: String,
    /// Resource category (or category group) -> repository clone URL
    pub repo_map: HashMap<String, String>,
    /// Fallback merge strategy when a category-specific one isn't provided
    pub default_merge_strategy: MergeStrategy,
    /// JSON mapping of resource category -> merge strategy, e.g.
    /// `{"k8s/namespace": "pull_request", "k8s/pvs": "direct"}`.
    /// Malformed input degrades to "no mapping" with a warning.
    pub merge_strategy_map_json: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level filter (overridden by RUST_LOG)
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable ones
    pub json_logs: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrchestratorConfig {
    /// Directory for durable workflow state checkpoints
    pub state_dir: String,
    /// Per-step retry and timeout budgets
    pub budgets: StepBudgets,
}

impl Default for ProvisioConfig {
    fn default() -> Self {
        Self {
            git: GitConfig {
                token: None, // Read from env at load time
                username: "provisio".to_string(),
                email: "provisio@localhost".to_string(),
                repo_map: HashMap::new(),
                default_merge_strategy: MergeStrategy::Direct,
                merge_strategy_map_json: None,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json_logs: false,
            },
            orchestrator: OrchestratorConfig {
                state_dir: ".provisio/state".to_string(),
                budgets: StepBudgets::default(),
            },
        }
    }
}

impl ProvisioConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration file (provisio.toml)
    /// 3. Environment variables (prefixed with PROVISIO_)
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&ProvisioConfig::default())?);

        if Path::new("provisio.toml").exists() {
            builder = builder.add_source(File::with_name("provisio"));
        }

        builder = builder.add_source(
            Environment::with_prefix("PROVISIO")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let mut provisio_config: ProvisioConfig = config.try_deserialize()?;

        // Token can come from the common env vars as well
        if provisio_config.git.token.is_none() {
            if let Ok(token) = std::env::var("PROVISIO_GIT_TOKEN") {
                provisio_config.git.token = Some(token);
            } else if let Ok(token) = std::env::var("GIT_TOKEN") {
                provisio_config.git.token = Some(token);
            }
        }

        Ok(provisio_config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }

    /// Parsed per-category merge-strategy map; malformed JSON degrades to an
    /// empty map rather than failing startup.
    pub fn merge_strategy_map(&self) -> MergeStrategyMap {
        match &self.git.merge_strategy_map_json {
            Some(raw) => MergeStrategyMap::from_json(raw),
            None => MergeStrategyMap::default(),
        }
    }

    pub fn merge_settings(&self) -> MergeSettings {
        MergeSettings {
            configured: self.merge_strategy_map(),
            default: self.git.default_merge_strategy,
        }
    }

    pub fn git_auth(&self) -> GitAuth {
        GitAuth {
            username: self.git.username.clone(),
            email: self.git.email.clone(),
            token: self.git.token.clone(),
        }
    }
}
