use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::lifecycle::{IllegalTransitionRouting, OrchestratorSettings, RetryPolicy, StateName};

/// Main configuration structure for rider-state
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RiderStateConfig {
    /// Backoff and attempt ceilings for gateway calls
    pub retry: RetryConfig,
    /// Workflow behaviour
    pub workflow: WorkflowConfig,
    /// Where the local gateway adapters keep their data
    pub storage: StorageConfig,
    /// Logging and metrics
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay before the second attempt, in milliseconds
    pub interval_ms: u64,
    /// Multiplier applied to the delay after each failed attempt
    pub backoff_rate: f64,
    /// Attempt ceiling for reading the current state
    pub fetch_max_attempts: u32,
    /// Attempt ceiling for every other stage
    pub max_attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Host-level deadline for one run (0 disables it)
    pub timeout_seconds: u64,
    /// `dead_letter` or `reject`
    pub illegal_transition_routing: IllegalTransitionRouting,
    /// State assumed for riders with no stored record; empty dead-letters them
    pub unknown_entity_state: String,
    /// Concurrent workflow runs in batch mode
    pub max_concurrency: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON document holding every rider record
    pub state_file: String,
    /// Append-only JSONL dead-letter log
    pub dead_letter_file: String,
    /// Append-only JSONL change event log
    pub events_file: String,
    /// SQLite URL; replaces `state_file` when the `database` feature is enabled
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level / EnvFilter directive
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable ones
    pub json_logs: bool,
    /// Log workflow counters when a command finishes
    pub metrics_enabled: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            backoff_rate: 1.5,
            fetch_max_attempts: 3,
            max_attempts: 5,
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 300, // 5 minutes
            illegal_transition_routing: IllegalTransitionRouting::DeadLetter,
            unknown_entity_state: StateName::NotWorking.as_str().to_string(),
            max_concurrency: 16,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_file: ".rider-state/riders.json".to_string(),
            dead_letter_file: ".rider-state/dead-letters.jsonl".to_string(),
            events_file: ".rider-state/events.jsonl".to_string(),
            database_url: None,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
        }
    }
}

impl Default for RiderStateConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            workflow: WorkflowConfig::default(),
            storage: StorageConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl RiderStateConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration file (rider-state.toml, or `path` when given)
    /// 3. Environment variables (prefixed with RIDER_STATE, `__` between levels)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        match path {
            Some(path) => {
                builder = builder.add_source(File::from(path));
            }
            None => {
                if Path::new("rider-state.toml").exists() {
                    builder = builder.add_source(File::with_name("rider-state"));
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("RIDER_STATE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let rider_state_config: RiderStateConfig = config.try_deserialize()?;
        rider_state_config.validate()?;
        Ok(rider_state_config)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.retry.backoff_rate >= 1.0,
            "retry.backoff_rate must be at least 1.0 (got {})",
            self.retry.backoff_rate
        );
        anyhow::ensure!(
            self.workflow.max_concurrency > 0,
            "workflow.max_concurrency must be positive"
        );
        self.unknown_entity_state()?;
        Ok(())
    }

    fn unknown_entity_state(&self) -> Result<Option<StateName>> {
        let raw = self.workflow.unknown_entity_state.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        let state = raw
            .parse::<StateName>()
            .with_context(|| "workflow.unknown_entity_state")?;
        Ok(Some(state))
    }

    /// Orchestrator settings derived from this configuration
    pub fn orchestrator_settings(&self) -> Result<OrchestratorSettings> {
        let interval = Duration::from_millis(self.retry.interval_ms);
        let deadline = match self.workflow.timeout_seconds {
            0 => None,
            seconds => Some(Duration::from_secs(seconds)),
        };

        Ok(OrchestratorSettings {
            fetch_retry: RetryPolicy::new(
                self.retry.fetch_max_attempts,
                interval,
                self.retry.backoff_rate,
            ),
            stage_retry: RetryPolicy::new(self.retry.max_attempts, interval, self.retry.backoff_rate),
            deadline,
            illegal_transition_routing: self.workflow.illegal_transition_routing,
            unknown_entity_state: self.unknown_entity_state()?,
        })
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
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<RiderStateConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        // Load .env file first
        let _ = RiderStateConfig::load_env_file();
        RiderStateConfig::load(None)
    });

/// Get the global configuration
pub fn config() -> Result<&'static RiderStateConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}
