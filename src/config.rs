//! Harness configuration parsing and validation.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::driver::DrainPolicy;
use crate::{AppError, Result};

/// Client identity announced in the `initialize` request.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ClientInfoConfig {
    /// Client name sent as `clientInfo.name`.
    #[serde(default = "default_client_name")]
    pub name: String,
    /// Client version sent as `clientInfo.version`.
    #[serde(default = "default_client_version")]
    pub version: String,
}

impl Default for ClientInfoConfig {
    fn default() -> Self {
        Self {
            name: default_client_name(),
            version: default_client_version(),
        }
    }
}

fn default_client_name() -> String {
    "test-client".into()
}

fn default_client_version() -> String {
    "1.0.0".into()
}

/// Read and drain timing (milliseconds unless noted).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Bound on the single read after `initialize` and `session/new`.
    #[serde(default = "default_handshake_read_ms")]
    pub handshake_read_ms: u64,
    /// Bound on each read inside the drain loop.
    #[serde(default = "default_per_read_ms")]
    pub per_read_ms: u64,
    /// Pause between consecutive empty drain reads.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Consecutive empty reads after which the drain gives up.
    #[serde(default = "default_max_empty_reads")]
    pub max_empty_reads: u32,
    /// Wall-clock bound on the whole drain; 0 disables it.
    #[serde(default)]
    pub drain_deadline_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            handshake_read_ms: default_handshake_read_ms(),
            per_read_ms: default_per_read_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            max_empty_reads: default_max_empty_reads(),
            drain_deadline_ms: 0,
        }
    }
}

fn default_handshake_read_ms() -> u64 {
    5000
}

fn default_per_read_ms() -> u64 {
    1000
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_max_empty_reads() -> u32 {
    30
}

fn default_agent_command() -> String {
    "grok".into()
}

fn default_agent_args() -> Vec<String> {
    vec!["acp".into(), "stdio".into()]
}

fn default_prompt() -> String {
    "Hello! Please respond with exactly: Hello World!".into()
}

fn default_startup_delay_ms() -> u64 {
    500
}

fn default_shutdown_grace_ms() -> u64 {
    2000
}

/// Harness configuration, optionally parsed from a TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct HarnessConfig {
    /// Agent executable launched as the protocol peer.
    #[serde(default = "default_agent_command")]
    pub agent_command: String,
    /// Fixed arguments selecting the agent's stdio protocol mode.
    #[serde(default = "default_agent_args")]
    pub agent_args: Vec<String>,
    /// Text of the single prompt sent to the agent.
    #[serde(default = "default_prompt")]
    pub prompt: String,
    /// Pause after spawning before the first request is written.
    #[serde(default = "default_startup_delay_ms")]
    pub startup_delay_ms: u64,
    /// How long to wait for the agent to exit after its stdin is closed.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    /// Identity announced during `initialize`.
    #[serde(default)]
    pub client: ClientInfoConfig,
    /// Read and drain timing.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            agent_command: default_agent_command(),
            agent_args: default_agent_args(),
            prompt: default_prompt(),
            startup_delay_ms: default_startup_delay_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            client: ClientInfoConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read, contains
    /// invalid TOML, or fails validation.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants every run depends on.
    ///
    /// Called after file parsing and again after CLI overrides are applied.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.agent_command.trim().is_empty() {
            return Err(AppError::Config("agent_command must not be empty".into()));
        }

        if self.prompt.trim().is_empty() {
            return Err(AppError::Config("prompt must not be empty".into()));
        }

        if self.timeouts.handshake_read_ms == 0 {
            return Err(AppError::Config(
                "timeouts.handshake_read_ms must be greater than zero".into(),
            ));
        }

        if self.timeouts.per_read_ms == 0 {
            return Err(AppError::Config(
                "timeouts.per_read_ms must be greater than zero".into(),
            ));
        }

        if self.timeouts.max_empty_reads == 0 {
            return Err(AppError::Config(
                "timeouts.max_empty_reads must be greater than zero".into(),
            ));
        }

        Ok(())
    }

    /// Bound on the single read that follows each handshake request.
    #[must_use]
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.handshake_read_ms)
    }

    /// Pause between spawning the agent and sending `initialize`.
    #[must_use]
    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    /// Grace period granted to the agent after its stdin is closed.
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Drain policy derived from the `[timeouts]` table.
    #[must_use]
    pub fn drain_policy(&self) -> DrainPolicy {
        let deadline = match self.timeouts.drain_deadline_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        DrainPolicy {
            per_read_timeout: Duration::from_millis(self.timeouts.per_read_ms),
            poll_interval: Duration::from_millis(self.timeouts.poll_interval_ms),
            max_consecutive_empty_reads: self.timeouts.max_empty_reads,
            deadline,
        }
    }
}
