//! Configuration types.

use crate::interrupt::InterruptSettings;
use confab_gateway::{GatewayConfig, ToolSpec};
use confab_types::ErrorCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Engine-level tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Minimum words in a speech burst before it may barge in.
    pub min_barge_in_words: u32,
    /// Grace window after a suppressed burst, in milliseconds.
    pub barge_in_grace_ms: u64,
    /// Queue depth above which enqueues are warn-logged.
    pub queue_warn_depth: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            min_barge_in_words: 2,
            barge_in_grace_ms: 1_000,
            queue_warn_depth: 1_024,
        }
    }
}

impl EngineSettings {
    /// Projects the interruption controller's settings.
    #[must_use]
    pub fn interrupt_settings(&self) -> InterruptSettings {
        InterruptSettings {
            min_barge_in_words: self.min_barge_in_words,
            barge_in_grace_ms: self.barge_in_grace_ms,
        }
    }
}

/// Checkpoint storage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointSettings {
    /// Directory for the local file store.
    pub dir: PathBuf,
}

impl Default for CheckpointSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("~/.confab/checkpoints"),
        }
    }
}

/// Per-tool overrides applied on top of the registered spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ToolSettings {
    /// Deadline override in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Whether interruption cancels in-flight execution.
    pub cancel_on_interruption: Option<bool>,
}

impl ToolSettings {
    /// Applies the overrides to a spec.
    #[must_use]
    pub fn apply(&self, mut spec: ToolSpec) -> ToolSpec {
        if let Some(ms) = self.timeout_ms {
            spec = spec.timeout_override(Duration::from_millis(ms));
        }
        if let Some(cancel) = self.cancel_on_interruption {
            spec = spec.cancel_on_interruption(cancel);
        }
        spec
    }
}

/// The full configuration tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConfabConfig {
    /// Engine-level tuning.
    pub engine: EngineSettings,
    /// Checkpoint storage.
    pub checkpoint: CheckpointSettings,
    /// Gateway retry/timeout/rate-limit knobs.
    pub gateway: GatewayConfig,
    /// Per-tool overrides, keyed by tool name.
    pub tools: HashMap<String, ToolSettings>,
}

impl ConfabConfig {
    /// Looks up overrides for a tool.
    #[must_use]
    pub fn tool_settings(&self, name: &str) -> Option<&ToolSettings> {
        self.tools.get(name)
    }
}

/// Configuration failure.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// A config file could not be read.
    #[error("cannot read config file {path}: {detail}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// OS error.
        detail: String,
    },

    /// TOML parse failure.
    #[error("config parse error: {0}")]
    Parse(String),

    /// An environment variable held an unusable value.
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar {
        /// Variable name.
        var: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl ConfigError {
    /// Creates an invalid-env-var error.
    pub fn invalid_env_var(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEnvVar {
            var: var.into(),
            reason: reason.into(),
        }
    }
}

impl ErrorCode for ConfigError {
    fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "CONFIG_IO",
            Self::Parse(_) => "CONFIG_PARSE",
            Self::InvalidEnvVar { .. } => "CONFIG_INVALID_ENV_VAR",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}
