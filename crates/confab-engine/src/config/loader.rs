//! Configuration loader with layered merging.
//!
//! # Load order
//!
//! 1. Compiled defaults
//! 2. TOML file (`--config` path or `./confab.toml` when present)
//! 3. Environment variables (`CONFAB_*`)
//!
//! Each layer overrides the previous.

use super::{ConfabConfig, ConfigError};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Helper macro for numeric environment overrides.
macro_rules! parse_env_number {
    ($field:expr, $var:literal) => {
        if let Ok(raw) = std::env::var($var) {
            $field = raw
                .parse()
                .map_err(|_| ConfigError::invalid_env_var($var, "expected a number"))?;
        }
    };
}

/// Default project-local config file name.
pub const PROJECT_CONFIG_FILE: &str = "confab.toml";

/// Configuration loader with builder pattern.
///
/// # Example
///
/// ```no_run
/// use confab_engine::config::ConfigLoader;
///
/// let config = ConfigLoader::new()
///     .with_file("/etc/confab/config.toml")
///     .skip_env_vars() // deterministic tests
///     .load()?;
/// # Ok::<(), confab_engine::config::ConfigError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    skip_env: bool,
}

impl ConfigLoader {
    /// Creates a loader with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an explicit config file path.
    ///
    /// Without one, `./confab.toml` is used when it exists.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Skips environment variable overrides (deterministic tests).
    #[must_use]
    pub fn skip_env_vars(mut self) -> Self {
        self.skip_env = true;
        self
    }

    /// Loads and merges all layers.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::Io`] when an explicit file cannot be read
    /// - [`ConfigError::Parse`] on malformed TOML
    /// - [`ConfigError::InvalidEnvVar`] on unusable env values
    pub fn load(self) -> Result<ConfabConfig, ConfigError> {
        let mut config = ConfabConfig::default();

        match self.file {
            Some(path) => {
                config = load_file(&path)?;
                debug!(path = %path.display(), "loaded config file");
            }
            None => {
                let default_path = Path::new(PROJECT_CONFIG_FILE);
                if default_path.exists() {
                    config = load_file(default_path)?;
                    debug!("loaded ./{PROJECT_CONFIG_FILE}");
                }
            }
        }

        if !self.skip_env {
            apply_env(&mut config)?;
        }

        Ok(config)
    }
}

fn load_file(path: &Path) -> Result<ConfabConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    toml::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))
}

fn apply_env(config: &mut ConfabConfig) -> Result<(), ConfigError> {
    parse_env_number!(config.engine.min_barge_in_words, "CONFAB_MIN_BARGE_IN_WORDS");
    parse_env_number!(config.engine.barge_in_grace_ms, "CONFAB_BARGE_IN_GRACE_MS");
    parse_env_number!(config.engine.queue_warn_depth, "CONFAB_QUEUE_WARN_DEPTH");
    parse_env_number!(config.gateway.retry.max_attempts, "CONFAB_RETRY_MAX_ATTEMPTS");
    parse_env_number!(config.gateway.retry.base_ms, "CONFAB_RETRY_BASE_MS");

    if let Ok(dir) = std::env::var("CONFAB_CHECKPOINT_DIR") {
        if dir.is_empty() {
            return Err(ConfigError::invalid_env_var(
                "CONFAB_CHECKPOINT_DIR",
                "expected a path",
            ));
        }
        config.checkpoint.dir = PathBuf::from(dir);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("confab.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn defaults_without_file() {
        let config = ConfigLoader::new().skip_env_vars().load().unwrap();
        assert_eq!(config, ConfabConfig::default());
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
            [engine]
            min_barge_in_words = 3
            barge_in_grace_ms = 750

            [gateway.retry]
            base_ms = 500
            multiplier = 2.0
            max_delay_ms = 10000
            jitter_ms = 100
            max_attempts = 4

            [tools.charge_payment]
            timeout_ms = 20000
            cancel_on_interruption = false
            "#,
        );

        let config = ConfigLoader::new()
            .with_file(&path)
            .skip_env_vars()
            .load()
            .unwrap();

        assert_eq!(config.engine.min_barge_in_words, 3);
        assert_eq!(config.engine.barge_in_grace_ms, 750);
        assert_eq!(config.gateway.retry.max_attempts, 4);

        let tool = config.tool_settings("charge_payment").unwrap();
        assert_eq!(tool.timeout_ms, Some(20_000));
        assert_eq!(tool.cancel_on_interruption, Some(false));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
            [engine]
            min_barge_in_words = 5
            "#,
        );

        let config = ConfigLoader::new()
            .with_file(&path)
            .skip_env_vars()
            .load()
            .unwrap();

        assert_eq!(config.engine.min_barge_in_words, 5);
        assert_eq!(config.engine.barge_in_grace_ms, 1_000);
        assert_eq!(config.gateway.retry.max_attempts, 3);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = ConfigLoader::new()
            .with_file("/definitely/not/here.toml")
            .skip_env_vars()
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_config(&dir, "engine = [not toml");
        let err = ConfigLoader::new()
            .with_file(&path)
            .skip_env_vars()
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
