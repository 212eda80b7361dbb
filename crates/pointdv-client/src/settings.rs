//! Client configuration: an optional TOML file plus `POINTDV_*` environment
//! variables.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use pointdv_session::{SessionConfig, ToggleStrategy};
use serde::Deserialize;

/// Runtime client configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
  pub base_url:             String,
  /// Where the credential slot lives. A leading `~/` is expanded.
  pub store_path:           PathBuf,
  pub poll_interval_ms:     u64,
  pub toggle_strategy:      ToggleStrategy,
  pub session_max_age_days: i64,
}

impl Default for ClientConfig {
  fn default() -> Self {
    Self {
      base_url:             "http://localhost:3000".to_string(),
      store_path:           PathBuf::from("~/.local/share/pointdv/session.db"),
      poll_interval_ms:     5_000,
      toggle_strategy:      ToggleStrategy::default(),
      session_max_age_days: 7,
    }
  }
}

impl ClientConfig {
  /// Load from `file` (if it exists) and the environment, environment
  /// winning.
  pub fn load(file: Option<&Path>) -> Result<Self, config::ConfigError> {
    let mut builder = config::Config::builder();
    if let Some(path) = file {
      builder = builder.add_source(config::File::from(path.to_path_buf()).required(false));
    }
    Self::from_builder(builder.add_source(config::Environment::with_prefix("POINTDV")))
  }

  fn from_builder(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
  ) -> Result<Self, config::ConfigError> {
    let config: Self = builder.build()?.try_deserialize()?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<(), config::ConfigError> {
    if self.poll_interval_ms == 0 {
      return Err(config::ConfigError::Message("poll_interval_ms must be at least 1".into()));
    }
    if self.session_max_age_days <= 0 {
      return Err(config::ConfigError::Message("session_max_age_days must be positive".into()));
    }
    Ok(())
  }

  pub fn poll_interval(&self) -> Duration { Duration::from_millis(self.poll_interval_ms) }

  pub fn store_path(&self) -> PathBuf { expand_tilde(&self.store_path) }

  pub fn session_config(&self) -> SessionConfig {
    SessionConfig {
      toggle_strategy: self.toggle_strategy,
      session_max_age: chrono::Duration::days(self.session_max_age_days),
    }
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
