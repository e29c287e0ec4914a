//! Worker configuration
//!
//! ```toml
//! name = "ui"
//! shutdown = "discard"
//! wait_timeout_ms = 500
//! ```

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::WorkerError;

/// What happens to queued messages when a worker stops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownPolicy {
  /// Execute everything queued before the shutdown request
  #[default]
  Drain,
  /// Discard everything not yet started
  Discard,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
  /// Thread name, also used in logs
  pub name: String,

  /// Policy applied by `shutdown` and on drop
  pub shutdown: ShutdownPolicy,

  /// Bound for blocking delegates bound through the worker; unset waits forever
  pub wait_timeout_ms: Option<u64>,
}

impl Default for WorkerConfig {
  fn default() -> Self {
    Self {
      name: "worker".to_string(),
      shutdown: ShutdownPolicy::Drain,
      wait_timeout_ms: None,
    }
  }
}

impl WorkerConfig {
  pub fn named(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      ..Self::default()
    }
  }

  pub fn wait_timeout(&self) -> Option<Duration> {
    self.wait_timeout_ms.map(Duration::from_millis)
  }

  pub fn from_toml_str(content: &str) -> Result<Self, WorkerError> {
    Ok(toml::from_str(content)?)
  }

  pub fn load(path: &Path) -> Result<Self, WorkerError> {
    let content = std::fs::read_to_string(path)?;
    Self::from_toml_str(&content)
  }

  /// Load from `path`, falling back to defaults if the file is missing or invalid
  pub fn load_or_default(path: &Path) -> Self {
    match Self::load(path) {
      Ok(config) => config,
      Err(WorkerError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
      Err(e) => {
        warn!(path = %path.display(), error = %e, "Failed to load worker config, using defaults");
        Self::default()
      }
    }
  }
}
