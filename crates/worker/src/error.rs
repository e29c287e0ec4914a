use thiserror::Error;

/// Errors from starting or configuring a worker thread
#[derive(Debug, Error)]
pub enum WorkerError {
  #[error("Failed to spawn worker thread: {0}")]
  Spawn(#[source] std::io::Error),

  #[error("Worker thread is already running")]
  AlreadyRunning,

  #[error("Previous worker thread is still stopping")]
  Stopping,

  #[error("Invalid worker config: {0}")]
  Config(#[from] toml::de::Error),

  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
}
