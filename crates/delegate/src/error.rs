use std::{collections::TryReserveError, time::Duration};

use thiserror::Error;

/// Result type for delegate operations
pub type Result<T> = std::result::Result<T, DelegateError>;

/// Errors raised while binding, dispatching or waiting on a delegate call.
///
/// None of these are fatal: every variant is reported to the call site that
/// attempted the invocation and the caller is free to carry on.
#[derive(Debug, Error)]
pub enum DelegateError {
  /// The delegate has no bound target
  #[error("Delegate is not bound to a target")]
  InvalidOperation,

  /// The instance a method delegate was bound to has been released
  #[error("Delegate target instance has been released")]
  InvalidTarget,

  /// Argument capture could not allocate; nothing was left captured
  #[error("Failed to allocate call arguments: {0}")]
  AllocationFailure(#[from] TryReserveError),

  /// A blocking call was not completed within the caller's bound
  #[error("Timed out after {0:?} waiting for the target thread")]
  Timeout(Duration),

  /// The message was dropped before it executed
  #[error("Message was discarded before execution")]
  Discarded,

  /// A captured argument did not have the type the target expects
  #[error("Argument {position} is not a `{expected}`")]
  ArgumentType { position: usize, expected: &'static str },
}

impl DelegateError {
  /// Returns true if the caller gave up waiting
  pub fn is_timeout(&self) -> bool {
    matches!(self, Self::Timeout(_))
  }

  /// Returns true if the call was dropped at its thread target
  pub fn is_discarded(&self) -> bool {
    matches!(self, Self::Discarded)
  }
}

/// Error returned by a multicast pass in which at least one subscriber failed
#[derive(Debug, Error)]
#[error("{} of {} subscribers failed", failures.len(), failures.len() + invoked)]
pub struct MulticastError {
  /// Number of subscribers that were invoked successfully
  pub invoked: usize,
  /// Errors from the failing subscribers, in subscription order
  pub failures: Vec<DelegateError>,
}
