//! Counting wait primitive used by blocking invocations

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Wait forever when passed as a timeout
pub const WAIT_INFINITE: Option<Duration> = None;

/// Outcome of [`Semaphore::wait`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
  Signaled,
  TimedOut,
}

/// Wait primitive with bounded and unbounded waits
///
/// A signal that arrives before the wait is not lost. Signals do not
/// accumulate: any number of signals without an intervening wait leave one
/// pending signal, which the next wait consumes.
#[derive(Debug, Default)]
pub struct Semaphore {
  count: Mutex<usize>,
  cond: Condvar,
}

impl Semaphore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Leave a pending signal, if there is none, and wake a single waiter
  pub fn signal(&self) {
    let mut count = self.count.lock();
    *count = 1;
    self.cond.notify_one();
  }

  /// Block until a signal is available or the timeout elapses
  ///
  /// `None` waits without bound.
  pub fn wait(&self, timeout: Option<Duration>) -> WaitStatus {
    let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
    let mut count = self.count.lock();

    while *count == 0 {
      match deadline {
        Some(deadline) => {
          if self.cond.wait_until(&mut count, deadline).timed_out() && *count == 0 {
            return WaitStatus::TimedOut;
          }
        }
        None => self.cond.wait(&mut count),
      }
    }

    *count -= 1;
    WaitStatus::Signaled
  }

  /// Consume a signal if one is available, without blocking
  pub fn try_wait(&self) -> bool {
    let mut count = self.count.lock();
    if *count == 0 {
      return false;
    }
    *count -= 1;
    true
  }

  /// Number of signals not yet consumed, zero or one
  pub fn available(&self) -> usize {
    *self.count.lock()
  }
}
