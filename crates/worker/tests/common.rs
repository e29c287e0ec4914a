//! Common test utilities for worker integration tests

use std::sync::{
  Arc,
  atomic::{AtomicUsize, Ordering},
};

use tracing_subscriber::EnvFilter;

/// Install a test-writer subscriber; safe to call from every test
#[allow(dead_code)]
pub fn init_tracing() {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
    .with_test_writer()
    .try_init();
}

/// Counts how many instances were created and how many were dropped
#[derive(Debug, Clone, Default)]
pub struct DropLedger {
  created: Arc<AtomicUsize>,
  dropped: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl DropLedger {
  pub fn track(&self, value: u64) -> Tracked {
    self.created.fetch_add(1, Ordering::SeqCst);
    Tracked {
      value,
      dropped: self.dropped.clone(),
    }
  }

  pub fn created(&self) -> usize {
    self.created.load(Ordering::SeqCst)
  }

  pub fn dropped(&self) -> usize {
    self.dropped.load(Ordering::SeqCst)
  }

  pub fn live(&self) -> usize {
    self.created() - self.dropped()
  }
}

/// Argument type whose drops are recorded in a [`DropLedger`]
#[derive(Debug)]
pub struct Tracked {
  pub value: u64,
  dropped: Arc<AtomicUsize>,
}

impl Drop for Tracked {
  fn drop(&mut self) {
    self.dropped.fetch_add(1, Ordering::SeqCst);
  }
}

delegate::heap_arg!(Tracked);
