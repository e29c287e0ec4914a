//! Single-slot delegate container

use crate::{
  args::Marshal,
  delegate::Delegate,
  error::{DelegateError, Result},
};

/// Holds at most one delegate; setting a new one replaces the old
pub struct UnicastDelegate<A, R> {
  delegate: Option<Delegate<A, R>>,
}

impl<A, R> UnicastDelegate<A, R> {
  pub fn new() -> Self {
    Self { delegate: None }
  }

  /// Replace the held delegate, returning the previous one
  pub fn set(&mut self, delegate: Delegate<A, R>) -> Option<Delegate<A, R>> {
    self.delegate.replace(delegate)
  }

  pub fn clear(&mut self) -> Option<Delegate<A, R>> {
    self.delegate.take()
  }

  pub fn get(&self) -> Option<&Delegate<A, R>> {
    self.delegate.as_ref()
  }

  pub fn is_empty(&self) -> bool {
    self.delegate.is_none()
  }
}

impl<A, R> UnicastDelegate<A, R>
where
  A: Marshal,
  R: Default + Send + 'static,
{
  /// Invoke the held delegate in its own mode
  pub fn invoke(&self, args: A) -> Result<R> {
    self
      .delegate
      .as_ref()
      .ok_or(DelegateError::InvalidOperation)?
      .invoke(args)
  }
}

impl<A, R> Default for UnicastDelegate<A, R> {
  fn default() -> Self {
    Self::new()
  }
}

impl<A, R> Clone for UnicastDelegate<A, R> {
  fn clone(&self) -> Self {
    Self {
      delegate: self.delegate.clone(),
    }
  }
}

impl<A, R> std::fmt::Debug for UnicastDelegate<A, R> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("UnicastDelegate").field("delegate", &self.delegate).finish()
  }
}
