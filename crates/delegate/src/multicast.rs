//! Ordered delegate registries
//!
//! [`MulticastDelegate`] is a plain list owned by one thread.
//! [`MulticastDelegateSafe`] wraps the same list in a lock so subscribers can
//! be added and removed from any thread while others invoke it.

use parking_lot::Mutex;
use tracing::warn;

use crate::{
  args::Marshal,
  delegate::Delegate,
  error::{DelegateError, MulticastError},
};

// ============================================================================
// MulticastDelegate
// ============================================================================

/// Ordered list of delegates invoked together
///
/// Duplicates are allowed and are invoked once per occurrence.
pub struct MulticastDelegate<A, R> {
  delegates: Vec<Delegate<A, R>>,
}

impl<A, R> MulticastDelegate<A, R> {
  pub fn new() -> Self {
    Self { delegates: Vec::new() }
  }

  /// Append a delegate to the end of the invocation order
  pub fn add(&mut self, delegate: Delegate<A, R>) {
    self.delegates.push(delegate);
  }

  /// Remove the first delegate equal to `delegate`
  ///
  /// Returns false if no entry matched.
  pub fn remove(&mut self, delegate: &Delegate<A, R>) -> bool {
    match self.delegates.iter().position(|d| d == delegate) {
      Some(index) => {
        self.delegates.remove(index);
        true
      }
      None => false,
    }
  }

  pub fn clear(&mut self) {
    self.delegates.clear();
  }

  pub fn len(&self) -> usize {
    self.delegates.len()
  }

  pub fn is_empty(&self) -> bool {
    self.delegates.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Delegate<A, R>> {
    self.delegates.iter()
  }
}

impl<A, R> MulticastDelegate<A, R>
where
  A: Marshal + Clone,
  R: Default + Send + 'static,
{
  /// Invoke every delegate in insertion order, each in its own mode
  ///
  /// Return values are dropped. A failing subscriber does not stop the pass;
  /// the failures are collected into the error. Returns the number of
  /// delegates invoked.
  pub fn invoke(&self, args: A) -> Result<usize, MulticastError> {
    let mut invoked = 0;
    let mut failures: Vec<DelegateError> = Vec::new();

    for delegate in &self.delegates {
      match delegate.invoke(args.clone()) {
        Ok(_) => invoked += 1,
        Err(e) => {
          warn!(error = %e, binding = ?delegate.binding(), "Multicast subscriber failed");
          failures.push(e);
        }
      }
    }

    if failures.is_empty() {
      Ok(invoked)
    } else {
      Err(MulticastError { invoked, failures })
    }
  }
}

impl<A, R> Default for MulticastDelegate<A, R> {
  fn default() -> Self {
    Self::new()
  }
}

impl<A, R> Clone for MulticastDelegate<A, R> {
  fn clone(&self) -> Self {
    Self {
      delegates: self.delegates.clone(),
    }
  }
}

impl<A, R> std::fmt::Debug for MulticastDelegate<A, R> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_list().entries(&self.delegates).finish()
  }
}

impl<A, R> FromIterator<Delegate<A, R>> for MulticastDelegate<A, R> {
  fn from_iter<I: IntoIterator<Item = Delegate<A, R>>>(iter: I) -> Self {
    Self {
      delegates: iter.into_iter().collect(),
    }
  }
}

impl<A, R> Extend<Delegate<A, R>> for MulticastDelegate<A, R> {
  fn extend<I: IntoIterator<Item = Delegate<A, R>>>(&mut self, iter: I) {
    self.delegates.extend(iter);
  }
}

// ============================================================================
// MulticastDelegateSafe
// ============================================================================

/// A [`MulticastDelegate`] that can be shared between threads
///
/// Every operation holds the internal lock for its whole duration, including
/// an invoke pass, so no subscriber is added or removed mid-pass. A
/// synchronous subscriber must not call back into the same registry: the
/// lock is not reentrant and the call would deadlock.
pub struct MulticastDelegateSafe<A, R> {
  inner: Mutex<MulticastDelegate<A, R>>,
}

impl<A, R> MulticastDelegateSafe<A, R> {
  pub fn new() -> Self {
    Self {
      inner: Mutex::new(MulticastDelegate::new()),
    }
  }

  pub fn add(&self, delegate: Delegate<A, R>) {
    self.inner.lock().add(delegate);
  }

  /// Remove the first delegate equal to `delegate`
  pub fn remove(&self, delegate: &Delegate<A, R>) -> bool {
    self.inner.lock().remove(delegate)
  }

  pub fn clear(&self) {
    self.inner.lock().clear();
  }

  pub fn len(&self) -> usize {
    self.inner.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.inner.lock().is_empty()
  }

  /// Copy of the current subscriber list
  pub fn snapshot(&self) -> MulticastDelegate<A, R> {
    self.inner.lock().clone()
  }
}

impl<A, R> MulticastDelegateSafe<A, R>
where
  A: Marshal + Clone,
  R: Default + Send + 'static,
{
  /// Invoke every delegate under the lock
  pub fn invoke(&self, args: A) -> Result<usize, MulticastError> {
    self.inner.lock().invoke(args)
  }
}

impl<A, R> Default for MulticastDelegateSafe<A, R> {
  fn default() -> Self {
    Self::new()
  }
}

impl<A, R> std::fmt::Debug for MulticastDelegateSafe<A, R> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("MulticastDelegateSafe")
      .field("len", &self.len())
      .finish()
  }
}
