//! Callable targets
//!
//! A target is one of four binding kinds behind a single erased
//! [`Invoker`] interface. Free and static functions share a representation;
//! instance methods either reference their instance weakly or, when the host
//! opts into shared ownership, keep it alive.

use std::{
  fmt,
  sync::{Arc, Weak},
};

use dyn_clone::DynClone;

use crate::error::{DelegateError, Result};

/// How a target was bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
  /// A free or static function
  Free,
  /// A method on an instance the delegate does not own
  Member,
  /// A method on an instance the delegate shares ownership of
  SharedMember,
  /// A closure
  Function,
}

impl BindingKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      BindingKind::Free => "free",
      BindingKind::Member => "member",
      BindingKind::SharedMember => "shared_member",
      BindingKind::Function => "function",
    }
  }
}

impl fmt::Display for BindingKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Structural identity of a target
///
/// Two targets are equal iff they have the same binding kind, the same
/// function and the same bound instance. Addresses are only compared, never
/// dereferenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId {
  pub kind: BindingKind,
  pub function: usize,
  pub instance: usize,
}

/// Erased invocation contract shared by every binding kind
pub trait Invoker<A, R>: Send + Sync + DynClone {
  /// Call the target on the current thread
  fn call(&self, args: A) -> Result<R>;

  fn identity(&self) -> TargetId;

  /// Returns false once a referenced instance has been released
  fn is_alive(&self) -> bool {
    true
  }
}

dyn_clone::clone_trait_object!(<A, R> Invoker<A, R>);

fn instance_addr<T: ?Sized>(ptr: *const T) -> usize {
  ptr as *const () as usize
}

// ============================================================================
// Free / static functions
// ============================================================================

pub(crate) struct FreeFn<A, R> {
  func: fn(A) -> R,
}

impl<A, R> FreeFn<A, R> {
  pub(crate) fn new(func: fn(A) -> R) -> Self {
    Self { func }
  }
}

impl<A, R> Clone for FreeFn<A, R> {
  fn clone(&self) -> Self {
    Self { func: self.func }
  }
}

impl<A, R> Invoker<A, R> for FreeFn<A, R> {
  fn call(&self, args: A) -> Result<R> {
    Ok((self.func)(args))
  }

  fn identity(&self) -> TargetId {
    TargetId {
      kind: BindingKind::Free,
      function: self.func as usize,
      instance: 0,
    }
  }
}

// ============================================================================
// Instance methods
// ============================================================================

pub(crate) struct Method<T, A, R> {
  object: Weak<T>,
  method: fn(&T, A) -> R,
}

impl<T, A, R> Method<T, A, R> {
  pub(crate) fn new(object: &Arc<T>, method: fn(&T, A) -> R) -> Self {
    Self {
      object: Arc::downgrade(object),
      method,
    }
  }
}

impl<T, A, R> Clone for Method<T, A, R> {
  fn clone(&self) -> Self {
    Self {
      object: self.object.clone(),
      method: self.method,
    }
  }
}

impl<T, A, R> Invoker<A, R> for Method<T, A, R>
where
  T: Send + Sync,
{
  fn call(&self, args: A) -> Result<R> {
    let object = self.object.upgrade().ok_or(DelegateError::InvalidTarget)?;
    Ok((self.method)(&object, args))
  }

  fn identity(&self) -> TargetId {
    TargetId {
      kind: BindingKind::Member,
      function: self.method as usize,
      instance: instance_addr(self.object.as_ptr()),
    }
  }

  fn is_alive(&self) -> bool {
    self.object.strong_count() > 0
  }
}

pub(crate) struct SharedMethod<T, A, R> {
  object: Arc<T>,
  method: fn(&T, A) -> R,
}

impl<T, A, R> SharedMethod<T, A, R> {
  pub(crate) fn new(object: Arc<T>, method: fn(&T, A) -> R) -> Self {
    Self { object, method }
  }
}

impl<T, A, R> Clone for SharedMethod<T, A, R> {
  fn clone(&self) -> Self {
    Self {
      object: self.object.clone(),
      method: self.method,
    }
  }
}

impl<T, A, R> Invoker<A, R> for SharedMethod<T, A, R>
where
  T: Send + Sync,
{
  fn call(&self, args: A) -> Result<R> {
    Ok((self.method)(&self.object, args))
  }

  fn identity(&self) -> TargetId {
    TargetId {
      kind: BindingKind::SharedMember,
      function: self.method as usize,
      instance: instance_addr(Arc::as_ptr(&self.object)),
    }
  }
}

// ============================================================================
// Closures
// ============================================================================

pub(crate) struct Closure<A, R> {
  func: Arc<dyn Fn(A) -> R + Send + Sync>,
}

impl<A, R> Closure<A, R> {
  pub(crate) fn new(func: impl Fn(A) -> R + Send + Sync + 'static) -> Self {
    Self { func: Arc::new(func) }
  }
}

impl<A, R> Clone for Closure<A, R> {
  fn clone(&self) -> Self {
    Self {
      func: self.func.clone(),
    }
  }
}

impl<A, R> Invoker<A, R> for Closure<A, R> {
  fn call(&self, args: A) -> Result<R> {
    Ok((self.func)(args))
  }

  fn identity(&self) -> TargetId {
    TargetId {
      kind: BindingKind::Function,
      function: instance_addr(Arc::as_ptr(&self.func)),
      instance: 0,
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicI32, Ordering};

  use super::*;

  struct Counter {
    total: AtomicI32,
  }

  impl Counter {
    fn add(&self, n: i32) -> i32 {
      self.total.fetch_add(n, Ordering::SeqCst) + n
    }

    fn sub(&self, n: i32) -> i32 {
      self.total.fetch_sub(n, Ordering::SeqCst) - n
    }
  }

  fn double(n: i32) -> i32 {
    n * 2
  }

  fn triple(n: i32) -> i32 {
    n * 3
  }

  #[test]
  fn test_free_identity() {
    let a = FreeFn::new(double as fn(i32) -> i32);
    let b = FreeFn::new(double as fn(i32) -> i32);
    let c = FreeFn::new(triple as fn(i32) -> i32);
    assert_eq!(a.identity(), b.identity());
    assert_ne!(a.identity(), c.identity());
    assert_eq!(a.call(4).unwrap(), 8);
  }

  #[test]
  fn test_member_identity_includes_instance() {
    let first = Arc::new(Counter { total: AtomicI32::new(0) });
    let second = Arc::new(Counter { total: AtomicI32::new(0) });

    let a = Method::new(&first, Counter::add);
    let b = Method::new(&first, Counter::add);
    let c = Method::new(&second, Counter::add);
    let d = Method::new(&first, Counter::sub);

    assert_eq!(a.identity(), b.identity());
    assert_ne!(a.identity(), c.identity());
    assert_ne!(a.identity(), d.identity());
  }

  #[test]
  fn test_member_and_shared_member_differ() {
    let counter = Arc::new(Counter { total: AtomicI32::new(0) });
    let weak = Method::new(&counter, Counter::add);
    let shared = SharedMethod::new(counter.clone(), Counter::add);
    assert_ne!(weak.identity(), shared.identity());
    assert_eq!(weak.identity().instance, shared.identity().instance);
  }

  #[test]
  fn test_released_instance_is_invalid_target() {
    let counter = Arc::new(Counter { total: AtomicI32::new(0) });
    let method = Method::new(&counter, Counter::add);
    assert_eq!(method.call(5).unwrap(), 5);
    assert!(method.is_alive());

    drop(counter);
    assert!(!method.is_alive());
    assert!(matches!(method.call(5), Err(DelegateError::InvalidTarget)));
  }

  #[test]
  fn test_shared_member_keeps_instance_alive() {
    let counter = Arc::new(Counter { total: AtomicI32::new(10) });
    let method = SharedMethod::new(counter.clone(), Counter::sub);
    drop(counter);
    assert_eq!(method.call(4).unwrap(), 6);
  }

  #[test]
  fn test_closure_clones_share_identity() {
    let offset = 100;
    let a = Closure::new(move |n: i32| n + offset);
    let b = a.clone();
    let c = Closure::new(move |n: i32| n + offset);
    assert_eq!(a.identity(), b.identity());
    assert_ne!(a.identity(), c.identity());
    assert_eq!(b.call(1).unwrap(), 101);
  }

  #[test]
  fn test_boxed_invoker_clone() {
    let boxed: Box<dyn Invoker<i32, i32>> = Box::new(FreeFn::new(double as fn(i32) -> i32));
    let cloned = dyn_clone::clone_box(&*boxed);
    assert_eq!(boxed.identity(), cloned.identity());
    assert_eq!(cloned.call(21).unwrap(), 42);
  }
}
