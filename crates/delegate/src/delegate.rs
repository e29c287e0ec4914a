//! The delegate value type
//!
//! A [`Delegate`] pairs an optional callable target with an [`InvokeMode`].
//! The mode decides what `invoke` does, so callers use the same call whether
//! the target runs inline, later on another thread, or on another thread
//! while the caller waits:
//!
//! ```text
//! Sync       caller ──call──────────────────────────────> target
//! Async      caller ──capture──> Message ──dispatch──> [queue] ──> target
//!               └─ returns R::default() immediately
//! AsyncWait  caller ──capture──> Message ──dispatch──> [queue] ──> target
//!               └─ blocks on Completion <──── result + signal ────────┘
//! ```

use std::{fmt, sync::Arc, time::Duration};

use tracing::debug;

use crate::{
  args::Marshal,
  error::{DelegateError, Result},
  message::{Completion, Envelope, Reply},
  target::{BindingKind, Closure, FreeFn, Invoker, Method, SharedMethod, TargetId},
  thread::ThreadTarget,
};

// ============================================================================
// Invocation Mode
// ============================================================================

/// Where and how a delegate's target runs
#[derive(Clone, Default)]
pub enum InvokeMode {
  /// Call directly on the caller's thread
  #[default]
  Sync,
  /// Queue the call on `thread` and return immediately
  Async { thread: Arc<dyn ThreadTarget> },
  /// Queue the call on `thread` and block until it completes
  ///
  /// `timeout` of `None` waits without bound.
  AsyncWait {
    thread: Arc<dyn ThreadTarget>,
    timeout: Option<Duration>,
  },
}

impl InvokeMode {
  /// The thread target, for asynchronous modes
  pub fn thread(&self) -> Option<&Arc<dyn ThreadTarget>> {
    match self {
      InvokeMode::Sync => None,
      InvokeMode::Async { thread } | InvokeMode::AsyncWait { thread, .. } => Some(thread),
    }
  }

  pub fn is_blocking(&self) -> bool {
    matches!(self, InvokeMode::AsyncWait { .. })
  }
}

fn same_thread(a: &Arc<dyn ThreadTarget>, b: &Arc<dyn ThreadTarget>) -> bool {
  std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl PartialEq for InvokeMode {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (InvokeMode::Sync, InvokeMode::Sync) => true,
      (InvokeMode::Async { thread: a }, InvokeMode::Async { thread: b }) => same_thread(a, b),
      (
        InvokeMode::AsyncWait { thread: a, timeout: ta },
        InvokeMode::AsyncWait { thread: b, timeout: tb },
      ) => same_thread(a, b) && ta == tb,
      _ => false,
    }
  }
}

impl fmt::Debug for InvokeMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      InvokeMode::Sync => f.write_str("Sync"),
      InvokeMode::Async { thread } => f.debug_struct("Async").field("thread", &thread.name()).finish(),
      InvokeMode::AsyncWait { thread, timeout } => f
        .debug_struct("AsyncWait")
        .field("thread", &thread.name())
        .field("timeout", timeout)
        .finish(),
    }
  }
}

// ============================================================================
// Delegate
// ============================================================================

/// A bindable, type-erased reference to a function, method or closure
///
/// `A` is the argument set (a single value, a tuple, or `()`), `R` the return
/// type. Delegates are cheap to clone: clones share the bound function and
/// instance reference. Equality is structural over the target and the mode.
pub struct Delegate<A, R> {
  target: Option<Box<dyn Invoker<A, R>>>,
  mode: InvokeMode,
}

impl<A: 'static, R: 'static> Delegate<A, R> {
  /// A delegate with no target; invoking it is [`DelegateError::InvalidOperation`]
  pub fn unbound() -> Self {
    Self {
      target: None,
      mode: InvokeMode::Sync,
    }
  }

  /// Bind a free or static function
  pub fn from_fn(func: fn(A) -> R) -> Self {
    Self::bound(FreeFn::new(func))
  }

  /// Bind a method on an instance without taking ownership of it
  ///
  /// Once every `Arc` to the instance is gone, invoking the delegate is
  /// [`DelegateError::InvalidTarget`].
  pub fn from_method<T>(object: &Arc<T>, method: fn(&T, A) -> R) -> Self
  where
    T: Send + Sync + 'static,
  {
    Self::bound(Method::new(object, method))
  }

  /// Bind a method on an instance the delegate keeps alive
  pub fn from_shared<T>(object: Arc<T>, method: fn(&T, A) -> R) -> Self
  where
    T: Send + Sync + 'static,
  {
    Self::bound(SharedMethod::new(object, method))
  }

  /// Bind a closure; clones of this delegate compare equal, separately
  /// bound closures do not
  pub fn from_closure(func: impl Fn(A) -> R + Send + Sync + 'static) -> Self {
    Self::bound(Closure::new(func))
  }

  fn bound(target: impl Invoker<A, R> + 'static) -> Self {
    Self {
      target: Some(Box::new(target)),
      mode: InvokeMode::Sync,
    }
  }
}

impl<A, R> Delegate<A, R> {
  /// Invoke on `thread` without waiting for the result
  pub fn on(self, thread: Arc<dyn ThreadTarget>) -> Self {
    self.with_mode(InvokeMode::Async { thread })
  }

  /// Invoke on `thread` and block up to `timeout` for the result
  pub fn on_wait(self, thread: Arc<dyn ThreadTarget>, timeout: Option<Duration>) -> Self {
    self.with_mode(InvokeMode::AsyncWait { thread, timeout })
  }

  pub fn with_mode(mut self, mode: InvokeMode) -> Self {
    self.mode = mode;
    self
  }

  pub fn mode(&self) -> &InvokeMode {
    &self.mode
  }

  pub fn is_bound(&self) -> bool {
    self.target.is_some()
  }

  pub fn binding(&self) -> Option<BindingKind> {
    self.target_id().map(|id| id.kind)
  }

  pub fn target_id(&self) -> Option<TargetId> {
    self.target.as_ref().map(|target| target.identity())
  }

  /// Returns false for unbound delegates and for method delegates whose
  /// instance has been released
  pub fn is_alive(&self) -> bool {
    self.target.as_ref().is_some_and(|target| target.is_alive())
  }

  /// Call the target on the current thread, whatever the mode
  pub fn invoke_sync(&self, args: A) -> Result<R> {
    let target = self.target.as_ref().ok_or(DelegateError::InvalidOperation)?;
    target.call(args)
  }
}

impl<A, R> Delegate<A, R>
where
  A: Marshal,
  R: Send + 'static,
{
  /// Invoke the target according to the delegate's mode
  ///
  /// - `Sync`: returns the target's value.
  /// - `Async`: returns `R::default()` once the call is queued.
  /// - `AsyncWait`: returns the target's value, [`DelegateError::Timeout`]
  ///   if the bound elapses (the call still runs later), or
  ///   [`DelegateError::Discarded`] if the target thread dropped the call.
  pub fn invoke(&self, args: A) -> Result<R>
  where
    R: Default,
  {
    match &self.mode {
      InvokeMode::Sync => self.invoke_sync(args),
      InvokeMode::Async { thread } => {
        self.post(thread.as_ref(), args, None)?;
        Ok(R::default())
      }
      InvokeMode::AsyncWait { thread, timeout } => self.invoke_wait(thread.as_ref(), *timeout, args),
    }
  }

  /// Invoke and return the target's value only if it was produced
  ///
  /// Fire-and-forget delegates always return `None`; failures are logged.
  pub fn async_invoke(&self, args: A) -> Option<R> {
    let result = match &self.mode {
      InvokeMode::Sync => self.invoke_sync(args),
      InvokeMode::Async { thread } => {
        if let Err(e) = self.post(thread.as_ref(), args, None) {
          debug!(error = %e, "Delegate could not be dispatched");
        }
        return None;
      }
      InvokeMode::AsyncWait { thread, timeout } => self.invoke_wait(thread.as_ref(), *timeout, args),
    };

    result
      .inspect_err(|e| debug!(error = %e, "Delegate produced no result"))
      .ok()
  }

  fn invoke_wait(&self, thread: &dyn ThreadTarget, timeout: Option<Duration>, args: A) -> Result<R> {
    // Waiting on our own queue would never complete
    if thread.is_current() {
      return self.invoke_sync(args);
    }

    let completion = Completion::new();
    self.post(thread, args, Some(Reply::new(completion.clone())))?;

    let result = completion.wait(timeout);
    if let Err(e @ DelegateError::Timeout(_)) = &result {
      debug!(thread = thread.name(), error = %e, "Blocking call timed out");
    }
    result
  }

  fn post(&self, thread: &dyn ThreadTarget, args: A, reply: Option<Reply<R>>) -> Result<()> {
    let target = self.target.as_ref().ok_or(DelegateError::InvalidOperation)?;
    if !target.is_alive() {
      return Err(DelegateError::InvalidTarget);
    }

    let args = args.capture()?;
    let msg = Envelope::into_message(target.clone(), args, reply);
    debug!(
      message_id = msg.id(),
      thread = thread.name(),
      binding = %target.identity().kind,
      blocking = msg.is_blocking(),
      "Dispatching message"
    );
    thread.dispatch(msg);
    Ok(())
  }
}

impl<A: 'static, R: 'static> Default for Delegate<A, R> {
  fn default() -> Self {
    Self::unbound()
  }
}

impl<A, R> Clone for Delegate<A, R> {
  fn clone(&self) -> Self {
    Self {
      target: self.target.clone(),
      mode: self.mode.clone(),
    }
  }
}

impl<A, R> PartialEq for Delegate<A, R> {
  fn eq(&self, other: &Self) -> bool {
    self.target_id() == other.target_id() && self.mode == other.mode
  }
}

impl<A, R> fmt::Debug for Delegate<A, R> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Delegate")
      .field("target", &self.target_id())
      .field("mode", &self.mode)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use std::{
    collections::VecDeque,
    sync::atomic::{AtomicI32, AtomicUsize, Ordering},
    thread::{self, ThreadId},
  };

  use parking_lot::Mutex;
  use pretty_assertions::assert_eq;

  use super::*;
  use crate::message::Message;

  /// Holds messages until the test runs them
  #[derive(Default)]
  struct ManualTarget {
    queue: Mutex<VecDeque<Message>>,
  }

  impl ManualTarget {
    fn run_pending(&self) -> usize {
      let mut ran = 0;
      loop {
        let next = self.queue.lock().pop_front();
        let Some(msg) = next else { break ran };
        msg.execute();
        ran += 1;
      }
    }

    fn pending(&self) -> usize {
      self.queue.lock().len()
    }
  }

  impl ThreadTarget for ManualTarget {
    fn dispatch(&self, msg: Message) {
      self.queue.lock().push_back(msg);
    }

    fn name(&self) -> &str {
      "manual"
    }
  }

  /// Executes each message on a fresh thread
  struct SpawnTarget;

  impl ThreadTarget for SpawnTarget {
    fn dispatch(&self, msg: Message) {
      thread::spawn(move || msg.execute());
    }
  }

  /// Drops every message it is given
  struct BlackHole;

  impl ThreadTarget for BlackHole {
    fn dispatch(&self, msg: Message) {
      drop(msg);
    }
  }

  /// Claims every caller is already on its thread
  struct CurrentTarget;

  impl ThreadTarget for CurrentTarget {
    fn dispatch(&self, _msg: Message) {
      panic!("should call directly");
    }

    fn is_current(&self) -> bool {
      true
    }
  }

  fn add((a, b): (i32, i32)) -> i32 {
    a + b
  }

  fn thread_of(_: ()) -> Option<ThreadId> {
    Some(thread::current().id())
  }

  struct Account {
    balance: AtomicI32,
  }

  impl Account {
    fn deposit(&self, amount: i32) -> i32 {
      self.balance.fetch_add(amount, Ordering::SeqCst) + amount
    }

    fn zero() -> i32 {
      0
    }
  }

  fn zero_adapter(_: ()) -> i32 {
    Account::zero()
  }

  #[test]
  fn test_sync_matches_direct_call() {
    let delegate = Delegate::from_fn(add);
    for (a, b) in [(0, 0), (1, 2), (-5, 5), (i32::MAX, 0)] {
      assert_eq!(delegate.invoke((a, b)).unwrap(), add((a, b)));
    }
  }

  #[test]
  fn test_unbound_is_invalid_operation() {
    let delegate = Delegate::<i32, i32>::unbound();
    assert!(!delegate.is_bound());
    assert!(matches!(delegate.invoke(1), Err(DelegateError::InvalidOperation)));

    let target = Arc::new(ManualTarget::default());
    let delegate = Delegate::<i32, i32>::default().on(target.clone());
    assert!(matches!(delegate.invoke(1), Err(DelegateError::InvalidOperation)));
    assert_eq!(target.pending(), 0);
  }

  #[test]
  fn test_static_function_binds_like_free() {
    let delegate = Delegate::from_fn(zero_adapter);
    assert_eq!(delegate.binding(), Some(BindingKind::Free));
    assert_eq!(delegate.invoke(()).unwrap(), 0);
  }

  #[test]
  fn test_member_binding() {
    let account = Arc::new(Account { balance: AtomicI32::new(10) });
    let delegate = Delegate::from_method(&account, Account::deposit);
    assert_eq!(delegate.binding(), Some(BindingKind::Member));
    assert_eq!(delegate.invoke(5).unwrap(), 15);

    drop(account);
    assert!(!delegate.is_alive());
    assert!(matches!(delegate.invoke(5), Err(DelegateError::InvalidTarget)));
  }

  #[test]
  fn test_expired_member_is_rejected_before_dispatch() {
    let target = Arc::new(ManualTarget::default());
    let account = Arc::new(Account { balance: AtomicI32::new(0) });
    let delegate = Delegate::from_method(&account, Account::deposit).on(target.clone());
    drop(account);

    assert!(matches!(delegate.invoke(1), Err(DelegateError::InvalidTarget)));
    assert_eq!(target.pending(), 0);
  }

  #[test]
  fn test_equality_is_structural() {
    let account = Arc::new(Account { balance: AtomicI32::new(0) });
    let other = Arc::new(Account { balance: AtomicI32::new(0) });
    let thread: Arc<dyn ThreadTarget> = Arc::new(ManualTarget::default());

    assert_eq!(Delegate::from_fn(add), Delegate::from_fn(add));
    assert_eq!(
      Delegate::from_method(&account, Account::deposit),
      Delegate::from_method(&account, Account::deposit)
    );
    assert_ne!(
      Delegate::from_method(&account, Account::deposit),
      Delegate::from_method(&other, Account::deposit)
    );
    assert_ne!(Delegate::from_fn(add), Delegate::from_fn(add).on(thread.clone()));
    assert_eq!(
      Delegate::from_fn(add).on(thread.clone()),
      Delegate::from_fn(add).on(thread.clone())
    );
    assert_ne!(
      Delegate::from_fn(add).on_wait(thread.clone(), Some(Duration::from_secs(1))),
      Delegate::from_fn(add).on_wait(thread, None)
    );
  }

  #[test]
  fn test_async_returns_default_and_runs_later() {
    let target = Arc::new(ManualTarget::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let delegate = Delegate::from_closure(move |n: usize| {
      seen.fetch_add(n, Ordering::SeqCst);
      n * 10
    })
    .on(target.clone());

    assert_eq!(delegate.invoke(3).unwrap(), 0);
    assert_eq!(delegate.invoke(4).unwrap(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    assert_eq!(target.run_pending(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 7);
  }

  #[test]
  fn test_async_executes_in_dispatch_order() {
    let target = Arc::new(ManualTarget::default());
    let order = Arc::new(Mutex::new(Vec::new()));
    let sink = order.clone();
    let delegate = Delegate::from_closure(move |n: u32| sink.lock().push(n)).on(target.clone());

    for n in 0..10 {
      delegate.invoke(n).unwrap();
    }
    target.run_pending();
    assert_eq!(*order.lock(), (0..10).collect::<Vec<_>>());
  }

  #[test]
  fn test_async_wait_returns_result_from_other_thread() {
    let delegate = Delegate::from_fn(thread_of).on_wait(Arc::new(SpawnTarget), Some(Duration::from_secs(5)));
    let ran_on = delegate.invoke(()).unwrap();
    assert_ne!(ran_on, Some(thread::current().id()));
  }

  #[test]
  fn test_async_wait_times_out_and_message_still_runs() {
    let target = Arc::new(ManualTarget::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let delegate = Delegate::from_closure(move |n: i32| {
      seen.fetch_add(1, Ordering::SeqCst);
      n
    })
    .on_wait(target.clone(), Some(Duration::from_millis(20)));

    let err = delegate.invoke(1).unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(target.pending(), 1);

    target.run_pending();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_async_wait_discarded_message_unblocks_caller() {
    let delegate = Delegate::from_fn(add).on_wait(Arc::new(BlackHole), None);
    assert!(delegate.invoke((1, 2)).unwrap_err().is_discarded());
  }

  #[test]
  fn test_async_wait_on_current_thread_calls_directly() {
    let delegate = Delegate::from_fn(thread_of).on_wait(Arc::new(CurrentTarget), None);
    assert_eq!(delegate.invoke(()).unwrap(), Some(thread::current().id()));
  }

  #[test]
  fn test_async_invoke() {
    let waiting = Delegate::from_fn(add).on_wait(Arc::new(SpawnTarget), None);
    assert_eq!(waiting.async_invoke((2, 3)), Some(5));

    let dropped = Delegate::from_fn(add).on_wait(Arc::new(BlackHole), None);
    assert_eq!(dropped.async_invoke((2, 3)), None);

    let target = Arc::new(ManualTarget::default());
    let fire_and_forget = Delegate::from_fn(add).on(target.clone());
    assert_eq!(fire_and_forget.async_invoke((2, 3)), None);
    assert_eq!(target.pending(), 1);
  }

  #[test]
  fn test_invoke_sync_ignores_mode() {
    let target = Arc::new(ManualTarget::default());
    let delegate = Delegate::from_fn(add).on(target.clone());
    assert_eq!(delegate.invoke_sync((4, 4)).unwrap(), 8);
    assert_eq!(target.pending(), 0);
  }

  #[test]
  fn test_shared_member_survives_caller_drop() {
    let target = Arc::new(ManualTarget::default());
    let account = Arc::new(Account { balance: AtomicI32::new(0) });
    let delegate = Delegate::from_shared(account.clone(), Account::deposit).on(target.clone());
    delegate.invoke(7).unwrap();
    drop(delegate);

    target.run_pending();
    assert_eq!(account.balance.load(Ordering::SeqCst), 7);
  }
}
