//! Invocation messages
//!
//! A message bundles a cloned target with its captured arguments and, for
//! blocking calls, a reply handle. Messages are owned and moved, never
//! shared: the caller hands one to a [`ThreadTarget`](crate::ThreadTarget),
//! which either executes it or discards it. Dropping a message that never
//! ran counts as a discard.

use std::{
  fmt,
  sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
  },
  time::Duration,
};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::{
  args::{HeapArgs, Marshal},
  error::{DelegateError, Result},
  signal::{Semaphore, WaitStatus},
  target::Invoker,
};

static NEXT_MESSAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Type-erased body of a message
pub(crate) trait Dispatchable: Send {
  fn execute(self: Box<Self>);
  fn discard(self: Box<Self>);
}

// ============================================================================
// Message
// ============================================================================

/// A self-contained call ready to run on another thread
pub struct Message {
  id: u64,
  blocking: bool,
  body: Option<Box<dyn Dispatchable>>,
}

impl Message {
  pub(crate) fn new(body: Box<dyn Dispatchable>, blocking: bool) -> Self {
    Self {
      id: NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed),
      blocking,
      body: Some(body),
    }
  }

  /// Process-unique id, for correlating logs
  pub fn id(&self) -> u64 {
    self.id
  }

  /// Returns true if a caller is (or was) waiting on this message
  pub fn is_blocking(&self) -> bool {
    self.blocking
  }

  /// Call the target with the captured arguments on the current thread
  pub fn execute(mut self) {
    if let Some(body) = self.body.take() {
      debug!(message_id = self.id, blocking = self.blocking, "Executing message");
      body.execute();
    }
  }

  /// Release the arguments without calling the target
  ///
  /// A blocked caller is woken with [`DelegateError::Discarded`].
  pub fn discard(mut self) {
    self.discard_body();
  }

  fn discard_body(&mut self) {
    if let Some(body) = self.body.take() {
      debug!(message_id = self.id, blocking = self.blocking, "Discarding message");
      body.discard();
    }
  }
}

impl Drop for Message {
  fn drop(&mut self) {
    self.discard_body();
  }
}

impl fmt::Debug for Message {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Message")
      .field("id", &self.id)
      .field("blocking", &self.blocking)
      .field("pending", &self.body.is_some())
      .finish()
  }
}

// ============================================================================
// Completion
// ============================================================================

/// Result slot and wait primitive shared by a blocking caller and its message
pub(crate) struct Completion<R> {
  slot: Mutex<Option<Result<R>>>,
  signal: Semaphore,
}

impl<R> Completion<R> {
  pub(crate) fn new() -> Arc<Self> {
    Arc::new(Self {
      slot: Mutex::new(None),
      signal: Semaphore::new(),
    })
  }

  /// Block until the message completes or is discarded
  pub(crate) fn wait(&self, timeout: Option<Duration>) -> Result<R> {
    match self.signal.wait(timeout) {
      WaitStatus::Signaled => self.slot.lock().take().unwrap_or(Err(DelegateError::Discarded)),
      WaitStatus::TimedOut => Err(DelegateError::Timeout(timeout.unwrap_or_default())),
    }
  }
}

/// Message-side handle to a [`Completion`]
///
/// Writes the slot at most once and signals only after writing. A reply
/// dropped without a result delivers [`DelegateError::Discarded`].
pub(crate) struct Reply<R> {
  completion: Option<Arc<Completion<R>>>,
}

impl<R> Reply<R> {
  pub(crate) fn new(completion: Arc<Completion<R>>) -> Self {
    Self {
      completion: Some(completion),
    }
  }

  pub(crate) fn complete(mut self, result: Result<R>) {
    self.fulfill(result);
  }

  fn fulfill(&mut self, result: Result<R>) {
    if let Some(completion) = self.completion.take() {
      {
        let mut slot = completion.slot.lock();
        if slot.is_none() {
          *slot = Some(result);
        }
      }
      completion.signal.signal();
    }
  }
}

impl<R> Drop for Reply<R> {
  fn drop(&mut self) {
    self.fulfill(Err(DelegateError::Discarded));
  }
}

// ============================================================================
// Envelope
// ============================================================================

/// Concrete message body for a target taking `A` and returning `R`
pub(crate) struct Envelope<A, R> {
  target: Box<dyn Invoker<A, R>>,
  args: HeapArgs,
  reply: Option<Reply<R>>,
}

impl<A, R> Envelope<A, R>
where
  A: Marshal,
  R: Send + 'static,
{
  pub(crate) fn into_message(target: Box<dyn Invoker<A, R>>, args: HeapArgs, reply: Option<Reply<R>>) -> Message {
    let blocking = reply.is_some();
    Message::new(Box::new(Self { target, args, reply }), blocking)
  }
}

impl<A, R> Dispatchable for Envelope<A, R>
where
  A: Marshal,
  R: Send + 'static,
{
  fn execute(self: Box<Self>) {
    let Envelope { target, args, reply } = *self;
    let result = A::restore(args).and_then(|args| target.call(args));

    match reply {
      Some(reply) => reply.complete(result),
      None => {
        if let Err(e) = result {
          warn!(error = %e, binding = %target.identity().kind, "Asynchronous call failed");
        }
      }
    }
  }

  fn discard(self: Box<Self>) {
    let Envelope { args, reply, .. } = *self;
    args.release();
    drop(reply);
  }
}
