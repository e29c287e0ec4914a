//! The worker thread
//!
//! ```text
//! callers ──dispatch──> [ mpsc queue ] ──blocking_recv──> worker thread
//!                                                          ├─ execute (FIFO)
//!                                                          └─ discard (stopping)
//! ```
//!
//! The queue is an unbounded tokio channel consumed from a plain OS thread,
//! so dispatch never blocks and the worker needs no runtime.

use std::{
  panic::{self, AssertUnwindSafe},
  sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
  thread::{self, JoinHandle, ThreadId},
  time::Duration,
};

use delegate::{Delegate, Message, ThreadTarget};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{
  config::{ShutdownPolicy, WorkerConfig},
  error::WorkerError,
};

enum Command {
  Dispatch(Message),
  Exit,
}

/// State shared between the handle and one run of the worker thread
///
/// Each `start` creates a fresh instance, so a run that is still winding
/// down never sees the flags of the next one.
#[derive(Default)]
struct Shared {
  pending: AtomicUsize,
  discarding: AtomicBool,
}

struct Running {
  sender: mpsc::UnboundedSender<Command>,
  handle: JoinHandle<()>,
  shared: Arc<Shared>,
}

/// A named OS thread executing delegate messages in dispatch order
pub struct WorkerThread {
  config: WorkerConfig,
  running: Mutex<Option<Running>>,
  /// Thread of a run stopped from inside itself, not yet joined
  retired: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerThread {
  /// Create a stopped worker; call [`start`](Self::start) before dispatching
  pub fn new(config: WorkerConfig) -> Self {
    Self {
      config,
      running: Mutex::new(None),
      retired: Mutex::new(None),
    }
  }

  /// Create and start a worker, ready to hand to delegates
  pub fn spawn(config: WorkerConfig) -> Result<Arc<Self>, WorkerError> {
    let worker = Arc::new(Self::new(config));
    worker.start()?;
    Ok(worker)
  }

  /// Start a new run of the worker thread
  ///
  /// Fails with [`WorkerError::Stopping`] while a previous run that was shut
  /// down from its own thread is still finishing its queue.
  pub fn start(&self) -> Result<(), WorkerError> {
    let mut running = self.running.lock();
    if running.is_some() {
      return Err(WorkerError::AlreadyRunning);
    }
    self.reap_retired()?;

    let (sender, receiver) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared::default());
    let run_shared = shared.clone();
    let name = self.config.name.clone();

    let handle = thread::Builder::new()
      .name(self.config.name.clone())
      .spawn(move || run_loop(name, receiver, run_shared))
      .map_err(WorkerError::Spawn)?;

    info!(worker = %self.config.name, "Worker started");
    *running = Some(Running { sender, handle, shared });
    Ok(())
  }

  fn reap_retired(&self) -> Result<(), WorkerError> {
    let mut retired = self.retired.lock();
    match retired.take() {
      Some(handle) if !handle.is_finished() => {
        *retired = Some(handle);
        Err(WorkerError::Stopping)
      }
      Some(handle) => {
        if handle.join().is_err() {
          error!(worker = %self.config.name, "Worker thread panicked outside a message");
        }
        Ok(())
      }
      None => Ok(()),
    }
  }

  pub fn config(&self) -> &WorkerConfig {
    &self.config
  }

  pub fn is_running(&self) -> bool {
    self.running.lock().is_some()
  }

  /// Messages dispatched to the current run but not yet picked up
  pub fn queue_len(&self) -> usize {
    self
      .running
      .lock()
      .as_ref()
      .map_or(0, |r| r.shared.pending.load(Ordering::SeqCst))
  }

  pub fn thread_id(&self) -> Option<ThreadId> {
    self.running.lock().as_ref().map(|r| r.handle.thread().id())
  }

  /// Default bound for blocking delegates bound through this worker
  pub fn wait_timeout(&self) -> Option<Duration> {
    self.config.wait_timeout()
  }

  /// Rebind `delegate` to run on this worker without waiting
  pub fn bind<A, R>(self: &Arc<Self>, delegate: Delegate<A, R>) -> Delegate<A, R> {
    delegate.on(self.clone())
  }

  /// Rebind `delegate` to run on this worker and wait up to the configured bound
  pub fn bind_wait<A, R>(self: &Arc<Self>, delegate: Delegate<A, R>) -> Delegate<A, R> {
    delegate.on_wait(self.clone(), self.wait_timeout())
  }

  /// Stop the worker using the configured policy
  pub fn shutdown(&self) {
    self.shutdown_with(self.config.shutdown);
  }

  /// Stop the worker and wait for its thread to exit
  ///
  /// With [`ShutdownPolicy::Drain`] every message queued before this call is
  /// executed first; with [`ShutdownPolicy::Discard`] they are discarded. A
  /// message already executing always runs to completion. Called from the
  /// worker's own thread, the worker stops after the current message and
  /// cannot be restarted until that run has finished.
  pub fn shutdown_with(&self, policy: ShutdownPolicy) {
    let running = {
      let mut running = self.running.lock();
      // Set under the lock so anyone who sees the worker stopped also sees the policy
      if let Some(run) = running.as_ref()
        && policy == ShutdownPolicy::Discard
      {
        run.shared.discarding.store(true, Ordering::SeqCst);
      }
      running.take()
    };
    let Some(Running { sender, handle, shared }) = running else {
      return;
    };

    info!(
      worker = %self.config.name,
      ?policy,
      pending = shared.pending.load(Ordering::SeqCst),
      "Worker stopping"
    );
    // The worker only exits on Exit or a closed channel, so a failed send
    // means it is already gone.
    let _ = sender.send(Command::Exit);
    drop(sender);

    if handle.thread().id() == thread::current().id() {
      *self.retired.lock() = Some(handle);
      return;
    }
    if handle.join().is_err() {
      error!(worker = %self.config.name, "Worker thread panicked outside a message");
    }
  }
}

impl ThreadTarget for WorkerThread {
  fn dispatch(&self, msg: Message) {
    let rejected = {
      let running = self.running.lock();
      match running.as_ref() {
        Some(running) => {
          let pending = &running.shared.pending;
          pending.fetch_add(1, Ordering::SeqCst);
          running.sender.send(Command::Dispatch(msg)).err().map(|mpsc::error::SendError(command)| {
            pending.fetch_sub(1, Ordering::SeqCst);
            command
          })
        }
        None => Some(Command::Dispatch(msg)),
      }
    };

    // Discard outside the lock; releasing arguments runs host drop code
    if let Some(Command::Dispatch(msg)) = rejected {
      warn!(worker = %self.config.name, message_id = msg.id(), "Dispatch to stopped worker, discarding");
      msg.discard();
    }
  }

  fn name(&self) -> &str {
    &self.config.name
  }

  fn is_current(&self) -> bool {
    self.thread_id() == Some(thread::current().id())
  }
}

impl Drop for WorkerThread {
  fn drop(&mut self) {
    self.shutdown();
  }
}

impl std::fmt::Debug for WorkerThread {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("WorkerThread")
      .field("name", &self.config.name)
      .field("running", &self.is_running())
      .field("queue_len", &self.queue_len())
      .finish()
  }
}

// ============================================================================
// Worker Loop
// ============================================================================

fn run_loop(name: String, mut receiver: mpsc::UnboundedReceiver<Command>, shared: Arc<Shared>) {
  while let Some(command) = receiver.blocking_recv() {
    let msg = match command {
      Command::Dispatch(msg) => msg,
      Command::Exit => break,
    };
    shared.pending.fetch_sub(1, Ordering::SeqCst);

    if shared.discarding.load(Ordering::SeqCst) {
      msg.discard();
      continue;
    }

    let id = msg.id();
    // A panicking target unwinds through the message, which releases its
    // arguments and reports the call as discarded.
    if panic::catch_unwind(AssertUnwindSafe(move || msg.execute())).is_err() {
      error!(worker = %name, message_id = id, "Target panicked");
    }
  }

  receiver.close();
  let mut discarded = 0usize;
  while let Ok(Command::Dispatch(msg)) = receiver.try_recv() {
    shared.pending.fetch_sub(1, Ordering::SeqCst);
    msg.discard();
    discarded += 1;
  }

  debug!(worker = %name, discarded, "Worker loop exited");
  info!(worker = %name, "Worker stopped");
}
