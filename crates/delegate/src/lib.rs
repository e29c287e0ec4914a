//! Type-erased delegates with cross-thread invocation
//!
//! A [`Delegate`] binds a free function, an instance method or a closure and
//! invokes it in one of three modes: directly, queued on another thread, or
//! queued while the caller blocks for the result. Hosts plug in their own
//! threads by implementing [`ThreadTarget`].
//!
//! Arguments cross threads by value. Each one is copied into a
//! [`HeapArgs`] store at dispatch time and released exactly once, whether the
//! message runs or is discarded.

mod args;
mod delegate;
mod error;
mod message;
mod multicast;
mod signal;
mod target;
mod thread;
mod unicast;

pub use args::{ArgCopy, ArgKind, HeapArg, HeapArgs, Marshal};
pub use delegate::{Delegate, InvokeMode};
pub use error::{DelegateError, MulticastError, Result};
pub use message::Message;
pub use multicast::{MulticastDelegate, MulticastDelegateSafe};
pub use signal::{Semaphore, WAIT_INFINITE, WaitStatus};
pub use target::{BindingKind, TargetId};
pub use thread::ThreadTarget;
pub use unicast::UnicastDelegate;
