//! The boundary between delegates and host execution contexts

use crate::message::Message;

/// An execution context that accepts invocation messages
///
/// This is the only integration point a host has to provide. An
/// implementation must execute accepted messages on one designated thread,
/// in the order `dispatch` was called. A message that will never run must be
/// discarded, either with [`Message::discard`] or by dropping it, so its
/// arguments are released and a blocked caller is woken with
/// [`DelegateError::Discarded`](crate::DelegateError::Discarded).
pub trait ThreadTarget: Send + Sync {
  /// Queue a message for execution on this target's thread
  fn dispatch(&self, msg: Message);

  /// Name used in logs
  fn name(&self) -> &str {
    "thread-target"
  }

  /// Returns true when called from this target's own thread
  ///
  /// Blocking delegates use this to call directly instead of waiting on
  /// themselves.
  fn is_current(&self) -> bool {
    false
  }
}
