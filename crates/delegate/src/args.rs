//! Heap argument store
//!
//! Arguments for an asynchronous call must outlive the caller's stack frame.
//! Each argument is moved into its own heap allocation (an [`ArgCopy`]) tagged
//! with the [`ArgKind`] it was captured as, and the whole set travels inside
//! the invocation message until the target thread moves the values back out.
//!
//! ```text
//! caller thread                        target thread
//! (a, b, c) --capture--> HeapArgs --> restore --> target(a, b, c)
//!                        [a][b][c]
//! ```
//!
//! Argument types opt in through [`HeapArg`]. Primitives, strings and the
//! common std containers are covered here; host types use [`heap_arg!`].

use std::{
  any::{Any, type_name},
  fmt,
  sync::Arc,
};

use tracing::trace;

use crate::error::{DelegateError, Result};

// ============================================================================
// Argument Kinds
// ============================================================================

/// Shape an argument was captured as, which decides how its copy is released
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgKind {
  /// Plain value, released with a single drop
  Value,
  /// Owned pointer, the pointed-to object is released
  Pointer,
  /// Owned pointer to an owned pointer, released inner first then outer
  PointerToPointer,
}

impl ArgKind {
  /// The kind of a pointer to an argument of this kind
  pub const fn indirect(self) -> Self {
    match self {
      ArgKind::Value => ArgKind::Pointer,
      ArgKind::Pointer | ArgKind::PointerToPointer => ArgKind::PointerToPointer,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      ArgKind::Value => "value",
      ArgKind::Pointer => "pointer",
      ArgKind::PointerToPointer => "pointer_to_pointer",
    }
  }
}

impl fmt::Display for ArgKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

// ============================================================================
// HeapArg
// ============================================================================

/// A single argument that can be copied onto the heap and sent to another thread
///
/// The default methods box the value. Pointer types override them so the
/// existing allocation is reused instead of wrapped a second time.
pub trait HeapArg: Sized + Send + 'static {
  /// How a copy of this argument is released
  const KIND: ArgKind = ArgKind::Value;

  /// Move the argument into an erased heap slot
  fn into_slot(self) -> Box<dyn Any + Send> {
    Box::new(self)
  }

  /// Recover the argument from a slot produced by [`HeapArg::into_slot`]
  fn from_slot(slot: Box<dyn Any + Send>) -> Option<Self> {
    slot.downcast::<Self>().ok().map(|arg| *arg)
  }
}

impl<T: HeapArg> HeapArg for Box<T> {
  const KIND: ArgKind = T::KIND.indirect();

  fn into_slot(self) -> Box<dyn Any + Send> {
    self
  }

  fn from_slot(slot: Box<dyn Any + Send>) -> Option<Self> {
    slot.downcast::<T>().ok()
  }
}

impl<T: HeapArg> HeapArg for Option<T> {
  const KIND: ArgKind = T::KIND;
}

impl<T: HeapArg> HeapArg for Vec<T> {}

impl<T: Send + Sync + 'static> HeapArg for Arc<T> {}

// ============================================================================
// ArgCopy
// ============================================================================

/// One heap-allocated call argument
///
/// The copy is released exactly once: either when the target thread moves
/// the value out, by an explicit [`ArgCopy::release`], or on drop.
pub struct ArgCopy {
  kind: ArgKind,
  type_name: &'static str,
  slot: Option<Box<dyn Any + Send>>,
}

impl ArgCopy {
  /// Move an argument onto the heap
  pub fn capture<T: HeapArg>(arg: T) -> Self {
    Self {
      kind: T::KIND,
      type_name: type_name::<T>(),
      slot: Some(arg.into_slot()),
    }
  }

  pub fn kind(&self) -> ArgKind {
    self.kind
  }

  /// Returns true once the argument has been moved out or released
  pub fn is_released(&self) -> bool {
    self.slot.is_none()
  }

  /// Release the argument without handing it to a target
  pub fn release(mut self) {
    self.release_slot();
  }

  fn take<T: HeapArg>(&mut self, position: usize) -> Result<T> {
    self
      .slot
      .take()
      .and_then(T::from_slot)
      .ok_or(DelegateError::ArgumentType {
        position,
        expected: type_name::<T>(),
      })
  }

  fn release_slot(&mut self) {
    if let Some(slot) = self.slot.take() {
      trace!(kind = %self.kind, arg = self.type_name, "Releasing argument copy");
      drop(slot);
    }
  }
}

impl Drop for ArgCopy {
  fn drop(&mut self) {
    self.release_slot();
  }
}

impl fmt::Debug for ArgCopy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ArgCopy")
      .field("kind", &self.kind)
      .field("type_name", &self.type_name)
      .field("released", &self.is_released())
      .finish()
  }
}

// ============================================================================
// HeapArgs
// ============================================================================

/// The captured argument set of one call, in signature order
#[derive(Debug, Default)]
pub struct HeapArgs {
  copies: Vec<ArgCopy>,
}

impl HeapArgs {
  /// Reserve room for `arity` arguments
  ///
  /// This is the only fallible allocation of a capture, and it happens
  /// before any argument is moved into the set.
  pub fn with_capacity(arity: usize) -> Result<Self> {
    let mut copies = Vec::new();
    copies.try_reserve_exact(arity)?;
    Ok(Self { copies })
  }

  /// Capture a one-argument set
  pub fn single<T: HeapArg>(arg: T) -> Result<Self> {
    let mut args = Self::with_capacity(1)?;
    args.push(arg);
    Ok(args)
  }

  /// Append the next argument
  pub fn push<T: HeapArg>(&mut self, arg: T) {
    self.copies.push(ArgCopy::capture(arg));
  }

  /// Move the argument at `position` out of the set
  pub fn take<T: HeapArg>(&mut self, position: usize) -> Result<T> {
    match self.copies.get_mut(position) {
      Some(copy) => copy.take(position),
      None => Err(DelegateError::ArgumentType {
        position,
        expected: type_name::<T>(),
      }),
    }
  }

  /// Move the only argument out of a one-argument set
  pub fn into_single<T: HeapArg>(mut self) -> Result<T> {
    self.take(0)
  }

  pub fn len(&self) -> usize {
    self.copies.len()
  }

  pub fn is_empty(&self) -> bool {
    self.copies.is_empty()
  }

  /// Kinds of the captured arguments, in signature order
  pub fn kinds(&self) -> impl Iterator<Item = ArgKind> + '_ {
    self.copies.iter().map(ArgCopy::kind)
  }

  /// Release every argument that has not been moved out yet
  pub fn release(self) {
    for copy in self.copies {
      copy.release();
    }
  }
}

// ============================================================================
// Marshal
// ============================================================================

/// A complete argument set that can cross a thread boundary
///
/// Implemented for `()`, for every single [`HeapArg`] type, and for tuples of
/// up to six [`HeapArg`] elements. Multi-argument targets take their
/// arguments as a tuple.
pub trait Marshal: Sized + Send + 'static {
  /// Number of arguments in the set
  const ARITY: usize;

  /// Copy the arguments onto the heap
  ///
  /// Either the whole set is captured or an error is returned and every
  /// argument has already been dropped.
  fn capture(self) -> Result<HeapArgs>;

  /// Move the arguments back out on the target thread
  fn restore(args: HeapArgs) -> Result<Self>;
}

/// Opt host types into cross-thread argument transport.
///
/// ```ignore
/// struct Reading { celsius: f32 }
/// delegate::heap_arg!(Reading);
///
/// let delegate = Delegate::from_fn(record).on(worker);
/// delegate.invoke(Reading { celsius: 21.5 })?;
/// ```
#[macro_export]
macro_rules! heap_arg {
  ($($ty:ty),+ $(,)?) => {
    $(
      impl $crate::HeapArg for $ty {}

      impl $crate::Marshal for $ty {
        const ARITY: usize = 1;

        fn capture(self) -> $crate::Result<$crate::HeapArgs> {
          $crate::HeapArgs::single(self)
        }

        fn restore(args: $crate::HeapArgs) -> $crate::Result<Self> {
          args.into_single()
        }
      }
    )+
  };
}

heap_arg!(
  bool,
  char,
  u8,
  u16,
  u32,
  u64,
  u128,
  usize,
  i8,
  i16,
  i32,
  i64,
  i128,
  isize,
  f32,
  f64,
  String,
  &'static str,
  std::time::Duration,
  std::path::PathBuf,
);

impl Marshal for () {
  const ARITY: usize = 0;

  fn capture(self) -> Result<HeapArgs> {
    HeapArgs::with_capacity(0)
  }

  fn restore(_args: HeapArgs) -> Result<Self> {
    Ok(())
  }
}

impl<T: HeapArg> Marshal for Box<T> {
  const ARITY: usize = 1;

  fn capture(self) -> Result<HeapArgs> {
    HeapArgs::single(self)
  }

  fn restore(args: HeapArgs) -> Result<Self> {
    args.into_single()
  }
}

impl<T: HeapArg> Marshal for Option<T> {
  const ARITY: usize = 1;

  fn capture(self) -> Result<HeapArgs> {
    HeapArgs::single(self)
  }

  fn restore(args: HeapArgs) -> Result<Self> {
    args.into_single()
  }
}

impl<T: HeapArg> Marshal for Vec<T> {
  const ARITY: usize = 1;

  fn capture(self) -> Result<HeapArgs> {
    HeapArgs::single(self)
  }

  fn restore(args: HeapArgs) -> Result<Self> {
    args.into_single()
  }
}

impl<T: Send + Sync + 'static> Marshal for Arc<T> {
  const ARITY: usize = 1;

  fn capture(self) -> Result<HeapArgs> {
    HeapArgs::single(self)
  }

  fn restore(args: HeapArgs) -> Result<Self> {
    args.into_single()
  }
}

macro_rules! tuple_marshal {
  ($arity:expr; $($T:ident $idx:tt),+) => {
    impl<$($T: HeapArg),+> Marshal for ($($T,)+) {
      const ARITY: usize = $arity;

      fn capture(self) -> Result<HeapArgs> {
        let mut args = HeapArgs::with_capacity(Self::ARITY)?;
        $(args.push(self.$idx);)+
        Ok(args)
      }

      fn restore(mut args: HeapArgs) -> Result<Self> {
        Ok(($(args.take::<$T>($idx)?,)+))
      }
    }
  };
}

tuple_marshal!(1; A0 0);
tuple_marshal!(2; A0 0, A1 1);
tuple_marshal!(3; A0 0, A1 1, A2 2);
tuple_marshal!(4; A0 0, A1 1, A2 2, A3 3);
tuple_marshal!(5; A0 0, A1 1, A2 2, A3 3, A4 4);
tuple_marshal!(6; A0 0, A1 1, A2 2, A3 3, A4 4, A5 5);
