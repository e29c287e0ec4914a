//! Reference thread target for delegates
//!
//! A [`WorkerThread`] owns one named OS thread that drains a FIFO queue of
//! delegate messages. Hand it to [`Delegate::on`](delegate::Delegate::on) or
//! [`Delegate::on_wait`](delegate::Delegate::on_wait) to run targets there.

mod config;
mod error;
mod thread;

pub use config::{ShutdownPolicy, WorkerConfig};
pub use error::WorkerError;
pub use thread::WorkerThread;
