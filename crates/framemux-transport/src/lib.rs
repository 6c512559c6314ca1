//! Local endpoint transport for framemux.
//!
//! Provides the two OS-facing pieces the multiplexer is built on:
//! - Named FIFO endpoints, created on demand and opened non-blocking read-write
//! - Readiness waits over raw descriptors (`poll(2)`), bounded by a timeout
//!
//! This is the lowest layer of framemux. Everything else builds on top of
//! the [`FifoEndpoint`] type and the [`poll`] helpers provided here.

pub mod error;

#[cfg(unix)]
pub mod fifo;
#[cfg(unix)]
pub mod poll;

pub use error::{Result, TransportError};

#[cfg(unix)]
pub use fifo::{ensure_fifo, FifoEndpoint};
#[cfg(unix)]
pub use poll::{set_nonblocking, wait_readable, wait_writable, NonblockingGuard};
