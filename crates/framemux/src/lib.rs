//! Paced multiplexing of JPEG frame streams.
//!
//! framemux reads self-delimited frames from N named FIFOs, picks one per
//! tick according to an operator-controlled policy, and writes it to a single
//! consumer at a fixed rate. A static fallback frame keeps the consumer fed
//! while no producer is live.
//!
//! # Crate Structure
//!
//! - [`transport`]: FIFO creation, non-blocking endpoints, readiness waits
//! - [`frame`]: Start/end marker framing, bounded receive buffers, paced writes
//! - [`mux`]: Channels, control protocol, selection policy and the output loop

/// Re-export transport types.
pub mod transport {
    pub use framemux_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use framemux_frame::*;
}

/// Re-export multiplexer types.
pub mod mux {
    pub use framemux_core::*;
}
