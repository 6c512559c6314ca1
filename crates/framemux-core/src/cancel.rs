use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative shutdown flag shared between a signal handler and the loop.
///
/// Clones observe the same flag. The multiplexer checks it before every
/// readiness wait and again after the wait returns.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
