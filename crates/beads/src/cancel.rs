//! Ambient cancellation for store operations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cheaply-cloneable cancellation flag shared between a store and its
/// caller.
///
/// Operations check the token before every lock acquisition: a cancelled
/// token makes the operation fail with [`crate::error::Error::Cancelled`]
/// before any filesystem side effect. Once a write has begun the operation
/// runs to completion (or failure) so the post-state stays atomic.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation to every holder of this token.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been signalled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
