//! Cancellation-aware operation context.
//!
//! Every contract operation accepts an [`OpContext`]. Segment operations are
//! fast and in-memory, so they carry no internal cancellation checkpoints,
//! but an already-cancelled context makes them fail fast at entry instead of
//! doing unnecessary work.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{QuiverError, Result};

/// Shared cancellation token passed down the operation call path.
///
/// Cloning is cheap; clones observe the same cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    cancel_token: Arc<AtomicBool>,
}

impl OpContext {
    /// Create a new, not-cancelled context.
    pub fn new() -> Self {
        Self {
            cancel_token: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. All clones observe the flag.
    pub fn cancel(&self) {
        self.cancel_token.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.load(Ordering::SeqCst)
    }

    /// Fail fast when the context is already cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(QuiverError::cancelled("operation context cancelled"))
        } else {
            Ok(())
        }
    }
}
