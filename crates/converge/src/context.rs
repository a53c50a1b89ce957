//! Cancellation and progress hooks
//!
//! These let the runner report progress and stop early without depending
//! on any particular terminal UI or signal handling crate.

use crate::action::Action;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared cancellation flag.
///
/// Cloning yields a handle to the same flag. The binary registers the flag
/// with its signal handler; the runner and the poll loop check it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// The underlying flag, for registering with a signal handler.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

/// Progress callback for batch runs
pub trait RunProgress {
    /// Called before an action starts (`index` is 0-based)
    fn on_action_start(&mut self, index: usize, total: usize, action: &Action);

    /// Called after an action exits successfully
    fn on_action_complete(&mut self, index: usize, action: &Action);
}

/// No-op progress callback
pub struct NoProgress;

impl RunProgress for NoProgress {
    fn on_action_start(&mut self, _index: usize, _total: usize, _action: &Action) {}
    fn on_action_complete(&mut self, _index: usize, _action: &Action) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_flag() {
        let token = CancelToken::new();
        let handle = token.clone();
        assert!(!handle.is_cancelled());
        token.cancel();
        assert!(handle.is_cancelled());
        assert!(token.flag().load(Ordering::SeqCst));
    }
}
