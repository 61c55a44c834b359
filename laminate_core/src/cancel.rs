// Copyright 2026 the Laminate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cooperative cancellation.
//!
//! A [`CancelToken`] is checked at the head of every worker and scheduler
//! iteration, and inside every blocking wait. Cancelling is a broadcast: all
//! clones observe it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Upper bound on how long a blocking wait sleeps before re-checking its
/// token.
pub const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Shared cancellation flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates an uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called on any
    /// clone.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// The underlying flag, for registering with signal handlers.
    #[must_use]
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}

#[cfg(test)]
mod tests {
    use super::CancelToken;

    #[test]
    fn clones_observe_cancel() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled(), "fresh token is live");
        token.cancel();
        assert!(other.is_cancelled(), "cancel is broadcast to clones");
    }

    #[test]
    fn raw_flag_cancels_token() {
        let token = CancelToken::new();
        token.flag().store(true, std::sync::atomic::Ordering::Release);
        assert!(token.is_cancelled(), "signal handlers write the raw flag");
    }
}
