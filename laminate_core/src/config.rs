// Copyright 2026 the Laminate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compositor configuration.
//!
//! [`CompositorConfig::reference`] reproduces the historical behavior of the
//! pipeline: three buffers per surface, a legacy plane-set on the first cycle,
//! commit even when the test commit fails, release buffers as soon as the
//! flip completes, and wait for completion forever.
//!
//! [`CompositorConfig::hardened`] is the production preset: a failed test
//! commit skips the cycle, buffers stay locked until the *next* flip has
//! replaced them on screen, the completion wait has a timeout, and transient
//! wait errors are retried.

use std::time::Duration;

/// What to do when the test-only commit rejects the staged batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValidationPolicy {
    /// Log a warning and submit the real commit anyway.
    Proceed,
    /// Release the collected buffers and skip this cycle.
    SkipCycle,
}

/// When collected buffers are handed back to their producers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RetirePolicy {
    /// Release this cycle's buffers once its flip completes.
    ///
    /// The buffers just flipped on screen become writable again, so a fast
    /// producer may tear the visible image.
    Immediate,
    /// Keep this cycle's buffers locked and release the previous cycle's,
    /// which the completed flip has just taken off screen.
    ///
    /// Needs one more buffer per chain than [`Immediate`](Self::Immediate).
    Deferred,
}

impl RetirePolicy {
    /// Smallest chain length that lets a producer make progress: one slot
    /// rendering, one front, plus the locked slots the scheduler holds.
    #[must_use]
    pub const fn min_chain_length(self) -> usize {
        match self {
            Self::Immediate => 2,
            Self::Deferred => 4,
        }
    }
}

/// Bounded exponential backoff for transient completion-wait errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RetryPolicy {
    /// Retries after the first failure. Zero surfaces the first error.
    pub max_retries: u32,
    /// Sleep before the first retry; doubled on each further retry.
    pub initial_backoff: Duration,
    /// Cap on the doubled sleep.
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Never retry.
    pub const NONE: Self = Self {
        max_retries: 0,
        initial_backoff: Duration::ZERO,
        max_backoff: Duration::ZERO,
    };

    /// Sleep before retry number `attempt` (zero-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1_u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Configuration for plane allocation and the commit scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CompositorConfig {
    /// Overlay count the stacking-order scheme reserves room for. Overlay `i`
    /// gets order `max_overlays - i`.
    pub max_overlays: u32,
    /// Scan-out buffers allocated per surface.
    pub chain_length: usize,
    /// Perform a legacy (non-atomic) plane-set for every plane on the first
    /// cycle.
    pub legacy_bootstrap: bool,
    /// Reaction to a failed test-only commit.
    pub validation: ValidationPolicy,
    /// When buffers go back to their producers.
    pub retire: RetirePolicy,
    /// Give up waiting for completion after this long. `None` waits forever.
    pub completion_timeout: Option<Duration>,
    /// Retry policy for completion-wait errors.
    pub wait_retry: RetryPolicy,
    /// Stop [`run`](crate::scheduler::CommitScheduler::run) after this many
    /// failed cycles in a row. `None` keeps going.
    pub max_consecutive_failures: Option<u32>,
}

impl CompositorConfig {
    /// Historical behavior.
    #[must_use]
    pub const fn reference() -> Self {
        Self {
            max_overlays: 4,
            chain_length: 3,
            legacy_bootstrap: true,
            validation: ValidationPolicy::Proceed,
            retire: RetirePolicy::Immediate,
            completion_timeout: None,
            wait_retry: RetryPolicy::NONE,
            max_consecutive_failures: None,
        }
    }

    /// Production preset.
    #[must_use]
    pub const fn hardened() -> Self {
        Self {
            max_overlays: 4,
            chain_length: 4,
            legacy_bootstrap: false,
            validation: ValidationPolicy::SkipCycle,
            retire: RetirePolicy::Deferred,
            completion_timeout: Some(Duration::from_millis(100)),
            wait_retry: RetryPolicy {
                max_retries: 3,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(16),
            },
            max_consecutive_failures: Some(120),
        }
    }

    /// Checks the configuration for combinations that would deadlock or
    /// never make progress.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let min = self.retire.min_chain_length();
        if self.chain_length < min {
            return Err(ConfigError::ChainTooShort {
                chain_length: self.chain_length,
                min,
                retire: self.retire,
            });
        }
        if self.completion_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.max_consecutive_failures == Some(0) {
            return Err(ConfigError::ZeroFailureBudget);
        }
        Ok(())
    }
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self::reference()
    }
}

/// An inconsistent [`CompositorConfig`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Not enough buffers for the retire policy.
    #[error("chain length {chain_length} is below the minimum of {min} for {retire:?} release")]
    ChainTooShort {
        /// Configured length.
        chain_length: usize,
        /// Minimum for the policy.
        min: usize,
        /// The policy in effect.
        retire: RetirePolicy,
    },
    /// A zero completion timeout would fail every cycle.
    #[error("completion timeout must be non-zero")]
    ZeroTimeout,
    /// A zero failure budget would stop before the first cycle.
    #[error("max consecutive failures must be non-zero")]
    ZeroFailureBudget,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_validate() {
        assert_eq!(CompositorConfig::reference().validate(), Ok(()));
        assert_eq!(CompositorConfig::hardened().validate(), Ok(()));
    }

    #[test]
    fn deferred_release_needs_four_buffers() {
        let config = CompositorConfig {
            retire: RetirePolicy::Deferred,
            ..CompositorConfig::reference()
        };
        assert!(
            matches!(
                config.validate(),
                Err(ConfigError::ChainTooShort { min: 4, .. })
            ),
            "three buffers cannot feed deferred release"
        );
    }

    #[test]
    fn zero_timeout_rejected() {
        let config = CompositorConfig {
            completion_timeout: Some(Duration::ZERO),
            ..CompositorConfig::hardened()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroTimeout));
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let retry = CompositorConfig::hardened().wait_retry;
        assert_eq!(retry.backoff(0), Duration::from_millis(1));
        assert_eq!(retry.backoff(1), Duration::from_millis(2));
        assert_eq!(retry.backoff(3), Duration::from_millis(8));
        assert_eq!(retry.backoff(10), Duration::from_millis(16), "capped");
        assert_eq!(retry.backoff(40), Duration::from_millis(16), "no overflow");
    }
}
