//! Retry decisions with capped exponential backoff.
//!
//! The policy is a pure function of the error kind and the attempt count. It
//! never reads the clock, so schedules are deterministic.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::RetrySettings;
use crate::error::ErrorKind;

/// Default delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1_000);
/// Default upper bound for any single delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);
/// Retries granted to reads.
pub const QUERY_MAX_RETRIES: u32 = 3;
/// Retries granted to writes.
pub const MUTATION_MAX_RETRIES: u32 = 1;

/// Which retry ceiling a call site uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallProfile {
    /// Idempotent reads.
    #[default]
    Query,
    /// Writes, which get at most one retry.
    Mutation,
}

impl fmt::Display for CallProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallProfile::Query => write!(f, "query"),
            CallProfile::Mutation => write!(f, "mutation"),
        }
    }
}

/// The outcome of consulting the policy after a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryDecision {
    pub should_retry: bool,
    /// Wait before the next attempt. Zero when `should_retry` is false.
    pub delay: Duration,
}

impl RetryDecision {
    /// Give up; settle with the error.
    pub const STOP: RetryDecision = RetryDecision {
        should_retry: false,
        delay: Duration::ZERO,
    };

    pub fn delay_ms(&self) -> u64 {
        u64::try_from(self.delay.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Configuration for retry behavior with exponential backoff.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Base delay for the first retry attempt.
    pub base_delay: Duration,
    /// Maximum delay cap for any retry attempt.
    pub max_delay: Duration,
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Kinds that are never retried.
    non_retryable: HashSet<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::query()
    }
}

impl RetryPolicy {
    /// Creates a policy with the default non-retryable kinds.
    pub fn new(base_delay: Duration, max_delay: Duration, max_retries: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            max_retries,
            non_retryable: ErrorKind::ALL
                .into_iter()
                .filter(|kind| kind.is_caller_fixable())
                .collect(),
        }
    }

    /// The ceiling used for reads: three retries.
    pub fn query() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY, QUERY_MAX_RETRIES)
    }

    /// The ceiling used for writes: one retry.
    pub fn mutation() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY, MUTATION_MAX_RETRIES)
    }

    /// A policy that settles on the first failure.
    pub fn never() -> Self {
        Self::query().with_max_retries(0)
    }

    /// Builds a policy for `profile` from loaded settings.
    pub fn from_settings(settings: &RetrySettings, profile: CallProfile) -> Self {
        let max_retries = match profile {
            CallProfile::Query => settings.query_max_retries,
            CallProfile::Mutation => settings.mutation_max_retries,
        };
        Self::new(
            Duration::from_millis(settings.base_delay_ms),
            Duration::from_millis(settings.max_delay_ms),
            max_retries,
        )
        .with_non_retryable(settings.non_retryable.iter().copied())
    }

    /// Sets the retry ceiling.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Replaces the set of kinds that are never retried.
    pub fn with_non_retryable(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.non_retryable = kinds.into_iter().collect();
        self
    }

    /// Returns true if failures of `kind` may be retried at all.
    pub fn should_retry(&self, kind: ErrorKind) -> bool {
        !self.non_retryable.contains(&kind)
    }

    /// Calculates the delay before retry number `attempt_index + 1`.
    ///
    /// The delay is `base_delay * 2^attempt_index`, capped at `max_delay`.
    pub fn next_delay(&self, attempt_index: u32) -> Duration {
        let exponent = attempt_index.min(63);
        let multiplier = 1u64 << exponent;
        let base_millis = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let max_millis = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(base_millis.saturating_mul(multiplier).min(max_millis))
    }

    /// Decides what to do after `attempts_made` attempts (1-based) failed with `kind`.
    pub fn decide(&self, kind: ErrorKind, attempts_made: u32) -> RetryDecision {
        if !self.should_retry(kind) || attempts_made == 0 || attempts_made > self.max_retries {
            return RetryDecision::STOP;
        }
        RetryDecision {
            should_retry: true,
            delay: self.next_delay(attempts_made - 1),
        }
    }

    /// The delays a persistently failing call of `kind` would wait through.
    pub fn schedule(&self, kind: ErrorKind) -> Vec<Duration> {
        (1..=self.max_retries)
            .map(|attempt| self.decide(kind, attempt))
            .take_while(|decision| decision.should_retry)
            .map(|decision| decision.delay)
            .collect()
    }
}
