//! Per-step retry and timeout budgets.
//!
//! Each workflow step owns an independent budget: a wall-clock timeout per
//! attempt, a maximum attempt count, and jittered exponential backoff
//! between attempts. A timed-out attempt counts against the budget like any
//! other transient failure.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::jobs::StepName;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Wall-clock limit for a single attempt.
    pub timeout_secs: u64,
}

impl RetryConfig {
    pub fn single_attempt(timeout_secs: u64) -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
            timeout_secs,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            timeout_secs: 60,
        }
    }
}

/// Backoff before the next attempt: exponential in the attempt number,
/// capped, with up to 10% additive jitter to spread concurrent retries.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(16);
    let exponential = config
        .base_delay_ms
        .saturating_mul(1u64 << shift)
        .min(config.max_delay_ms);
    let jitter = if exponential > 0 {
        rand::rng().random_range(0..=exponential / 10)
    } else {
        0
    };
    Duration::from_millis(exponential + jitter)
}

/// The independent budgets for every workflow step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepBudgets {
    pub lookup: RetryConfig,
    pub pre_checks: RetryConfig,
    pub delivery: RetryConfig,
    pub invoke: RetryConfig,
    pub wait: RetryConfig,
    pub post_actions: RetryConfig,
}

impl StepBudgets {
    pub fn for_step(&self, step: StepName) -> &RetryConfig {
        match step {
            StepName::Lookup => &self.lookup,
            StepName::PreChecks => &self.pre_checks,
            StepName::Delivery => &self.delivery,
            StepName::Invoke => &self.invoke,
            StepName::Wait => &self.wait,
            StepName::PostActions => &self.post_actions,
        }
    }
}

impl Default for StepBudgets {
    fn default() -> Self {
        Self {
            lookup: RetryConfig {
                max_attempts: 3,
                base_delay_ms: 500,
                max_delay_ms: 5_000,
                timeout_secs: 60,
            },
            // Pre-check failures are terminal, so a single attempt suffices;
            // the budget still bounds runaway validation.
            pre_checks: RetryConfig::single_attempt(60),
            delivery: RetryConfig {
                max_attempts: 5,
                base_delay_ms: 1_000,
                max_delay_ms: 60_000,
                timeout_secs: 300,
            },
            invoke: RetryConfig {
                max_attempts: 5,
                base_delay_ms: 1_000,
                max_delay_ms: 60_000,
                timeout_secs: 300,
            },
            wait: RetryConfig {
                max_attempts: 3,
                base_delay_ms: 2_000,
                max_delay_ms: 60_000,
                timeout_secs: 600,
            },
            post_actions: RetryConfig::single_attempt(60),
        }
    }
}
