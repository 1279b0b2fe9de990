// SPDX-License-Identifier: MPL-2.0

//! Reconnect backoff policy.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackoffStrategy {
    /// Always `base_delay`.
    Constant,
    /// `base_delay * attempt`.
    Linear,
    /// `base_delay * 2^(attempt - 1)`.
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Jitter {
    None,
    /// Uniform in `[0, d]`.
    Full,
    /// `d/2` plus uniform in `[0, d/2]`.
    Equal,
}

/// When and how often a lost connection is retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub strategy: BackoffStrategy,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// 0 retries forever.
    pub max_attempts: u32,
    pub jitter: Jitter,
    /// Also retry after the broker refused CONNECT.
    pub retry_on_refused: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: BackoffStrategy::Exponential,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_attempts: 0,
            jitter: Jitter::Equal,
            retry_on_refused: false,
        }
    }
}

impl ReconnectPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn constant(delay: Duration) -> Self {
        Self {
            strategy: BackoffStrategy::Constant,
            base_delay_ms: delay.as_millis() as u64,
            max_delay_ms: delay.as_millis() as u64,
            jitter: Jitter::None,
            ..Self::default()
        }
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// True once `attempts` retries have been used up.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        !self.enabled || (self.max_attempts > 0 && attempts >= self.max_attempts)
    }

    /// Delay before jitter for the 1-based `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1) as u64;
        let base = self.base_delay_ms;
        let delay_ms = match self.strategy {
            BackoffStrategy::Constant => base,
            BackoffStrategy::Linear => base.saturating_mul(attempt),
            // exponent capped at 16 to avoid overflow
            BackoffStrategy::Exponential => base.saturating_mul(1u64 << (attempt - 1).min(16)),
        };
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }

    /// Backoff for `attempt` with jitter applied.
    pub fn delay_for_attempt<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let d = self.backoff(attempt).as_millis() as u64;
        let ms = match self.jitter {
            Jitter::None => d,
            Jitter::Full => rng.gen_range(0..=d),
            Jitter::Equal => d / 2 + rng.gen_range(0..=d / 2),
        };
        Duration::from_millis(ms)
    }
}
