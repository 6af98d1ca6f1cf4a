//! Provider credential state
//!
//! One `ApiKey` is the unit of capacity and health tracking: a daily usage
//! counter with lazy UTC-day reset, a consecutive-failure circuit breaker
//! with tiered timed recovery, and a small latency ring feeding the
//! selector's speed score. All mutation happens under the owning pool's
//! lock, so the fields here are plain.

use super::pool::PoolConfig;
use crate::error::ProviderErrorKind;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::VecDeque;

/// Ring buffer capacity for latency samples.
pub const LATENCY_SAMPLES: usize = 10;

/// Externally visible credential state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    /// No recent failures.
    Healthy,
    /// Failing but under the breaker threshold.
    Degraded,
    /// Recovering: a cooldown trial has been granted, or the key is
    /// failure-free but the full recovery window has not yet elapsed.
    CoolingDown,
    /// Breaker tripped (or key revoked). Ineligible until the recovery
    /// window grants a trial.
    Disabled,
}

/// One provider API key with its mutable health and usage state.
#[derive(Debug, Clone)]
pub struct ApiKey {
    id: String,
    secret: String,
    daily_capacity: u32,
    used_today: u32,
    last_reset: NaiveDate,
    consecutive_failures: u32,
    status: KeyStatus,
    revoked: bool,
    trial_inflight: bool,
    trial_started_at: Option<DateTime<Utc>>,
    last_failure_at: Option<DateTime<Utc>>,
    latencies: VecDeque<u32>,
}

impl ApiKey {
    pub fn new(
        id: impl Into<String>,
        secret: impl Into<String>,
        daily_capacity: u32,
        today: NaiveDate,
    ) -> Self {
        Self {
            id: id.into(),
            secret: secret.into(),
            daily_capacity,
            used_today: 0,
            last_reset: today,
            consecutive_failures: 0,
            status: KeyStatus::Healthy,
            revoked: false,
            trial_inflight: false,
            trial_started_at: None,
            last_failure_at: None,
            latencies: VecDeque::with_capacity(LATENCY_SAMPLES),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn status(&self) -> KeyStatus {
        self.status
    }

    pub fn daily_capacity(&self) -> u32 {
        self.daily_capacity
    }

    pub fn used_today(&self) -> u32 {
        self.used_today
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked
    }

    /// Mean of the recent latency samples, if any were recorded.
    pub fn avg_latency_ms(&self) -> Option<f64> {
        if self.latencies.is_empty() {
            return None;
        }
        let sum: u64 = self.latencies.iter().map(|&ms| ms as u64).sum();
        Some(sum as f64 / self.latencies.len() as f64)
    }

    pub fn quota_exhausted(&self) -> bool {
        self.used_today >= self.daily_capacity
    }

    /// Lazy bookkeeping performed on every acquisition: daily quota reset
    /// and promotion out of the recovery probation once the full window has
    /// elapsed failure-free.
    pub fn refresh(&mut self, now: DateTime<Utc>, config: &PoolConfig) {
        let today = now.date_naive();
        if today != self.last_reset {
            self.used_today = 0;
            self.last_reset = today;
        }

        // A trial whose outcome was never recorded (the caller was
        // cancelled between acquire and the outcome) expires after another
        // recovery window; the key goes back to waiting for a fresh trial
        // instead of staying blocked forever.
        if self.trial_inflight {
            let expired = self
                .trial_started_at
                .is_some_and(|at| now - at >= config.recovery_window());
            if expired {
                self.trial_inflight = false;
                self.trial_started_at = None;
                self.status = KeyStatus::Disabled;
            }
        }

        if self.status == KeyStatus::CoolingDown && !self.trial_inflight {
            let fully_recovered = match self.last_failure_at {
                Some(at) => now - at >= config.full_recovery_window(),
                None => true,
            };
            if fully_recovered {
                self.status = KeyStatus::Healthy;
            }
        }
    }

    /// Whether a disabled key has waited out the recovery window and may be
    /// granted a single trial.
    pub fn trial_eligible(&self, now: DateTime<Utc>, config: &PoolConfig) -> bool {
        if self.status != KeyStatus::Disabled || self.revoked {
            return false;
        }
        match self.last_failure_at {
            Some(at) => now - at >= config.recovery_window(),
            None => true,
        }
    }

    /// Whether the selector may pick this key right now.
    pub fn selectable(&self, now: DateTime<Utc>, config: &PoolConfig) -> bool {
        if self.revoked || self.quota_exhausted() {
            return false;
        }
        match self.status {
            KeyStatus::Healthy | KeyStatus::Degraded => true,
            // A trial in flight blocks further selection until its outcome
            // is recorded
            KeyStatus::CoolingDown => !self.trial_inflight,
            KeyStatus::Disabled => self.trial_eligible(now, config),
        }
    }

    /// Consume one unit of daily capacity; grants the cooldown trial when
    /// the key was selected out of the Disabled state.
    pub fn begin_lease(&mut self, now: DateTime<Utc>) {
        self.used_today += 1;
        if self.status == KeyStatus::Disabled {
            self.status = KeyStatus::CoolingDown;
            self.trial_inflight = true;
            self.trial_started_at = Some(now);
        }
    }

    /// Record a successful provider call.
    pub fn record_success(&mut self, latency_ms: u32, now: DateTime<Utc>, config: &PoolConfig) {
        self.consecutive_failures = 0;
        self.trial_inflight = false;
        self.trial_started_at = None;

        if self.latencies.len() == LATENCY_SAMPLES {
            self.latencies.pop_front();
        }
        self.latencies.push_back(latency_ms);

        if self.revoked {
            return;
        }
        match self.status {
            KeyStatus::Degraded => self.status = KeyStatus::Healthy,
            KeyStatus::CoolingDown | KeyStatus::Disabled => {
                let fully_recovered = match self.last_failure_at {
                    Some(at) => now - at >= config.full_recovery_window(),
                    None => true,
                };
                self.status = if fully_recovered {
                    KeyStatus::Healthy
                } else {
                    KeyStatus::CoolingDown
                };
            }
            KeyStatus::Healthy => {}
        }
    }

    /// Record a failed provider call. Returns `true` when this failure
    /// disabled the key.
    pub fn record_failure(
        &mut self,
        kind: ProviderErrorKind,
        now: DateTime<Utc>,
        config: &PoolConfig,
    ) -> bool {
        self.trial_inflight = false;
        self.trial_started_at = None;
        match kind {
            ProviderErrorKind::Transient => {
                self.consecutive_failures += 1;
                self.last_failure_at = Some(now);
                if self.consecutive_failures >= config.failure_threshold {
                    let tripped = self.status != KeyStatus::Disabled;
                    self.status = KeyStatus::Disabled;
                    tripped
                } else {
                    self.status = KeyStatus::Degraded;
                    false
                }
            }
            // Quota exhaustion is ineligibility, not unhealth: burn the
            // remaining capacity without touching the failure counter
            ProviderErrorKind::QuotaExceeded => {
                self.used_today = self.daily_capacity;
                false
            }
            // No timed recovery from a revoked key; an operator has to
            // rotate it
            ProviderErrorKind::AuthFailed => {
                self.revoked = true;
                self.last_failure_at = Some(now);
                let tripped = self.status != KeyStatus::Disabled;
                self.status = KeyStatus::Disabled;
                tripped
            }
        }
    }
}
