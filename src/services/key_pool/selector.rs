//! Credential selection
//!
//! Scores every eligible key on remaining capacity, failure history, and
//! observed latency, then picks the best. Deterministic by construction:
//! ties break on lowest `used_today`, then on insertion order, so tests can
//! assert exact selection sequences.

use super::credential::ApiKey;
use super::pool::PoolConfig;
use chrono::{DateTime, Utc};

const CAPACITY_WEIGHT: f64 = 0.5;
const HEALTH_WEIGHT: f64 = 0.3;
const SPEED_WEIGHT: f64 = 0.2;

/// Speed score for a key with no latency samples yet.
const NEUTRAL_SPEED: f64 = 0.5;

/// Pick the index of the best eligible key, or `None` when every key is
/// disabled, revoked, or quota-exhausted.
pub fn select(keys: &[ApiKey], now: DateTime<Utc>, config: &PoolConfig) -> Option<usize> {
    let eligible: Vec<usize> = keys
        .iter()
        .enumerate()
        .filter(|(_, key)| key.selectable(now, config))
        .map(|(idx, _)| idx)
        .collect();
    if eligible.is_empty() {
        return None;
    }

    // Latency is normalized across the eligible set, so "fast" and "slow"
    // are relative to the keys competing right now
    let observed: Vec<f64> = eligible
        .iter()
        .filter_map(|&idx| keys[idx].avg_latency_ms())
        .collect();
    let min_latency = observed.iter().copied().fold(f64::INFINITY, f64::min);
    let max_latency = observed.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let mut best: Option<(usize, f64)> = None;
    for &idx in &eligible {
        let key = &keys[idx];
        let score = score(key, min_latency, max_latency);
        tracing::trace!(key_id = key.id(), score, "scored credential");

        let better = match best {
            None => true,
            Some((best_idx, best_score)) => {
                score > best_score
                    || (score == best_score && key.used_today() < keys[best_idx].used_today())
            }
        };
        if better {
            best = Some((idx, score));
        }
    }

    best.map(|(idx, _)| idx)
}

fn score(key: &ApiKey, min_latency: f64, max_latency: f64) -> f64 {
    let capacity = if key.daily_capacity() == 0 {
        0.0
    } else {
        (key.daily_capacity() - key.used_today()) as f64 / key.daily_capacity() as f64
    };

    let health = 1.0 / (1.0 + key.consecutive_failures() as f64);

    let speed = match key.avg_latency_ms() {
        Some(avg) if max_latency > min_latency => {
            1.0 - (avg - min_latency) / (max_latency - min_latency)
        }
        // A single shared latency value (or no samples at all) says nothing
        // about relative speed
        _ => NEUTRAL_SPEED,
    };

    CAPACITY_WEIGHT * capacity + HEALTH_WEIGHT * health + SPEED_WEIGHT * speed
}
