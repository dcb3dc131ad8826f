// Rate Limiter
// Token buckets gating remote escalation, one per quality tier

use crate::models::QualityTier;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketLimits {
    pub max_tokens: u32,
    pub refill_interval_ms: u64,
}

impl BucketLimits {
    pub const fn new(max_tokens: u32, refill_interval_ms: u64) -> Self {
        Self {
            max_tokens,
            refill_interval_ms,
        }
    }

    pub fn for_tier(tier: QualityTier) -> Self {
        match tier {
            QualityTier::Low => Self::new(5, 60_000),
            QualityTier::Medium => Self::new(15, 60_000),
            QualityTier::High => Self::new(30, 60_000),
        }
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: u32,
    last_refill: Instant,
}

#[derive(Debug)]
pub struct TokenBucket {
    max_tokens: u32,
    refill_interval: Duration,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Starts full.
    pub fn new(limits: BucketLimits) -> Self {
        Self::new_at(limits, Instant::now())
    }

    pub fn new_at(limits: BucketLimits, now: Instant) -> Self {
        Self {
            max_tokens: limits.max_tokens,
            refill_interval: Duration::from_millis(limits.refill_interval_ms.max(1)),
            state: Mutex::new(BucketState {
                tokens: limits.max_tokens,
                last_refill: now,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill);
        if elapsed < self.refill_interval {
            return;
        }
        let intervals = (elapsed.as_millis() / self.refill_interval.as_millis()) as u64;
        let added = intervals.saturating_mul(u64::from(self.max_tokens));
        let refilled = (u64::from(state.tokens) + added).min(u64::from(self.max_tokens));
        state.tokens = refilled as u32;
        // Keep the partial interval so a steady caller is not short-changed.
        let advance = self.refill_interval.saturating_mul(intervals.min(u32::MAX as u64) as u32);
        state.last_refill += advance;
    }

    pub fn try_consume(&self, n: u32) -> bool {
        self.try_consume_at(n, Instant::now())
    }

    pub fn try_consume_at(&self, n: u32, now: Instant) -> bool {
        let mut state = self.lock();
        self.refill(&mut state, now);
        if state.tokens >= n {
            state.tokens -= n;
            true
        } else {
            debug!(
                "[RATE_LIMIT] refused n={} available={} max={}",
                n, state.tokens, self.max_tokens
            );
            false
        }
    }

    /// Refund tokens taken for a call that did not complete.
    pub fn return_tokens(&self, n: u32) {
        let mut state = self.lock();
        state.tokens = state.tokens.saturating_add(n).min(self.max_tokens);
    }

    pub fn available(&self) -> u32 {
        self.lock().tokens
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}

/// One bucket per quality tier; higher tiers carry a larger budget.
#[derive(Debug)]
pub struct TierRateLimiters {
    low: TokenBucket,
    medium: TokenBucket,
    high: TokenBucket,
}

impl Default for TierRateLimiters {
    fn default() -> Self {
        Self::new(
            BucketLimits::for_tier(QualityTier::Low),
            BucketLimits::for_tier(QualityTier::Medium),
            BucketLimits::for_tier(QualityTier::High),
        )
    }
}

impl TierRateLimiters {
    pub fn new(low: BucketLimits, medium: BucketLimits, high: BucketLimits) -> Self {
        Self {
            low: TokenBucket::new(low),
            medium: TokenBucket::new(medium),
            high: TokenBucket::new(high),
        }
    }

    pub fn for_tier(&self, tier: QualityTier) -> &TokenBucket {
        match tier {
            QualityTier::Low => &self.low,
            QualityTier::Medium => &self.medium,
            QualityTier::High => &self.high,
        }
    }
}
