//! Daily rate limiting — per-campaign, per-UTC-day action counters.

use chrono::NaiveDate;
use dashmap::DashMap;
use uuid::Uuid;

/// Admits or denies actions against a campaign's daily cap. The
/// check-and-increment happens under a single map entry guard, so
/// concurrent reservations for the same campaign/day can never push the
/// counter past the limit.
pub struct DailyRateLimiter {
    counters: DashMap<(Uuid, NaiveDate), u32>,
}

impl DailyRateLimiter {
    pub fn new() -> Self {
        Self {
            counters: DashMap::new(),
        }
    }

    /// Atomically reserves one action slot for `campaign_id` on `day`.
    /// Returns `false` (and leaves the counter untouched) when the cap is
    /// reached. Denial is a deferral signal, not an error.
    pub fn try_reserve(&self, campaign_id: Uuid, day: NaiveDate, limit: u32) -> bool {
        if limit == 0 {
            return false;
        }
        let mut count = self.counters.entry((campaign_id, day)).or_insert(0);
        if *count < limit {
            *count += 1;
            true
        } else {
            false
        }
    }

    /// Actions charged so far for the campaign/day.
    pub fn count(&self, campaign_id: Uuid, day: NaiveDate) -> u32 {
        self.counters
            .get(&(campaign_id, day))
            .map(|c| *c)
            .unwrap_or(0)
    }

    /// Drops counters older than `day`. Day boundaries are UTC for the
    /// life of the engine, so old keys are dead weight.
    pub fn prune_before(&self, day: NaiveDate) {
        self.counters.retain(|(_, d), _| *d >= day);
    }
}

impl Default for DailyRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
