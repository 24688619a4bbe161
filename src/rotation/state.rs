//! Live rotation counters for one (tenant, buyer node) pair.

use std::collections::HashMap;

use chrono::NaiveDate;
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::model::BuyerTarget;

/// Live counters for one buyer target.
#[derive(Debug, Clone)]
pub(crate) struct TargetCounters {
    /// calls currently bridged to this target
    pub live: u32,
    /// calls placed today, tenant-local
    pub today: u32,
    /// day the `today` counter belongs to
    pub day: NaiveDate,
}

impl TargetCounters {
    fn new(day: NaiveDate) -> Self {
        Self {
            live: 0,
            today: 0,
            day,
        }
    }

    /// Reset the daily counter when the tenant-local date has rolled over.
    pub fn roll_day(
        &mut self,
        today: NaiveDate,
    ) {
        if self.day != today {
            self.day = today;
            self.today = 0;
        }
    }
}

/// Mutable rotation state for one (tenant, buyer node) pair.
///
/// Always accessed under the allocator's per-node mutex; the cursor, the
/// RNG and every counter mutation share that single critical section.
pub(crate) struct RotationState {
    /// round-robin cursor, persisted across calls
    pub cursor: usize,
    /// weighted-draw RNG, optionally fixed-seeded for reproducibility
    pub rng: StdRng,
    /// per-target counters keyed by target id
    counters: HashMap<String, TargetCounters>,
    /// outstanding reservation tokens mapped to their target id
    active: HashMap<String, String>,
}

impl RotationState {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self {
            cursor: 0,
            rng,
            counters: HashMap::new(),
            active: HashMap::new(),
        }
    }

    /// Counters for a target, created lazily and day-rolled.
    pub fn counters_mut(
        &mut self,
        target_id: &str,
        today: NaiveDate,
    ) -> &mut TargetCounters {
        let counters = self.counters.entry(target_id.to_string()).or_insert_with(|| TargetCounters::new(today));
        counters.roll_day(today);
        counters
    }

    pub fn live(
        &self,
        target_id: &str,
    ) -> u32 {
        self.counters.get(target_id).map(|c| c.live).unwrap_or(0)
    }

    pub fn today(
        &self,
        target_id: &str,
        today: NaiveDate,
    ) -> u32 {
        match self.counters.get(target_id) {
            Some(c) if c.day == today => c.today,
            _ => 0,
        }
    }

    /// True when the target has headroom under both of its caps.
    pub fn under_caps(
        &mut self,
        target: &BuyerTarget,
        today: NaiveDate,
    ) -> bool {
        let counters = self.counters_mut(&target.id, today);
        if let Some(max) = target.max_concurrency
            && counters.live >= max
        {
            return false;
        }
        if let Some(max) = target.max_daily_calls
            && counters.today >= max
        {
            return false;
        }
        true
    }

    /// Record a successful reservation: bump both counters and remember
    /// the token so release is one-shot.
    pub fn commit(
        &mut self,
        token: &str,
        target_id: &str,
        today: NaiveDate,
    ) {
        let counters = self.counters_mut(target_id, today);
        counters.live += 1;
        counters.today += 1;
        self.active.insert(token.to_string(), target_id.to_string());
    }

    /// Consume a reservation token. Returns the target id the first time
    /// and `None` for a token already released or never issued.
    pub fn take_token(
        &mut self,
        token: &str,
    ) -> Option<String> {
        self.active.remove(token)
    }

    pub fn decrement_live(
        &mut self,
        target_id: &str,
    ) {
        if let Some(counters) = self.counters.get_mut(target_id) {
            counters.live = counters.live.saturating_sub(1);
        }
    }

    /// Weighted pick over the eligible targets: cumulative-weight binary
    /// search over a pseudo-random draw. Deterministic given the seed.
    pub fn weighted_pick(
        &mut self,
        weights: &[u32],
    ) -> usize {
        let mut cumulative: Vec<u64> = Vec::with_capacity(weights.len());
        let mut total: u64 = 0;
        for w in weights {
            // zero-weight targets stay selectable, just never preferred
            total += (*w).max(1) as u64;
            cumulative.push(total);
        }
        let draw = self.rng.gen_range(0..total);
        cumulative.partition_point(|&c| c <= draw)
    }
}
