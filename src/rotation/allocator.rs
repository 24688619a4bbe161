//! The rotation allocator: pick one buyer target and reserve a slot.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    ShareLock,
    config::RotationConfig,
    model::{BuyerTarget, RotationStrategy},
    rotation::state::RotationState,
    utils,
};

/// (tenant id, buyer node id)
type StateKey = (String, String);

/// One-shot token representing a held capacity slot at a buyer.
///
/// Produced only by a successful [`RotationAllocator::reserve`]; consumed
/// by [`RotationAllocator::release`]. A second release of the same token
/// is a no-op, never a decrement-below-zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub token: String,
    pub tenant_id: String,
    pub node_id: String,
    pub buyer_id: String,
    pub destination: String,
}

/// Outcome of a reservation attempt.
///
/// `NoBuyers` (nothing enabled) and `AllBusy` (enabled but capped) are
/// distinct operator-visible conditions, routed through different flow
/// edges. Neither is an error.
#[derive(Debug, Clone, PartialEq)]
pub enum RotationDecision {
    Reserved(Reservation),
    NoBuyers,
    AllBusy,
}

/// Tracks live rotation state per (tenant, buyer node) and atomically
/// reserves capacity slots.
///
/// The registry lock only guards map access; every decision runs under
/// the node's own mutex, so checking caps and incrementing counters is a
/// single critical section and two calls racing for the last slot can
/// never both succeed.
pub struct RotationAllocator {
    config: RotationConfig,
    states: ShareLock<HashMap<StateKey, Arc<Mutex<RotationState>>>>,
}

impl RotationAllocator {
    pub fn new(config: RotationConfig) -> Self {
        Self {
            config,
            states: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Select one enabled, under-cap target and reserve a slot for the
    /// current call.
    ///
    /// Target configuration is read fresh on every call; only counters
    /// and the rotation cursor persist between calls.
    pub fn reserve(
        &self,
        tenant_id: &str,
        node_id: &str,
        strategy: RotationStrategy,
        targets: &[BuyerTarget],
    ) -> RotationDecision {
        let state = self.state(tenant_id, node_id);
        let mut state = state.lock().unwrap();
        let today = utils::time::local_date(self.config.tenant_utc_offset_minutes);

        let enabled: Vec<&BuyerTarget> = targets.iter().filter(|t| t.enabled).collect();
        if enabled.is_empty() {
            return RotationDecision::NoBuyers;
        }

        // declaration order is preserved through both filters
        let eligible: Vec<&BuyerTarget> = enabled.iter().filter(|t| state.under_caps(t, today)).copied().collect();
        if eligible.is_empty() {
            return RotationDecision::AllBusy;
        }

        let chosen = match strategy {
            RotationStrategy::RoundRobin => {
                let pick = eligible[state.cursor % eligible.len()];
                state.cursor = state.cursor.wrapping_add(1);
                pick
            }
            RotationStrategy::Weighted => {
                let weights: Vec<u32> = eligible.iter().map(|t| t.weight).collect();
                eligible[state.weighted_pick(&weights)]
            }
            RotationStrategy::LeastCalls => eligible
                .iter()
                .min_by_key(|t| state.live(&t.id))
                .copied()
                .unwrap(),
        };

        let token = utils::longid();
        state.commit(&token, &chosen.id, today);
        debug!(tenant_id, node_id, buyer_id = %chosen.id, strategy = strategy.as_ref(), "reserved buyer slot");

        RotationDecision::Reserved(Reservation {
            token,
            tenant_id: tenant_id.to_string(),
            node_id: node_id.to_string(),
            buyer_id: chosen.id.clone(),
            destination: chosen.destination.clone(),
        })
    }

    /// Release a held slot. Idempotent per token.
    pub fn release(
        &self,
        reservation: &Reservation,
    ) {
        let state = self.state(&reservation.tenant_id, &reservation.node_id);
        let mut state = state.lock().unwrap();
        match state.take_token(&reservation.token) {
            Some(target_id) => {
                state.decrement_live(&target_id);
                debug!(buyer_id = %target_id, node_id = %reservation.node_id, "released buyer slot");
            }
            None => {
                warn!(token = %reservation.token, node_id = %reservation.node_id, "ignoring release of unknown or already-released reservation");
            }
        }
    }

    /// Live concurrency for one target, for operator dashboards and tests.
    pub fn live_concurrency(
        &self,
        tenant_id: &str,
        node_id: &str,
        buyer_id: &str,
    ) -> u32 {
        let state = self.state(tenant_id, node_id);
        let state = state.lock().unwrap();
        state.live(buyer_id)
    }

    /// Calls placed today (tenant-local) for one target.
    pub fn calls_today(
        &self,
        tenant_id: &str,
        node_id: &str,
        buyer_id: &str,
    ) -> u32 {
        let state = self.state(tenant_id, node_id);
        let state = state.lock().unwrap();
        let today = utils::time::local_date(self.config.tenant_utc_offset_minutes);
        state.today(buyer_id, today)
    }

    fn state(
        &self,
        tenant_id: &str,
        node_id: &str,
    ) -> Arc<Mutex<RotationState>> {
        let key = (tenant_id.to_string(), node_id.to_string());
        if let Some(state) = self.states.read().unwrap().get(&key) {
            return state.clone();
        }
        let mut states = self.states.write().unwrap();
        states.entry(key).or_insert_with(|| Arc::new(Mutex::new(RotationState::new(self.config.weighted_seed)))).clone()
    }
}
