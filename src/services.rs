//! Collaborator seams: flow storage, buyer config, admission and billing.
//!
//! The engine assumes these concerns live in other systems and only
//! defines the traits it consumes. Every trait ships with a permissive
//! in-process default so the engine runs standalone in tests and demos.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    Result, ShareLock,
    common::Vars,
    model::{BuyerNode, BuyerTarget, Flow, HangupReason},
    runtime::HistoryEntry,
};

/// Source of published flow definitions, keyed by tenant and flow id.
#[async_trait]
pub trait FlowStore: Send + Sync {
    async fn published_flow(
        &self,
        tenant_id: &str,
        flow_id: &str,
    ) -> Result<Option<Flow>>;
}

/// In-memory flow store, also the engine's deploy target.
#[derive(Clone, Default)]
pub struct MemoryFlowStore {
    flows: ShareLock<HashMap<(String, String), Flow>>,
}

impl MemoryFlowStore {
    pub fn new() -> Self {
        Self {
            flows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn publish(
        &self,
        tenant_id: &str,
        flow: Flow,
    ) {
        let key = (tenant_id.to_string(), flow.id.clone());
        self.flows.write().unwrap().insert(key, flow);
    }

    /// Synchronous lookup for callers already holding the runtime.
    pub fn find(
        &self,
        tenant_id: &str,
        flow_id: &str,
    ) -> Option<Flow> {
        let key = (tenant_id.to_string(), flow_id.to_string());
        self.flows.read().unwrap().get(&key).cloned()
    }
}

#[async_trait]
impl FlowStore for MemoryFlowStore {
    async fn published_flow(
        &self,
        tenant_id: &str,
        flow_id: &str,
    ) -> Result<Option<Flow>> {
        let key = (tenant_id.to_string(), flow_id.to_string());
        Ok(self.flows.read().unwrap().get(&key).cloned())
    }
}

/// Live buyer configuration lookup.
///
/// A buyer node declares its targets inline; directories backed by a
/// campaign-management system may override weights, caps or enablement
/// at call time.
#[async_trait]
pub trait BuyerDirectory: Send + Sync {
    async fn resolve(
        &self,
        tenant_id: &str,
        node: &BuyerNode,
    ) -> Result<Vec<BuyerTarget>>;
}

/// Directory that trusts the targets declared in the flow.
#[derive(Clone, Copy, Default)]
pub struct DeclaredBuyers;

#[async_trait]
impl BuyerDirectory for DeclaredBuyers {
    async fn resolve(
        &self,
        _tenant_id: &str,
        node: &BuyerNode,
    ) -> Result<Vec<BuyerTarget>> {
        Ok(node.buyers.clone())
    }
}

/// Verdict of the admission gate, checked before every buyer dial.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Allowed,
    Denied {
        reason: String,
    },
}

/// Pre-dial compliance/admission hook (DNC lists, fraud scoring, consent).
#[async_trait]
pub trait AdmissionGate: Send + Sync {
    async fn check_admission(
        &self,
        tenant_id: &str,
        caller: &str,
        buyer_id: &str,
    ) -> Result<Admission>;
}

/// Gate that admits every call.
#[derive(Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl AdmissionGate for AllowAll {
    async fn check_admission(
        &self,
        _tenant_id: &str,
        _caller: &str,
        _buyer_id: &str,
    ) -> Result<Admission> {
        Ok(Admission::Allowed)
    }
}

/// Billing record emitted exactly once per terminated call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSummary {
    pub call_id: String,
    pub tenant_id: String,
    pub flow_id: String,
    pub flow_version: String,
    /// wall-clock call duration in milliseconds
    pub duration_ms: u64,
    /// buyer the call was bridged to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answered_buyer_id: Option<String>,
    pub recorded: bool,
    pub reason: HangupReason,
    pub tags: Vars,
    pub history: Vec<HistoryEntry>,
}

/// Sink for per-call billing summaries.
#[async_trait]
pub trait BillingEmitter: Send + Sync {
    async fn emit(
        &self,
        summary: CallSummary,
    ) -> Result<()>;
}

/// Emitter that only logs the summary.
#[derive(Clone, Copy, Default)]
pub struct LogBilling;

#[async_trait]
impl BillingEmitter for LogBilling {
    async fn emit(
        &self,
        summary: CallSummary,
    ) -> Result<()> {
        info!(
            call_id = %summary.call_id,
            flow_id = %summary.flow_id,
            reason = summary.reason.as_ref(),
            duration_ms = summary.duration_ms,
            "call completed"
        );
        Ok(())
    }
}
