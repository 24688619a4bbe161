//! Mutable per-call state.

use serde::{Deserialize, Serialize};

use crate::{
    common::Vars,
    model::{HangupReason, Node, NodeId},
    rotation::Reservation,
    utils,
};

/// One visited node, kept for audit and billing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub node_id: NodeId,
    pub node_type: String,
    /// RFC 3339 entry timestamp
    pub timestamp: String,
}

/// Why and where a call ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalOutcome {
    pub node_id: NodeId,
    pub reason: HangupReason,
}

/// One pending fallback scope.
///
/// While a frame is on the stack, a failure-tagged terminal inside the
/// current attempt advances to the next target instead of ending the
/// call.
#[derive(Debug, Clone)]
pub(crate) struct FallbackFrame {
    pub targets: Vec<NodeId>,
    /// index of the attempt currently running
    pub attempt: usize,
    pub on_all_failed: Option<NodeId>,
}

/// Mutable state of one live call. Owned exclusively by its session task.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub call_id: String,
    pub tenant_id: String,
    pub flow_id: String,
    pub flow_version: String,
    pub current_node_id: NodeId,
    /// variables visible to `if` conditions (`caller.number`, ...)
    pub variables: Vars,
    /// metadata accumulated by tag nodes
    pub tags: Vars,
    pub history: Vec<HistoryEntry>,
    /// DTMF digits collected by the active IVR node
    pub ivr_buffer: String,
    pub recording_url: Option<String>,
    /// buyer slot held by this call, released exactly once at exit
    pub(crate) reservation: Option<Reservation>,
    pub answered_buyer_id: Option<String>,
    /// queue this call currently waits in, left on every exit path
    pub(crate) waiting_in_queue: Option<String>,
    pub(crate) fallback_frames: Vec<FallbackFrame>,
    pub(crate) started_at_ms: i64,
}

impl ExecutionContext {
    pub fn new(
        call_id: String,
        tenant_id: String,
        flow_id: String,
        flow_version: String,
        entry_node_id: NodeId,
        variables: Vars,
    ) -> Self {
        Self {
            call_id,
            tenant_id,
            flow_id,
            flow_version,
            current_node_id: entry_node_id,
            variables,
            tags: Vars::new(),
            history: Vec::new(),
            ivr_buffer: String::new(),
            recording_url: None,
            reservation: None,
            answered_buyer_id: None,
            waiting_in_queue: None,
            fallback_frames: Vec::new(),
            started_at_ms: utils::time::time_millis(),
        }
    }

    /// Record a node visit in the call history.
    pub(crate) fn visit(
        &mut self,
        node: &Node,
    ) {
        self.current_node_id = node.id().clone();
        self.history.push(HistoryEntry {
            node_id: node.id().clone(),
            node_type: node.type_name().to_string(),
            timestamp: utils::time::timestamp(),
        });
    }

    /// Intercept a failure-tagged terminal inside an active fallback
    /// scope. Returns the node to run next, or `None` when the terminal
    /// stands (no frame, or frames exhausted without an `onAllFailed`).
    pub(crate) fn catch_failure(&mut self) -> Option<NodeId> {
        while let Some(frame) = self.fallback_frames.last_mut() {
            frame.attempt += 1;
            if let Some(target) = frame.targets.get(frame.attempt) {
                return Some(target.clone());
            }
            // this scope is exhausted
            let frame = self.fallback_frames.pop().unwrap();
            if let Some(on_all_failed) = frame.on_all_failed {
                return Some(on_all_failed);
            }
            // no handler: let an outer fallback scope catch the failure
        }
        None
    }

    pub fn duration_ms(&self) -> u64 {
        utils::time::time_millis().saturating_sub(self.started_at_ms).max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(
            "call-1".to_string(),
            "tenant-1".to_string(),
            "flow-1".to_string(),
            "1".to_string(),
            "entry-1".to_string(),
            Vars::new(),
        )
    }

    fn frame(
        targets: &[&str],
        on_all_failed: Option<&str>,
    ) -> FallbackFrame {
        FallbackFrame {
            targets: targets.iter().map(|s| s.to_string()).collect(),
            attempt: 0,
            on_all_failed: on_all_failed.map(|s| s.to_string()),
        }
    }

    #[test]
    fn test_catch_failure_advances_attempts_in_order() {
        let mut ctx = ctx();
        ctx.fallback_frames.push(frame(&["a", "b", "c"], Some("h")));

        assert_eq!(ctx.catch_failure(), Some("b".to_string()));
        assert_eq!(ctx.catch_failure(), Some("c".to_string()));
        assert_eq!(ctx.catch_failure(), Some("h".to_string()));
        assert!(ctx.fallback_frames.is_empty());
        // after the handler ran the terminal stands
        assert_eq!(ctx.catch_failure(), None);
    }

    #[test]
    fn test_exhausted_inner_scope_defers_to_outer() {
        let mut ctx = ctx();
        ctx.fallback_frames.push(frame(&["x", "y"], None));
        ctx.fallback_frames.push(frame(&["a"], None));

        // inner has no more targets and no handler; outer catches
        assert_eq!(ctx.catch_failure(), Some("y".to_string()));
        assert_eq!(ctx.fallback_frames.len(), 1);
    }

    #[test]
    fn test_no_frame_lets_terminal_stand() {
        let mut ctx = ctx();
        assert_eq!(ctx.catch_failure(), None);
    }
}
