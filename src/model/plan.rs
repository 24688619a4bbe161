//! Compiled execution plans.
//!
//! An [`ExecutionPlan`] is the pure, indexed form of a valid flow:
//! an id-keyed node map with the entry resolved. Plans are deterministic
//! functions of their flow and safe to cache indefinitely keyed by
//! `(flow_id, flow_version)` - including across process restarts, since
//! they are plain data.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    CallflowError, Result,
    common::Vars,
    model::{
        node::{Node, NodeId},
        validate::ValidFlow,
    },
};

/// Cache key for compiled plans.
pub type PlanKey = (String, String);

/// Compiled artifact of a valid flow. No mutable state.
///
/// The node map is a `BTreeMap` so that serialization of the same flow is
/// byte-identical run to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    pub flow_id: String,
    pub flow_version: String,
    pub entry_node_id: NodeId,
    pub nodes: BTreeMap<NodeId, Node>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Vars>,
}

impl ExecutionPlan {
    /// O(log n) node lookup by id.
    pub fn get(
        &self,
        id: &str,
    ) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn key(&self) -> PlanKey {
        (self.flow_id.clone(), self.flow_version.clone())
    }
}

/// Compile a validated flow into an execution plan.
///
/// Validation has already guaranteed unique ids; duplicates are re-checked
/// defensively and raise the same error kind.
pub fn compile(valid: &ValidFlow) -> Result<ExecutionPlan> {
    let flow = valid.flow();
    let mut nodes: BTreeMap<NodeId, Node> = BTreeMap::new();

    for node in &flow.nodes {
        if nodes.insert(node.id().clone(), node.clone()).is_some() {
            return Err(CallflowError::DuplicateNodeId(node.id().clone()));
        }
    }

    Ok(ExecutionPlan {
        flow_id: flow.id.clone(),
        flow_version: flow.version.clone(),
        entry_node_id: flow.entry.target.clone(),
        nodes,
        metadata: flow.metadata.clone(),
    })
}

#[cfg(test)]
mod tests {
    use crate::model::{Flow, validate};

    use super::*;

    fn valid_flow() -> ValidFlow {
        let flow = Flow::from_json(
            r#"{
            "id": "plan-test", "name": "Plan Test", "version": "2.1.0",
            "entry": {"id": "entry-1", "type": "entry", "target": "tag-1"},
            "nodes": [
                {"id": "tag-1", "type": "tag", "tags": {"k": "v"}, "next": "hangup-1"},
                {"id": "hangup-1", "type": "hangup", "reason": "normal"}
            ]
        }"#,
        )
        .unwrap();
        validate(flow).unwrap()
    }

    #[test]
    fn test_compile_builds_indexed_plan() {
        let plan = compile(&valid_flow()).unwrap();
        assert_eq!(plan.flow_id, "plan-test");
        assert_eq!(plan.flow_version, "2.1.0");
        assert_eq!(plan.entry_node_id, "tag-1");
        assert!(plan.get("tag-1").is_some());
        assert!(plan.get("hangup-1").is_some());
        assert!(plan.get("unknown").is_none());
    }

    #[test]
    fn test_compile_is_deterministic() {
        let a = compile(&valid_flow()).unwrap();
        let b = compile(&valid_flow()).unwrap();
        assert_eq!(a, b);
        // serialized forms are byte-identical
        assert_eq!(serde_json::to_vec(&a).unwrap(), serde_json::to_vec(&b).unwrap());
    }
}
