//! Flow validation: reference integrity for routing graphs.
//!
//! Validation is pure. It rejects duplicate node ids and any edge that
//! points at a node id not present in the flow, reporting the offending
//! node and the dangling target. It performs no cycle detection; cycles
//! are legal (a queue timeout may loop back to an earlier IVR) and are
//! bounded by runtime guards instead.

use std::collections::HashSet;

use crate::{
    CallflowError, Result,
    model::flow::Flow,
};

/// A flow whose references have all been checked.
///
/// The only way to obtain one is [`validate`], so `compile` can assume
/// reference integrity.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidFlow(Flow);

impl ValidFlow {
    pub fn flow(&self) -> &Flow {
        &self.0
    }

    pub fn into_inner(self) -> Flow {
        self.0
    }
}

/// Validate a flow's node ids and reference integrity.
pub fn validate(flow: Flow) -> Result<ValidFlow> {
    let mut node_ids: HashSet<&str> = HashSet::with_capacity(flow.nodes.len());
    for node in &flow.nodes {
        if !node_ids.insert(node.id()) {
            return Err(CallflowError::DuplicateNodeId(node.id().clone()));
        }
    }

    if !node_ids.contains(flow.entry.target.as_str()) {
        return Err(CallflowError::EntryTargetMissing(flow.entry.target.clone()));
    }

    for node in &flow.nodes {
        for target in node.references() {
            if !node_ids.contains(target.as_str()) {
                return Err(CallflowError::DanglingReference {
                    node_id: node.id().clone(),
                    target: target.clone(),
                });
            }
        }
    }

    Ok(ValidFlow(flow))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow(json: &str) -> Flow {
        Flow::from_json(json).unwrap()
    }

    #[test]
    fn test_validate_accepts_resolvable_flow() {
        let f = flow(
            r#"{
            "id": "f", "name": "F", "version": "1.0.0",
            "entry": {"id": "entry-1", "type": "entry", "target": "tag-1"},
            "nodes": [
                {"id": "tag-1", "type": "tag", "tags": {"a": 1}, "next": "hangup-1"},
                {"id": "hangup-1", "type": "hangup"}
            ]
        }"#,
        );
        assert!(validate(f).is_ok());
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let f = flow(
            r#"{
            "id": "f", "name": "F", "version": "1.0.0",
            "entry": {"id": "entry-1", "type": "entry", "target": "tag-1"},
            "nodes": [
                {"id": "tag-1", "type": "tag", "tags": {}},
                {"id": "tag-1", "type": "tag", "tags": {}}
            ]
        }"#,
        );
        assert_eq!(validate(f).unwrap_err(), CallflowError::DuplicateNodeId("tag-1".to_string()));
    }

    #[test]
    fn test_validate_reports_offending_node_and_target() {
        let f = flow(
            r#"{
            "id": "f", "name": "F", "version": "1.0.0",
            "entry": {"id": "entry-1", "type": "entry", "target": "if-1"},
            "nodes": [
                {"id": "if-1", "type": "if", "condition": "true", "then": "missing-node"}
            ]
        }"#,
        );
        assert_eq!(
            validate(f).unwrap_err(),
            CallflowError::DanglingReference {
                node_id: "if-1".to_string(),
                target: "missing-node".to_string(),
            }
        );
    }

    #[test]
    fn test_validate_rejects_unresolvable_entry_target() {
        let f = flow(
            r#"{
            "id": "f", "name": "F", "version": "1.0.0",
            "entry": {"id": "entry-1", "type": "entry", "target": "nowhere"},
            "nodes": [{"id": "hangup-1", "type": "hangup"}]
        }"#,
        );
        assert_eq!(validate(f).unwrap_err(), CallflowError::EntryTargetMissing("nowhere".to_string()));
    }

    #[test]
    fn test_validate_allows_cycles() {
        // queue timeout looping back to the ivr is legal
        let f = flow(
            r#"{
            "id": "f", "name": "F", "version": "1.0.0",
            "entry": {"id": "entry-1", "type": "entry", "target": "ivr-1"},
            "nodes": [
                {"id": "ivr-1", "type": "ivr", "prompt": "menu",
                 "choices": [{"digits": "1", "target": "queue-1"}]},
                {"id": "queue-1", "type": "queue", "queueId": "q",
                 "onTimeout": "ivr-1", "onConnect": "hangup-1"},
                {"id": "hangup-1", "type": "hangup"}
            ]
        }"#,
        );
        assert!(validate(f).is_ok());
    }

    #[test]
    fn test_validate_checks_ivr_choice_targets() {
        let f = flow(
            r#"{
            "id": "f", "name": "F", "version": "1.0.0",
            "entry": {"id": "entry-1", "type": "entry", "target": "ivr-1"},
            "nodes": [
                {"id": "ivr-1", "type": "ivr", "prompt": "menu",
                 "choices": [{"digits": "1", "target": "gone"}]}
            ]
        }"#,
        );
        assert_eq!(
            validate(f).unwrap_err(),
            CallflowError::DanglingReference {
                node_id: "ivr-1".to_string(),
                target: "gone".to_string(),
            }
        );
    }
}
