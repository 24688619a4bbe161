//! Flow definition: a versioned, validated graph of routing nodes.

use serde::{Deserialize, Serialize};

use crate::{
    CallflowError, Result,
    common::Vars,
    model::node::{EntryNode, Node},
};

/// A complete routing flow definition for one campaign or use case.
///
/// Versions are immutable; a new version is a new `Flow` value, never a
/// mutation of an existing one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub entry: EntryNode,
    pub nodes: Vec<Node>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Vars>,
}

impl Flow {
    pub fn from_json(s: &str) -> Result<Self> {
        let flow = serde_json::from_str::<Flow>(s);
        match flow {
            Ok(v) => Ok(v),
            Err(e) => Err(CallflowError::Convert(format!("invalid flow: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_from_json() {
        let flow = Flow::from_json(
            r#"{
            "id": "f1",
            "name": "Flow One",
            "version": "1.0.0",
            "entry": {"id": "entry-1", "type": "entry", "target": "hangup-1"},
            "nodes": [{"id": "hangup-1", "type": "hangup"}]
        }"#,
        )
        .unwrap();
        assert_eq!(flow.id, "f1");
        assert_eq!(flow.entry.target, "hangup-1");
        assert_eq!(flow.nodes.len(), 1);
    }

    #[test]
    fn test_flow_from_json_rejects_garbage() {
        let err = Flow::from_json("{not json").unwrap_err();
        assert!(matches!(err, CallflowError::Convert(_)));
    }

    #[test]
    fn test_flow_from_json_rejects_unknown_node_type() {
        let err = Flow::from_json(
            r#"{
            "id": "f1",
            "name": "Flow One",
            "version": "1.0.0",
            "entry": {"id": "entry-1", "type": "entry", "target": "x-1"},
            "nodes": [{"id": "x-1", "type": "teleport"}]
        }"#,
        )
        .unwrap_err();
        assert!(matches!(err, CallflowError::Convert(_)));
    }
}
