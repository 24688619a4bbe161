//! Flow node definitions.
//!
//! A [`Node`] is one step in a routing flow, represented as a tagged union
//! discriminated by the `type` field of the JSON document. Wire field
//! names follow the flow language (`maxDigits`, `onTimeout`, ...), so the
//! structs deserialize the same documents the dashboard's flow builder
//! publishes. Nodes are immutable once a flow version is published.

use serde::{Deserialize, Serialize};

use crate::common::Vars;

/// node id, unique within a flow
pub type NodeId = String;

fn default_weight() -> u32 {
    1
}

fn default_enabled() -> bool {
    true
}

/// Starting point of a flow; transitions immediately to `target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryNode {
    pub id: NodeId,
    /// id of the first node to execute
    pub target: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<NodeId>,
}

/// One DTMF choice of an IVR menu.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IvrChoice {
    /// DTMF digits to match exactly (e.g. "1", "2", "*")
    pub digits: String,
    /// node id to go to on match
    pub target: NodeId,
}

/// Interactive voice response menu collecting DTMF input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IvrNode {
    pub id: NodeId,
    /// text or audio URL to play
    pub prompt: String,
    /// timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// maximum digits to collect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_digits: Option<usize>,
    /// key that finishes input (e.g. "#")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_on_key: Option<String>,
    pub choices: Vec<IvrChoice>,
    /// default node if no match or timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<NodeId>,
}

/// Conditional branch over call variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IfNode {
    pub id: NodeId,
    /// expression to evaluate (e.g. `${caller.number == '+1234567890'}`)
    pub condition: String,
    /// node id if condition is true
    pub then: NodeId,
    /// node id if condition is false
    #[serde(rename = "else", default, skip_serializing_if = "Option::is_none")]
    pub else_: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<NodeId>,
}

/// Route the call into a named agent queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueNode {
    pub id: NodeId,
    pub queue_id: String,
    /// music or announcement to play while waiting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_url: Option<String>,
    /// max wait time in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// max queue size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<usize>,
    /// node id if timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_timeout: Option<NodeId>,
    /// node id if queue is full
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_full: Option<NodeId>,
    /// node id when connected to agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_connect: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<NodeId>,
}

/// Buyer selection strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::AsRefStr)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum RotationStrategy {
    #[default]
    RoundRobin,
    Weighted,
    LeastCalls,
}

/// One external call destination with rotation weight and capacity caps.
///
/// Read-only from the routing engine's perspective; ownership of buyer
/// configuration belongs to the campaign-management collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyerTarget {
    pub id: String,
    /// SIP URI or phone number
    pub destination: String,
    /// weight for rotation (higher = more calls)
    #[serde(default = "default_weight")]
    pub weight: u32,
    /// max simultaneous calls; unset means unlimited
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<u32>,
    /// max calls per day; unset means unlimited
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_daily_calls: Option<u32>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Route to buyers with rotation, weights and caps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyerNode {
    pub id: NodeId,
    pub buyers: Vec<BuyerTarget>,
    #[serde(default)]
    pub strategy: RotationStrategy,
    /// node id if no enabled buyers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_no_buyers: Option<NodeId>,
    /// node id if all enabled buyers are at cap
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_all_busy: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<NodeId>,
}

/// Recording file format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RecordFormat {
    #[default]
    Wav,
    Mp3,
}

/// Recording channel layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RecordChannels {
    Single,
    #[default]
    Dual,
}

/// Record the call; the media collaborator does the actual recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordNode {
    pub id: NodeId,
    #[serde(default)]
    pub format: RecordFormat,
    #[serde(default)]
    pub channels: RecordChannels,
    /// play beep before recording
    #[serde(default)]
    pub beep: bool,
    /// node id after recording completes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_complete: Option<NodeId>,
    /// node id on recording error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_error: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<NodeId>,
}

/// Merge metadata tags into the call context; never suspends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagNode {
    pub id: NodeId,
    pub tags: Vars,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<NodeId>,
}

/// Play caller/callee announcements before bridging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhisperNode {
    pub id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callee_prompt: Option<String>,
    /// node id if callee accepts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_accept: Option<NodeId>,
    /// node id if callee rejects; timeouts route here too
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_reject: Option<NodeId>,
    /// timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<NodeId>,
}

/// Pure delay; advances to `next` after `duration` seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutNode {
    pub id: NodeId,
    /// duration in seconds
    pub duration: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<NodeId>,
}

/// Attempt targets in declared order until one succeeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackNode {
    pub id: NodeId,
    /// node ids to try in order
    pub targets: Vec<NodeId>,
    /// node id if all targets fail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_all_failed: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<NodeId>,
}

/// Machine-readable reason recorded on call termination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HangupReason {
    #[default]
    Normal,
    Busy,
    Rejected,
    Timeout,
    Error,
}

impl HangupReason {
    /// A failure-tagged reason makes an enclosing fallback attempt retry.
    pub fn is_failure(&self) -> bool {
        !matches!(self, HangupReason::Normal)
    }
}

/// End the call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HangupNode {
    pub id: NodeId,
    #[serde(default)]
    pub reason: HangupReason,
}

/// One step in a routing flow, discriminated by `type`.
///
/// Dispatch over node kinds is always an exhaustive match; adding a node
/// type is a compile-time-checked change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Node {
    Entry(EntryNode),
    Ivr(IvrNode),
    If(IfNode),
    Queue(QueueNode),
    Buyer(BuyerNode),
    Record(RecordNode),
    Tag(TagNode),
    Whisper(WhisperNode),
    Timeout(TimeoutNode),
    Fallback(FallbackNode),
    Hangup(HangupNode),
}

impl Node {
    /// stable id of the node
    pub fn id(&self) -> &NodeId {
        match self {
            Node::Entry(n) => &n.id,
            Node::Ivr(n) => &n.id,
            Node::If(n) => &n.id,
            Node::Queue(n) => &n.id,
            Node::Buyer(n) => &n.id,
            Node::Record(n) => &n.id,
            Node::Tag(n) => &n.id,
            Node::Whisper(n) => &n.id,
            Node::Timeout(n) => &n.id,
            Node::Fallback(n) => &n.id,
            Node::Hangup(n) => &n.id,
        }
    }

    /// wire name of the node type
    pub fn type_name(&self) -> &'static str {
        match self {
            Node::Entry(_) => "entry",
            Node::Ivr(_) => "ivr",
            Node::If(_) => "if",
            Node::Queue(_) => "queue",
            Node::Buyer(_) => "buyer",
            Node::Record(_) => "record",
            Node::Tag(_) => "tag",
            Node::Whisper(_) => "whisper",
            Node::Timeout(_) => "timeout",
            Node::Fallback(_) => "fallback",
            Node::Hangup(_) => "hangup",
        }
    }

    /// All outgoing node references, for reference-integrity validation.
    pub fn references(&self) -> Vec<&NodeId> {
        let mut refs: Vec<&NodeId> = Vec::new();
        match self {
            Node::Entry(n) => {
                refs.push(&n.target);
                refs.extend(&n.next);
            }
            Node::Ivr(n) => {
                refs.extend(n.choices.iter().map(|c| &c.target));
                refs.extend(&n.default);
                refs.extend(&n.next);
            }
            Node::If(n) => {
                refs.push(&n.then);
                refs.extend(&n.else_);
                refs.extend(&n.next);
            }
            Node::Queue(n) => {
                refs.extend(&n.on_timeout);
                refs.extend(&n.on_full);
                refs.extend(&n.on_connect);
                refs.extend(&n.next);
            }
            Node::Buyer(n) => {
                refs.extend(&n.on_no_buyers);
                refs.extend(&n.on_all_busy);
                refs.extend(&n.next);
            }
            Node::Record(n) => {
                refs.extend(&n.on_complete);
                refs.extend(&n.on_error);
                refs.extend(&n.next);
            }
            Node::Tag(n) => {
                refs.extend(&n.next);
            }
            Node::Whisper(n) => {
                refs.extend(&n.on_accept);
                refs.extend(&n.on_reject);
                refs.extend(&n.next);
            }
            Node::Timeout(n) => {
                refs.extend(&n.next);
            }
            Node::Fallback(n) => {
                refs.extend(n.targets.iter());
                refs.extend(&n.on_all_failed);
                refs.extend(&n.next);
            }
            Node::Hangup(_) => {}
        }
        refs
    }

    /// `next` edge of the node, where the variant has one.
    pub fn next(&self) -> Option<&NodeId> {
        match self {
            Node::Entry(n) => n.next.as_ref(),
            Node::Ivr(n) => n.next.as_ref(),
            Node::If(n) => n.next.as_ref(),
            Node::Queue(n) => n.next.as_ref(),
            Node::Buyer(n) => n.next.as_ref(),
            Node::Record(n) => n.next.as_ref(),
            Node::Tag(n) => n.next.as_ref(),
            Node::Whisper(n) => n.next.as_ref(),
            Node::Timeout(n) => n.next.as_ref(),
            Node::Fallback(n) => n.next.as_ref(),
            Node::Hangup(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_node_tagged_deserialize() {
        let node: Node = serde_json::from_value(json!({
            "id": "ivr-1",
            "type": "ivr",
            "prompt": "https://example.com/menu.wav",
            "timeout": 10,
            "maxDigits": 1,
            "finishOnKey": "#",
            "choices": [{"digits": "1", "target": "queue-sales"}],
            "default": "hangup-1"
        }))
        .unwrap();

        let Node::Ivr(ivr) = &node else {
            panic!("expected ivr node");
        };
        assert_eq!(ivr.max_digits, Some(1));
        assert_eq!(ivr.finish_on_key.as_deref(), Some("#"));
        assert_eq!(node.id(), "ivr-1");
        assert_eq!(node.type_name(), "ivr");
    }

    #[test]
    fn test_buyer_target_defaults() {
        let target: BuyerTarget = serde_json::from_value(json!({
            "id": "buyer-1",
            "destination": "sip:buyer1@example.com"
        }))
        .unwrap();
        assert_eq!(target.weight, 1);
        assert!(target.enabled);
        assert_eq!(target.max_concurrency, None);
        assert_eq!(target.max_daily_calls, None);
    }

    #[test]
    fn test_hangup_reason_default_and_failure() {
        let node: Node = serde_json::from_value(json!({"id": "h", "type": "hangup"})).unwrap();
        let Node::Hangup(h) = node else {
            panic!("expected hangup node");
        };
        assert_eq!(h.reason, HangupReason::Normal);
        assert!(!HangupReason::Normal.is_failure());
        assert!(HangupReason::Busy.is_failure());
        assert!(HangupReason::Error.is_failure());
    }

    #[test]
    fn test_if_node_else_rename() {
        let node: Node = serde_json::from_value(json!({
            "id": "if-1",
            "type": "if",
            "condition": "${hour >= 9}",
            "then": "a",
            "else": "b"
        }))
        .unwrap();
        let Node::If(n) = node else {
            panic!("expected if node");
        };
        assert_eq!(n.else_.as_deref(), Some("b"));
    }

    #[test]
    fn test_references_cover_branch_edges() {
        let node: Node = serde_json::from_value(json!({
            "id": "q-1",
            "type": "queue",
            "queueId": "sales",
            "onConnect": "a",
            "onTimeout": "b",
            "onFull": "c"
        }))
        .unwrap();
        let refs: Vec<&str> = node.references().iter().map(|s| s.as_str()).collect();
        assert_eq!(refs, vec!["b", "c", "a"]);
    }
}
