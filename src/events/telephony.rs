//! Telephony event vocabulary consumed from the carrier-facing source.

use serde::{Deserialize, Serialize};

/// Raw telephony event, discriminated by dotted `type` names on the wire.
///
/// This is exactly the vocabulary the node semantics react to; anything
/// else the carrier adapter produces is dropped before the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TelephonyEvent {
    #[serde(rename = "call.started", rename_all = "camelCase")]
    CallStarted {
        call_id: String,
        from: String,
        to: String,
    },
    #[serde(rename = "call.answered", rename_all = "camelCase")]
    CallAnswered {
        call_id: String,
    },
    #[serde(rename = "call.ended", rename_all = "camelCase")]
    CallEnded {
        call_id: String,
        reason: String,
    },
    #[serde(rename = "dtmf.received", rename_all = "camelCase")]
    DtmfReceived {
        call_id: String,
        digits: String,
    },
    #[serde(rename = "recording.completed", rename_all = "camelCase")]
    RecordingCompleted {
        call_id: String,
        url: String,
    },
    #[serde(rename = "recording.failed", rename_all = "camelCase")]
    RecordingFailed {
        call_id: String,
        error: String,
    },
    #[serde(rename = "queue.connected", rename_all = "camelCase")]
    QueueConnected {
        call_id: String,
        agent_id: String,
    },
    #[serde(rename = "queue.timeout", rename_all = "camelCase")]
    QueueTimeout {
        call_id: String,
    },
    #[serde(rename = "whisper.accepted", rename_all = "camelCase")]
    WhisperAccepted {
        call_id: String,
    },
    #[serde(rename = "whisper.rejected", rename_all = "camelCase")]
    WhisperRejected {
        call_id: String,
    },
}

impl TelephonyEvent {
    /// Call the event belongs to; used by the engine to route it.
    pub fn call_id(&self) -> &str {
        match self {
            TelephonyEvent::CallStarted { call_id, .. }
            | TelephonyEvent::CallAnswered { call_id }
            | TelephonyEvent::CallEnded { call_id, .. }
            | TelephonyEvent::DtmfReceived { call_id, .. }
            | TelephonyEvent::RecordingCompleted { call_id, .. }
            | TelephonyEvent::RecordingFailed { call_id, .. }
            | TelephonyEvent::QueueConnected { call_id, .. }
            | TelephonyEvent::QueueTimeout { call_id }
            | TelephonyEvent::WhisperAccepted { call_id }
            | TelephonyEvent::WhisperRejected { call_id } => call_id,
        }
    }

    /// Dotted wire name of the event type.
    pub fn type_name(&self) -> &'static str {
        match self {
            TelephonyEvent::CallStarted { .. } => "call.started",
            TelephonyEvent::CallAnswered { .. } => "call.answered",
            TelephonyEvent::CallEnded { .. } => "call.ended",
            TelephonyEvent::DtmfReceived { .. } => "dtmf.received",
            TelephonyEvent::RecordingCompleted { .. } => "recording.completed",
            TelephonyEvent::RecordingFailed { .. } => "recording.failed",
            TelephonyEvent::QueueConnected { .. } => "queue.connected",
            TelephonyEvent::QueueTimeout { .. } => "queue.timeout",
            TelephonyEvent::WhisperAccepted { .. } => "whisper.accepted",
            TelephonyEvent::WhisperRejected { .. } => "whisper.rejected",
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_dotted_wire_names() {
        let event: TelephonyEvent = serde_json::from_value(json!({
            "type": "dtmf.received",
            "callId": "c-1",
            "digits": "1"
        }))
        .unwrap();
        assert_eq!(
            event,
            TelephonyEvent::DtmfReceived {
                call_id: "c-1".to_string(),
                digits: "1".to_string(),
            }
        );
        assert_eq!(event.call_id(), "c-1");
        assert_eq!(event.type_name(), "dtmf.received");
    }

    #[test]
    fn test_roundtrip_preserves_type_tag() {
        let event = TelephonyEvent::QueueConnected {
            call_id: "c-2".to_string(),
            agent_id: "agent-7".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "queue.connected");
        assert_eq!(value["agentId"], "agent-7");
    }
}
