//! Ready-made example flows.
//!
//! These mirror the flow documents a tenant's dashboard would publish and
//! double as fixtures for the engine's own tests. Each one is valid and
//! compiles as-is.

use serde_json::json;

use crate::model::Flow;

fn flow(value: serde_json::Value) -> Flow {
    serde_json::from_value(value).expect("example flow is well-formed")
}

/// Tag the call and dial a single buyer.
pub fn simple_direct_route() -> Flow {
    flow(json!({
        "id": "simple-direct-route",
        "name": "Simple Direct Route",
        "version": "1.0.0",
        "description": "Tag the call and route it straight to one buyer.",
        "entry": {"id": "entry-1", "type": "entry", "target": "tag-1"},
        "nodes": [
            {
                "id": "tag-1",
                "type": "tag",
                "tags": {"route": "direct", "source": "simple-flow"},
                "next": "buyer-1"
            },
            {
                "id": "buyer-1",
                "type": "buyer",
                "buyers": [
                    {"id": "acme-insurance", "destination": "sip:sales@acme.example.com"}
                ],
                "next": "hangup-1"
            },
            {"id": "hangup-1", "type": "hangup", "reason": "normal"}
        ]
    }))
}

/// DTMF menu routing to two agent queues.
pub fn ivr_dtmf() -> Flow {
    flow(json!({
        "id": "ivr-dtmf",
        "name": "IVR Department Menu",
        "version": "1.0.0",
        "description": "Press 1 for sales, 2 for support.",
        "entry": {"id": "entry-1", "type": "entry", "target": "ivr-1"},
        "nodes": [
            {
                "id": "ivr-1",
                "type": "ivr",
                "prompt": "https://cdn.example.com/prompts/department-menu.wav",
                "timeout": 5,
                "maxDigits": 1,
                "choices": [
                    {"digits": "1", "target": "queue-sales"},
                    {"digits": "2", "target": "queue-support"}
                ],
                "default": "queue-sales"
            },
            {
                "id": "queue-sales",
                "type": "queue",
                "queueId": "sales",
                "waitUrl": "https://cdn.example.com/prompts/hold.wav",
                "timeout": 120,
                "onConnect": "hangup-1",
                "onTimeout": "hangup-timeout"
            },
            {
                "id": "queue-support",
                "type": "queue",
                "queueId": "support",
                "waitUrl": "https://cdn.example.com/prompts/hold.wav",
                "timeout": 120,
                "onConnect": "hangup-1",
                "onTimeout": "hangup-timeout"
            },
            {"id": "hangup-1", "type": "hangup", "reason": "normal"},
            {"id": "hangup-timeout", "type": "hangup", "reason": "timeout"}
        ]
    }))
}

/// Weighted rotation over three buyers with caps and an overflow queue.
pub fn buyer_rotation() -> Flow {
    flow(json!({
        "id": "buyer-rotation",
        "name": "Buyer Rotation",
        "version": "1.0.0",
        "description": "Weighted rotation with concurrency and daily caps.",
        "entry": {"id": "entry-1", "type": "entry", "target": "buyer-1"},
        "nodes": [
            {
                "id": "buyer-1",
                "type": "buyer",
                "strategy": "weighted",
                "buyers": [
                    {
                        "id": "buyer-alpha",
                        "destination": "sip:alpha@buyers.example.com",
                        "weight": 3,
                        "maxConcurrency": 10,
                        "maxDailyCalls": 500
                    },
                    {
                        "id": "buyer-beta",
                        "destination": "sip:beta@buyers.example.com",
                        "weight": 1,
                        "maxConcurrency": 5
                    },
                    {
                        "id": "buyer-gamma",
                        "destination": "sip:gamma@buyers.example.com",
                        "enabled": false
                    }
                ],
                "onAllBusy": "queue-overflow",
                "onNoBuyers": "hangup-error",
                "next": "hangup-1"
            },
            {
                "id": "queue-overflow",
                "type": "queue",
                "queueId": "overflow",
                "timeout": 60,
                "onConnect": "hangup-1",
                "onTimeout": "hangup-busy"
            },
            {"id": "hangup-1", "type": "hangup", "reason": "normal"},
            {"id": "hangup-busy", "type": "hangup", "reason": "busy"},
            {"id": "hangup-error", "type": "hangup", "reason": "error"}
        ]
    }))
}

/// Business-hours check, recording, IVR, fallback dialing and whisper.
pub fn complex_flow() -> Flow {
    flow(json!({
        "id": "complex-flow",
        "name": "Complex Routing",
        "version": "1.0.0",
        "description": "Everything at once: hours gate, recording, menu, fallback buyers with whisper.",
        "entry": {"id": "entry-1", "type": "entry", "target": "if-hours"},
        "nodes": [
            {
                "id": "if-hours",
                "type": "if",
                "condition": "${hour >= 9 && hour < 17}",
                "then": "record-1",
                "else": "hangup-closed"
            },
            {
                "id": "record-1",
                "type": "record",
                "format": "mp3",
                "channels": "dual",
                "beep": false,
                "onComplete": "ivr-1",
                "onError": "ivr-1"
            },
            {
                "id": "ivr-1",
                "type": "ivr",
                "prompt": "https://cdn.example.com/prompts/main-menu.wav",
                "timeout": 8,
                "maxDigits": 1,
                "choices": [
                    {"digits": "1", "target": "fallback-buyers"},
                    {"digits": "2", "target": "queue-support"}
                ],
                "default": "fallback-buyers"
            },
            {
                "id": "fallback-buyers",
                "type": "fallback",
                "targets": ["buyer-primary", "buyer-backup"],
                "onAllFailed": "queue-support"
            },
            {
                "id": "buyer-primary",
                "type": "buyer",
                "buyers": [
                    {"id": "premium-buyer", "destination": "sip:premium@buyers.example.com", "maxConcurrency": 3}
                ],
                "onAllBusy": "hangup-busy",
                "onNoBuyers": "hangup-busy",
                "next": "whisper-1"
            },
            {
                "id": "whisper-1",
                "type": "whisper",
                "calleePrompt": "Insurance lead from the web campaign. Press 1 to accept.",
                "timeout": 10,
                "onAccept": "hangup-1",
                "onReject": "hangup-rejected"
            },
            {
                "id": "buyer-backup",
                "type": "buyer",
                "buyers": [
                    {"id": "backup-buyer", "destination": "sip:backup@buyers.example.com"}
                ],
                "onAllBusy": "hangup-busy",
                "onNoBuyers": "hangup-busy",
                "next": "hangup-1"
            },
            {
                "id": "queue-support",
                "type": "queue",
                "queueId": "support",
                "timeout": 90,
                "maxSize": 25,
                "onConnect": "hangup-1",
                "onTimeout": "hangup-timeout",
                "onFull": "hangup-busy"
            },
            {"id": "hangup-1", "type": "hangup", "reason": "normal"},
            {"id": "hangup-closed", "type": "hangup", "reason": "normal"},
            {"id": "hangup-busy", "type": "hangup", "reason": "busy"},
            {"id": "hangup-rejected", "type": "hangup", "reason": "rejected"},
            {"id": "hangup-timeout", "type": "hangup", "reason": "timeout"}
        ]
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{compile, validate};

    #[test]
    fn test_all_example_flows_compile() {
        for flow in [simple_direct_route(), ivr_dtmf(), buyer_rotation(), complex_flow()] {
            let id = flow.id.clone();
            let valid = validate(flow).unwrap_or_else(|e| panic!("{} failed validation: {}", id, e));
            compile(&valid).unwrap_or_else(|e| panic!("{} failed to compile: {}", id, e));
        }
    }

    #[test]
    fn test_simple_flow_shape() {
        let flow = simple_direct_route();
        assert_eq!(flow.entry.target, "tag-1");
        assert_eq!(flow.nodes.len(), 3);
    }
}
