//! Event types for call execution.
//!
//! Two event families meet here: [`TelephonyEvent`]s are consumed from
//! the carrier-facing event source and drive call state machines forward;
//! [`CallEvent`]s are emitted by the engine for subscribers (media layer,
//! observability, audit) through the broadcast [`Channel`].

mod channel;
mod telephony;

pub use channel::{Channel, ChannelEvent, ChannelOptions};
pub use telephony::TelephonyEvent;

use serde::{Deserialize, Serialize};

use crate::model::{HangupReason, NodeId, RecordChannels, RecordFormat};

/// Instruction for the telephony/media collaborator.
///
/// The engine owns routing decisions only; playing prompts, joining
/// queues, recording and bridging are delegated through these actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EngineAction {
    Play {
        url: String,
    },
    QueueJoin {
        queue_id: String,
        wait_url: Option<String>,
        timeout: Option<u64>,
        max_size: Option<usize>,
    },
    RecordStart {
        format: RecordFormat,
        channels: RecordChannels,
        beep: bool,
    },
    WhisperStart {
        caller_prompt: Option<String>,
        callee_prompt: Option<String>,
        timeout: Option<u64>,
    },
    DialBuyer {
        buyer_id: String,
        destination: String,
    },
    Hangup {
        reason: HangupReason,
    },
}

/// Engine-emitted event for one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CallEvent {
    /// The state machine entered a node.
    NodeEntered {
        node_type: String,
    },
    /// An instruction for the media layer.
    Action(EngineAction),
    /// A buyer slot was reserved for this call.
    BuyerReserved {
        buyer_id: String,
        destination: String,
    },
    /// The buyer node had no enabled targets.
    NoBuyers,
    /// All enabled targets were at cap.
    AllBusy,
    /// The admission gate denied the call before buyer reservation.
    AdmissionDenied {
        reason: String,
    },
    /// The call reached a terminal state.
    Terminated {
        reason: HangupReason,
    },
}

impl CallEvent {
    pub fn is_terminated(&self) -> bool {
        matches!(self, CallEvent::Terminated { .. })
    }
}

/// Event message containing call and node context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Call that generated this event.
    pub call_id: String,
    /// Node the call was at (empty for call-level events).
    pub node_id: NodeId,
    /// The actual event data.
    pub event: CallEvent,
}
