mod flow;
mod node;
mod plan;
mod validate;

pub use flow::Flow;
pub use node::{
    BuyerNode, BuyerTarget, EntryNode, FallbackNode, HangupNode, HangupReason, IfNode, IvrChoice, IvrNode, Node, NodeId, QueueNode, RecordChannels, RecordFormat, RecordNode, RotationStrategy,
    TagNode, TimeoutNode, WhisperNode,
};
pub use plan::{ExecutionPlan, PlanKey, compile};
pub use validate::{ValidFlow, validate};
