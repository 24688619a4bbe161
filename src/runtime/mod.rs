//! Per-call execution: context, node semantics and the session task.
//!
//! Each live call runs as one tokio task ([`session::CallSession`])
//! driving a state machine over the compiled plan. The task owns the
//! call's [`ExecutionContext`] exclusively; cross-call state lives only
//! in the rotation allocator and the queue registry.

mod context;
mod interpreter;
pub(crate) mod session;

pub use context::{ExecutionContext, HistoryEntry, TerminalOutcome};
pub(crate) use interpreter::{Interpreter, Step, Transition, Wait};
