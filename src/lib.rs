//! # Callflow
//!
//! Callflow is an event-driven call routing engine written in Rust.
//! It is designed to be embedded in a telephony platform to drive live
//! calls through tenant-defined decision graphs ("flows").
//!
//! ## Core Features
//!
//! - **Declarative Flow Language**: JSON flows with IVR menus, conditional
//!   branches, queues, buyer rotation, recording, whisper and fallback nodes
//! - **Compiled Execution Plans**: flows are validated once and compiled
//!   into cacheable, indexed plans
//! - **Live Buyer Rotation**: round-robin, weighted and least-calls
//!   selection under per-buyer concurrency and daily-call caps
//! - **Async Execution**: powered by `tokio`, one state machine per call
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use callflow::{EngineBuilder, Flow};
//!
//! let engine = EngineBuilder::new().build()?;
//! engine.launch();
//!
//! let flow = Flow::from_json(json_str)?;
//! engine.deploy("tenant-1", &flow)?;
//! let call_id = engine.start_call("tenant-1", "my-flow", "+15550100", "+15550199")?;
//! engine.ingest(event)?;
//! ```

mod builder;
mod common;
mod config;
mod engine;
mod error;
mod events;
mod expr;
mod model;
mod queueing;
mod rotation;
mod runtime;
mod services;
mod utils;

pub mod flows;

use std::sync::{Arc, RwLock};

pub use builder::EngineBuilder;
pub use common::Vars;
pub use config::Config;
pub use engine::Engine;
pub use error::CallflowError;
pub use events::{CallEvent, Channel, ChannelEvent, ChannelOptions, EngineAction, Message, TelephonyEvent};
pub use model::*;
pub use rotation::{Reservation, RotationAllocator, RotationDecision};
pub use runtime::{ExecutionContext, HistoryEntry, TerminalOutcome};
pub use services::{
    Admission, AdmissionGate, AllowAll, BillingEmitter, BuyerDirectory, CallSummary, DeclaredBuyers, FlowStore, LogBilling, MemoryFlowStore,
};

/// Result type alias for Callflow operations.
pub type Result<T> = std::result::Result<T, CallflowError>;

/// Thread-safe shared lock wrapper using Arc<RwLock<T>>.
pub(crate) type ShareLock<T> = Arc<RwLock<T>>;
