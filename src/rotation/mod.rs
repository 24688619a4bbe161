//! Buyer rotation: selection and capacity reservation.
//!
//! The allocator owns the only cross-call mutable state in the engine:
//! per-buyer live concurrency and daily call counters. Everything here is
//! synchronous and lock-scoped so the check-caps-then-increment step is
//! atomic across concurrent calls.

mod allocator;
mod state;

pub use allocator::{Reservation, RotationAllocator, RotationDecision};
