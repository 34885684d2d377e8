//! # vigil-liveness
//!
//! Decides which monitored channels are live: authenticates and deduplicates
//! inbound notifications, holds the lifecycle state, and reconciles it
//! against the authoritative source.

pub mod dedup;
pub mod reconcile;
pub mod state;
pub mod verify;

pub use dedup::{Admission, IdempotencyWindow, ReplayGuard};
pub use reconcile::{ReconcileOutcome, Reconciler};
pub use state::LifecycleState;
pub use verify::Verifier;
