//! # Presence
//!
//! Who is online right now, by session heartbeat with a fixed TTL.

mod errors;
mod tracker;

pub use errors::{PresenceError, PresenceResult};
pub use tracker::{PresenceSession, PresenceSnapshot, PresenceTracker, DEFAULT_TTL_SECS};
