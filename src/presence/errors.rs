//! # Presence Errors

use thiserror::Error;

pub type PresenceResult<T> = Result<T, PresenceError>;

#[derive(Debug, Clone, Error)]
pub enum PresenceError {
    #[error("sessionId is required")]
    InvalidSessionId,

    #[error("Internal error: {0}")]
    Internal(String),
}
