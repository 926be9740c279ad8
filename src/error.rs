//! Error types for the game hall service
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application.

use crate::types::{RoomId, SessionId, UserId};

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific hall scenarios
#[derive(Debug, thiserror::Error)]
pub enum HallError {
    #[error("User not found: {user_id}")]
    UserNotFound { user_id: UserId },

    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: SessionId },

    #[error("Room not found for user: {user_id}")]
    RoomNotFound { user_id: UserId },

    #[error("Room not found: {room_id}")]
    UnknownRoom { room_id: RoomId },

    #[error("Room creation failed for {white} vs {black}: {reason}")]
    RoomCreationFailed {
        white: UserId,
        black: UserId,
        reason: String,
    },

    #[error("Connection closed for user: {user_id}")]
    ConnectionClosed { user_id: UserId },

    #[error("Duplicate login for user: {user_id}")]
    DuplicateLogin { user_id: UserId },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

impl HallError {
    /// Build an internal error for a poisoned lock
    pub fn poisoned(what: &str) -> Self {
        HallError::InternalError {
            message: format!("Failed to acquire {} lock", what),
        }
    }
}
