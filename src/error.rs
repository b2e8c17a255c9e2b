//! Error types for the matchmaking director
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific matchmaking scenarios
#[derive(Debug, thiserror::Error)]
pub enum MatchmakingError {
    #[error("player capacity must be higher than zero, got {capacity}")]
    InvalidCapacity { capacity: i64 },

    #[error("match profile is missing")]
    NilProfile,

    #[error("pool tickets are missing")]
    NilPools,

    #[error("invalid assignment group: {reason}")]
    InvalidAssignmentGroup { reason: String },

    #[error("no assignments with connections set")]
    NoResolvedAssignments,

    #[error("invalid interval '{value}': {reason}")]
    InvalidInterval { value: String, reason: String },

    #[error("fetch matches for profile '{profile}' timed out after {timeout_ms}ms")]
    FetchTimeout { profile: String, timeout_ms: u64 },

    #[error("operation cancelled: {operation}")]
    Cancelled { operation: String },

    #[error("invalid extension '{key}': {reason}")]
    InvalidExtension { key: String, reason: String },

    #[error("remote stream error: {message}")]
    RemoteStream { message: String },

    #[error("total failed assignments {count}: {summary}")]
    AssignmentFailures { count: usize, summary: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

impl MatchmakingError {
    /// Returns the domain error carried by an `anyhow::Error`, if any.
    pub fn find(error: &anyhow::Error) -> Option<&MatchmakingError> {
        error.downcast_ref::<MatchmakingError>()
    }

    /// Whether the error describes an expected empty outcome rather than a failure.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            MatchmakingError::NoResolvedAssignments | MatchmakingError::Cancelled { .. }
        )
    }
}
