//! Error types for the role lifecycle.

/// Errors produced by the lifecycle manager.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("role {role} is not registered")]
    NotRegistered { role: String },

    #[error("role {role} cannot move from {from} to {to}")]
    InvalidTransition {
        role: String,
        from: String,
        to: String,
    },

    #[error("no replacement factory registered for role {role}")]
    NoReplacementFactory { role: String },

    #[error("rating {rating} is outside 1..=5")]
    InvalidRating { rating: u8 },
}

/// Result type for lifecycle operations.
pub type LifecycleResult<T> = std::result::Result<T, LifecycleError>;
