//! Error types for approval gating.

/// Errors produced by checkpoint state handling.
#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    #[error("checkpoint {checkpoint_id} already resolved as {status}")]
    AlreadyResolved {
        checkpoint_id: String,
        status: String,
    },

    #[error("checkpoint {checkpoint_id} cannot be resolved back to pending")]
    InvalidResolution { checkpoint_id: String },
}

/// Result type for approval operations.
pub type ApprovalResult<T> = std::result::Result<T, ApprovalError>;
