pub mod clock;
pub mod lock;
pub mod notify;

/// Failure taxonomy for the fulfillment and settlement engine. Every engine
/// operation returns one of these as a typed result; callers map them to
/// transport-level responses and decide whether to retry.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The attempted transition is not legal from the current state. The
    /// caller should re-fetch and re-evaluate; retrying as-is will not help.
    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("not found: {0}")]
    NotFound(String),

    /// An offer or verification window elapsed before the call arrived.
    #[error("expired: {0}")]
    Expired(String),

    /// Malformed or non-matching delivery proof.
    #[error("delivery verification failed: {0}")]
    VerificationFailed(String),

    /// The order is already referenced by a settlement batch.
    #[error("already settled: {0}")]
    AlreadySettled(String),

    /// A compare-and-swap on the persisted entity lost a race. The only
    /// variant where the engine recommends a retry.
    #[error("concurrent modification: {0}")]
    ConcurrencyConflict(String),

    #[error("validation failed: {0}")]
    ValidationFailed(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
