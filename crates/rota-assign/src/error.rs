use rota_core::RowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssignError {
    /// Raised while converting input records, before anything is written.
    #[error("invalid batch input: {0}")]
    InputFormat(#[from] RowError),

    #[error("no active users to assign to")]
    NoActiveUsers,

    /// The store failed. Missions written earlier in the same batch stay.
    #[error("persistence failure: {0:#}")]
    Persistence(anyhow::Error),

    #[error("assignment lock poisoned")]
    LockPoisoned,
}

