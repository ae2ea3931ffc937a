#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    SqlxError(#[from] sqlx::Error),
    #[error("Failed to (de)serialize stored snapshot: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Unknown category stored in database: {0}")]
    UnknownCategory(String),
}

impl DbError {
    /// Connection-level failures worth retrying; constraint and decode errors are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DbError::SqlxError(
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            )
        )
    }
}
