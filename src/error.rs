use crate::db::{Category, DbError};

/// Errors surfaced by the derivation engine and the services built on it.
///
/// Missing optional inputs and absent upstream snapshots are not errors; they
/// are reported as [`crate::derivation::DerivationNote`]s.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Database(#[from] DbError),

    #[error("Failed to decode snapshot fields: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Dependency cycle between categories: {0:?}")]
    DependencyCycle(Vec<Category>),
}

impl EngineError {
    pub fn dam_not_found(dam_id: i64) -> Self {
        EngineError::NotFound(format!("Dam {dam_id}"))
    }

    pub fn snapshot_not_found(dam_id: i64, category: Category) -> Self {
        EngineError::NotFound(format!("{category} snapshot for dam {dam_id}"))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Database(e) if e.is_transient())
    }
}
