pub mod dam_repository;
pub mod error;
pub mod memory;
pub mod models;
pub mod snapshot_repository;

use async_trait::async_trait;

pub use dam_repository::PgDamRepository;
pub use error::DbError;
pub use memory::InMemoryStore;
pub use models::*;
pub use snapshot_repository::PgSnapshotRepository;

/// Predicate used by [`SnapshotRepository::list_by_filter`].
pub type SnapshotFilter<'a> = &'a (dyn Fn(&StoredSnapshot) -> bool + Send + Sync);

/// Narrow persistence port for telemetry snapshots.
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    async fn get(&self, category: Category, dam_id: i64)
        -> Result<Option<StoredSnapshot>, DbError>;

    /// Insert or replace the snapshot for `(dam_id, category)`, inputs and
    /// derived fields in one write. `created_at` of an existing row is kept.
    async fn upsert(&self, snapshot: &StoredSnapshot) -> Result<StoredSnapshot, DbError>;

    /// Upsert several snapshots atomically: either all are stored or none.
    async fn upsert_many(
        &self,
        snapshots: &[StoredSnapshot],
    ) -> Result<Vec<StoredSnapshot>, DbError>;

    async fn list_by_filter(
        &self,
        category: Category,
        filter: SnapshotFilter<'_>,
    ) -> Result<Vec<StoredSnapshot>, DbError>;

    async fn list_for_dam(&self, dam_id: i64) -> Result<Vec<StoredSnapshot>, DbError>;

    /// Administrative delete. Returns whether a snapshot existed.
    async fn purge(&self, category: Category, dam_id: i64) -> Result<bool, DbError>;
}

/// Persistence port for dams and their basin links.
#[async_trait]
pub trait DamRepository: Send + Sync {
    async fn find_dam(&self, dam_id: i64) -> Result<Option<Dam>, DbError>;

    async fn list_dams(&self) -> Result<Vec<Dam>, DbError>;

    async fn insert_dam(&self, dam: &NewDam) -> Result<Dam, DbError>;
}
