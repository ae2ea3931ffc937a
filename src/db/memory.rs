use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::db::{
    Category, Dam, DamRepository, DbError, NewDam, SnapshotFilter, SnapshotRepository,
    StoredSnapshot,
};

#[derive(Default)]
struct Tables {
    dams: BTreeMap<i64, Dam>,
    snapshots: HashMap<(i64, Category), StoredSnapshot>,
    next_dam_id: i64,
}

impl Tables {
    /// Insert or replace, keeping `created_at` of an existing row.
    fn store_snapshot(&mut self, snapshot: &StoredSnapshot) -> StoredSnapshot {
        let now = Utc::now();
        let key = (snapshot.dam_id, snapshot.category);
        let created_at = self
            .snapshots
            .get(&key)
            .map(|existing| existing.created_at)
            .unwrap_or(now);

        let stored = StoredSnapshot {
            created_at,
            updated_at: now,
            ..snapshot.clone()
        };
        self.snapshots.insert(key, stored.clone());
        stored
    }
}

/// Process-local store implementing both repository ports.
///
/// Used by tests and by embedders that keep state elsewhere. Clones share the
/// same tables.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotRepository for InMemoryStore {
    async fn get(
        &self,
        category: Category,
        dam_id: i64,
    ) -> Result<Option<StoredSnapshot>, DbError> {
        let tables = self.tables.read().await;
        Ok(tables.snapshots.get(&(dam_id, category)).cloned())
    }

    #[instrument(skip(self, snapshot), fields(dam_id = snapshot.dam_id, category = %snapshot.category))]
    async fn upsert(&self, snapshot: &StoredSnapshot) -> Result<StoredSnapshot, DbError> {
        let mut tables = self.tables.write().await;
        let stored = tables.store_snapshot(snapshot);
        debug!(input_revision = stored.input_revision, "Snapshot upserted");
        Ok(stored)
    }

    async fn upsert_many(
        &self,
        snapshots: &[StoredSnapshot],
    ) -> Result<Vec<StoredSnapshot>, DbError> {
        let mut tables = self.tables.write().await;
        Ok(snapshots
            .iter()
            .map(|snapshot| tables.store_snapshot(snapshot))
            .collect())
    }

    async fn list_by_filter(
        &self,
        category: Category,
        filter: SnapshotFilter<'_>,
    ) -> Result<Vec<StoredSnapshot>, DbError> {
        let tables = self.tables.read().await;
        let mut matched: Vec<StoredSnapshot> = tables
            .snapshots
            .values()
            .filter(|s| s.category == category && filter(s))
            .cloned()
            .collect();
        matched.sort_by_key(|s| s.dam_id);
        Ok(matched)
    }

    async fn list_for_dam(&self, dam_id: i64) -> Result<Vec<StoredSnapshot>, DbError> {
        let tables = self.tables.read().await;
        let mut snapshots: Vec<StoredSnapshot> = tables
            .snapshots
            .values()
            .filter(|s| s.dam_id == dam_id)
            .cloned()
            .collect();
        snapshots.sort_by_key(|s| s.category);
        Ok(snapshots)
    }

    async fn purge(&self, category: Category, dam_id: i64) -> Result<bool, DbError> {
        let mut tables = self.tables.write().await;
        Ok(tables.snapshots.remove(&(dam_id, category)).is_some())
    }
}

#[async_trait]
impl DamRepository for InMemoryStore {
    async fn find_dam(&self, dam_id: i64) -> Result<Option<Dam>, DbError> {
        let tables = self.tables.read().await;
        Ok(tables.dams.get(&dam_id).cloned())
    }

    async fn list_dams(&self) -> Result<Vec<Dam>, DbError> {
        let tables = self.tables.read().await;
        Ok(tables.dams.values().cloned().collect())
    }

    async fn insert_dam(&self, dam: &NewDam) -> Result<Dam, DbError> {
        let mut tables = self.tables.write().await;
        tables.next_dam_id += 1;
        let now = Utc::now();
        let dam = Dam {
            id: tables.next_dam_id,
            name: dam.name.clone(),
            state: dam.state.clone(),
            river: dam.river.clone(),
            height_m: dam.height_m,
            length_m: dam.length_m,
            gross_storage_capacity: dam.gross_storage_capacity,
            live_storage_capacity: dam.live_storage_capacity,
            upstream_dam_id: dam.upstream_dam_id,
            upstream_distance_km: dam.upstream_distance_km,
            downstream_dam_id: dam.downstream_dam_id,
            downstream_distance_km: dam.downstream_distance_km,
            created_at: now,
            updated_at: now,
        };
        tables.dams.insert(dam.id, dam.clone());
        Ok(dam)
    }
}
