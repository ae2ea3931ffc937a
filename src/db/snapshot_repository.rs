use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgExecutor, PgPool};
use tracing::{debug, error, instrument};

use crate::db::{Category, DbError, SnapshotFilter, SnapshotRepository, StoredSnapshot};

/// Row shape of `telemetry_snapshots`.
#[derive(Debug, FromRow)]
struct SnapshotRow {
    dam_id: i64,
    category: String,
    inputs: serde_json::Value,
    derived: serde_json::Value,
    input_revision: i64,
    computed_revision: Option<i64>,
    dependency_revisions: serde_json::Value,
    basin_context: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SnapshotRow> for StoredSnapshot {
    type Error = DbError;

    fn try_from(row: SnapshotRow) -> Result<Self, Self::Error> {
        let category = row
            .category
            .parse::<Category>()
            .map_err(|_| DbError::UnknownCategory(row.category.clone()))?;

        Ok(StoredSnapshot {
            dam_id: row.dam_id,
            category,
            inputs: row.inputs,
            derived: row.derived,
            input_revision: row.input_revision,
            computed_revision: row.computed_revision,
            dependency_revisions: serde_json::from_value(row.dependency_revisions)?,
            basin_context: row.basin_context.map(serde_json::from_value).transpose()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const SNAPSHOT_COLUMNS: &str = "dam_id, category, inputs, derived, input_revision, \
     computed_revision, dependency_revisions, basin_context, created_at, updated_at";

#[derive(Clone)]
pub struct PgSnapshotRepository {
    pool: PgPool,
}

impl PgSnapshotRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn upsert_row<'e, E>(executor: E, snapshot: &StoredSnapshot) -> Result<StoredSnapshot, DbError>
where
    E: PgExecutor<'e>,
{
    let dependency_revisions = serde_json::to_value(&snapshot.dependency_revisions)?;
    let basin_context = snapshot
        .basin_context
        .as_ref()
        .map(serde_json::to_value)
        .transpose()?;

    let row = sqlx::query_as::<_, SnapshotRow>(&format!(
        r#"
        INSERT INTO telemetry_snapshots (
            dam_id, category, inputs, derived, input_revision,
            computed_revision, dependency_revisions, basin_context, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW())
        ON CONFLICT (dam_id, category) DO UPDATE SET
            inputs = EXCLUDED.inputs,
            derived = EXCLUDED.derived,
            input_revision = EXCLUDED.input_revision,
            computed_revision = EXCLUDED.computed_revision,
            dependency_revisions = EXCLUDED.dependency_revisions,
            basin_context = EXCLUDED.basin_context,
            updated_at = NOW()
        RETURNING {SNAPSHOT_COLUMNS}
        "#
    ))
    .bind(snapshot.dam_id)
    .bind(snapshot.category.as_str())
    .bind(&snapshot.inputs)
    .bind(&snapshot.derived)
    .bind(snapshot.input_revision)
    .bind(snapshot.computed_revision)
    .bind(dependency_revisions)
    .bind(basin_context)
    .fetch_one(executor)
    .await
    .map_err(|e| {
        error!(
            dam_id = snapshot.dam_id,
            category = %snapshot.category,
            error = %e,
            "Failed to upsert snapshot"
        );
        e
    })?;

    StoredSnapshot::try_from(row)
}

#[async_trait]
impl SnapshotRepository for PgSnapshotRepository {
    #[instrument(skip(self), fields(category = %category))]
    async fn get(
        &self,
        category: Category,
        dam_id: i64,
    ) -> Result<Option<StoredSnapshot>, DbError> {
        debug!("Querying snapshot");

        let row = sqlx::query_as::<_, SnapshotRow>(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM telemetry_snapshots \
             WHERE dam_id = $1 AND category = $2"
        ))
        .bind(dam_id)
        .bind(category.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(StoredSnapshot::try_from).transpose()
    }

    #[instrument(skip(self, snapshot), fields(dam_id = snapshot.dam_id, category = %snapshot.category))]
    async fn upsert(&self, snapshot: &StoredSnapshot) -> Result<StoredSnapshot, DbError> {
        let stored = upsert_row(&self.pool, snapshot).await?;
        debug!(input_revision = stored.input_revision, "Snapshot upserted");
        Ok(stored)
    }

    #[instrument(skip(self, snapshots), fields(count = snapshots.len()))]
    async fn upsert_many(
        &self,
        snapshots: &[StoredSnapshot],
    ) -> Result<Vec<StoredSnapshot>, DbError> {
        let mut tx = self.pool.begin().await?;
        let mut stored = Vec::with_capacity(snapshots.len());
        for snapshot in snapshots {
            stored.push(upsert_row(&mut *tx, snapshot).await?);
        }
        tx.commit().await?;

        debug!("Upserted {} snapshots in one transaction", stored.len());
        Ok(stored)
    }

    #[instrument(skip(self, filter), fields(category = %category))]
    async fn list_by_filter(
        &self,
        category: Category,
        filter: SnapshotFilter<'_>,
    ) -> Result<Vec<StoredSnapshot>, DbError> {
        let rows = sqlx::query_as::<_, SnapshotRow>(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM telemetry_snapshots \
             WHERE category = $1 ORDER BY dam_id"
        ))
        .bind(category.as_str())
        .fetch_all(&self.pool)
        .await?;

        let total = rows.len();
        let mut matched = Vec::new();
        for row in rows {
            let snapshot = StoredSnapshot::try_from(row)?;
            if filter(&snapshot) {
                matched.push(snapshot);
            }
        }

        debug!("{} of {} snapshots matched filter", matched.len(), total);
        Ok(matched)
    }

    #[instrument(skip(self))]
    async fn list_for_dam(&self, dam_id: i64) -> Result<Vec<StoredSnapshot>, DbError> {
        let rows = sqlx::query_as::<_, SnapshotRow>(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM telemetry_snapshots \
             WHERE dam_id = $1 ORDER BY category"
        ))
        .bind(dam_id)
        .fetch_all(&self.pool)
        .await?;

        debug!("Found {} snapshots", rows.len());
        rows.into_iter().map(StoredSnapshot::try_from).collect()
    }

    #[instrument(skip(self), fields(category = %category))]
    async fn purge(&self, category: Category, dam_id: i64) -> Result<bool, DbError> {
        let result =
            sqlx::query("DELETE FROM telemetry_snapshots WHERE dam_id = $1 AND category = $2")
                .bind(dam_id)
                .bind(category.as_str())
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }
}
