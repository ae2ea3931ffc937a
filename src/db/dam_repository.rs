use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, error, info, instrument};

use crate::db::{Dam, DamRepository, DbError, NewDam};

const DAM_COLUMNS: &str = "id, name, state, river, height_m, length_m, \
     gross_storage_capacity, live_storage_capacity, upstream_dam_id, upstream_distance_km, \
     downstream_dam_id, downstream_distance_km, created_at, updated_at";

#[derive(Clone)]
pub struct PgDamRepository {
    pool: PgPool,
}

impl PgDamRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Column order matches DAM_COLUMNS.
type DamRow = (
    i64,
    String,
    String,
    String,
    Option<f64>,
    Option<f64>,
    Option<f64>,
    Option<f64>,
    Option<i64>,
    Option<f64>,
    Option<i64>,
    Option<f64>,
    chrono::DateTime<chrono::Utc>,
    chrono::DateTime<chrono::Utc>,
);

fn dam_from_row(row: DamRow) -> Dam {
    Dam {
        id: row.0,
        name: row.1,
        state: row.2,
        river: row.3,
        height_m: row.4,
        length_m: row.5,
        gross_storage_capacity: row.6,
        live_storage_capacity: row.7,
        upstream_dam_id: row.8,
        upstream_distance_km: row.9,
        downstream_dam_id: row.10,
        downstream_distance_km: row.11,
        created_at: row.12,
        updated_at: row.13,
    }
}

#[async_trait]
impl DamRepository for PgDamRepository {
    #[instrument(skip(self))]
    async fn find_dam(&self, dam_id: i64) -> Result<Option<Dam>, DbError> {
        debug!("Querying dam by id");

        let row = sqlx::query_as::<_, DamRow>(&format!(
            "SELECT {DAM_COLUMNS} FROM dams WHERE id = $1"
        ))
        .bind(dam_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(dam_from_row))
    }

    #[instrument(skip(self))]
    async fn list_dams(&self) -> Result<Vec<Dam>, DbError> {
        let rows = sqlx::query_as::<_, DamRow>(&format!(
            "SELECT {DAM_COLUMNS} FROM dams ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        debug!("Found {} dams", rows.len());
        Ok(rows.into_iter().map(dam_from_row).collect())
    }

    #[instrument(skip(self, dam), fields(name = %dam.name))]
    async fn insert_dam(&self, dam: &NewDam) -> Result<Dam, DbError> {
        let row = sqlx::query_as::<_, DamRow>(&format!(
            r#"
            INSERT INTO dams (
                name, state, river, height_m, length_m,
                gross_storage_capacity, live_storage_capacity,
                upstream_dam_id, upstream_distance_km,
                downstream_dam_id, downstream_distance_km
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {DAM_COLUMNS}
            "#
        ))
        .bind(&dam.name)
        .bind(&dam.state)
        .bind(&dam.river)
        .bind(dam.height_m)
        .bind(dam.length_m)
        .bind(dam.gross_storage_capacity)
        .bind(dam.live_storage_capacity)
        .bind(dam.upstream_dam_id)
        .bind(dam.upstream_distance_km)
        .bind(dam.downstream_dam_id)
        .bind(dam.downstream_distance_km)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!(name = %dam.name, error = %e, "Failed to insert dam");
            e
        })?;

        let dam = dam_from_row(row);
        info!(dam_id = dam.id, "Inserted dam");
        Ok(dam)
    }
}
