use sqlx::PgPool;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::{create_router, AppState};
use crate::config::Config;
use crate::db::{DamRepository, PgDamRepository, PgSnapshotRepository, SnapshotRepository};
use crate::scheduler;
use crate::services::Services;

/// Running server plus the background recompute job.
pub struct Application {
    pub server_handle: JoinHandle<Result<(), std::io::Error>>,
    pub recompute_scheduler_handle: JoinHandle<()>,
}

impl Application {
    /// Wire the Postgres repositories into the services, spawn the periodic
    /// stale-snapshot recompute and the HTTP server.
    pub async fn build(config: Config, pool: PgPool) -> Result<Self, Box<dyn std::error::Error>> {
        info!("Initializing application components");

        let dam_repo: Arc<dyn DamRepository> = Arc::new(PgDamRepository::new(pool.clone()));
        let snapshot_repo: Arc<dyn SnapshotRepository> =
            Arc::new(PgSnapshotRepository::new(pool));

        let services = Services::new(
            dam_repo,
            snapshot_repo,
            config.recompute_concurrency,
            config.alert_score_threshold,
        );

        let recompute_scheduler_handle = {
            let dam_service = services.dams.clone();
            let recalculation = services.recalculation.clone();
            let interval = config.recompute_interval_minutes;

            tokio::spawn(async move {
                scheduler::start_recompute_scheduler(dam_service, recalculation, interval).await;
            })
        };

        let app_state = AppState { services };
        let app = create_router(app_state).layer(TraceLayer::new_for_http());

        let addr = config.server_addr();
        info!("Starting HTTP server on {}", addr);

        let server_handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            axum::serve(listener, app).await
        });

        info!("Application initialized successfully");

        Ok(Self {
            server_handle,
            recompute_scheduler_handle,
        })
    }

    /// Run until the server stops. The scheduler keeps running alongside it.
    pub async fn run_until_stopped(self) -> Result<(), Box<dyn std::error::Error>> {
        self.server_handle.await??;
        Ok(())
    }
}
