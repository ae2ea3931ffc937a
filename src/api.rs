use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};
use utoipa::{IntoParams, OpenApi, ToSchema};

use crate::classification::{
    AlertLevel, Axis, DangerLevelStatus, EmergencyLevel, MaintenanceUrgency, RiskZone,
};
use crate::db::{Category, Dam, NewDam, StoredSnapshot};
use crate::derivation::{AlertFlags, FlowTrend};
use crate::error::EngineError;
use crate::services::{
    ActiveAlert, AlertFilter, BasinSummary, BatchRecomputeReport, ClassificationResponse,
    DamFailure, RecomputeReport, Services, WriteOutcome,
};
use crate::views::{Audience, AudienceView, ControllerView, GovernmentView, PublicView, RescueView};

#[derive(Clone)]
pub struct AppState {
    pub services: Services,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

/// Error returned by every handler, rendered as `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message,
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        let status = match &e {
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::Database(_)
            | EngineError::Serialization(_)
            | EngineError::DependencyCycle(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

/// Log at a level matching the status and convert.
fn reject(context: &str, e: EngineError) -> ApiError {
    let api_error = ApiError::from(e);
    if api_error.status.is_server_error() {
        error!("{}: {}", context, api_error.message);
    } else {
        warn!("{}: {}", context, api_error.message);
    }
    api_error
}

fn parse_category(raw: &str) -> Result<Category, ApiError> {
    raw.parse().map_err(|e: String| {
        warn!("Rejected category '{}'", raw);
        ApiError::bad_request(e)
    })
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ClassifyParams {
    pub score: f64,
    /// emergencyLevel, alertLevel or riskZone
    pub axis: String,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        list_dams,
        create_dam,
        get_dam,
        get_basin,
        list_telemetry,
        put_telemetry,
        get_telemetry,
        delete_telemetry,
        recompute_dam,
        recompute_dam_category,
        recompute_dam_stale,
        recompute_category_all_dams,
        get_view,
        list_active_alerts,
        classify,
    ),
    components(schemas(
        HealthResponse,
        ErrorResponse,
        Dam,
        NewDam,
        BasinSummary,
        Category,
        StoredSnapshot,
        WriteOutcome,
        RecomputeReport,
        BatchRecomputeReport,
        DamFailure,
        Audience,
        AudienceView,
        ControllerView,
        GovernmentView,
        RescueView,
        PublicView,
        ActiveAlert,
        AlertFlags,
        Axis,
        ClassificationResponse,
        EmergencyLevel,
        AlertLevel,
        RiskZone,
        DangerLevelStatus,
        MaintenanceUrgency,
        FlowTrend,
    )),
    tags((name = "dam-safety", description = "Dam safety derived-field engine"))
)]
pub struct ApiDoc;

pub fn generate_openapi_spec() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health))
        .route("/dams", get(list_dams).post(create_dam))
        .route("/dams/{dam_id}", get(get_dam))
        .route("/dams/{dam_id}/basin", get(get_basin))
        .route("/dams/{dam_id}/telemetry", get(list_telemetry))
        .route(
            "/dams/{dam_id}/telemetry/{category}",
            get(get_telemetry).put(put_telemetry).delete(delete_telemetry),
        )
        .route("/dams/{dam_id}/recompute", post(recompute_dam))
        .route("/dams/{dam_id}/recompute/{category}", post(recompute_dam_category))
        .route("/dams/{dam_id}/recompute-stale", post(recompute_dam_stale))
        .route("/telemetry/{category}/recompute", post(recompute_category_all_dams))
        .route("/dams/{dam_id}/views/{audience}", get(get_view))
        .route("/alerts/active", get(list_active_alerts))
        .route("/classify", get(classify))
        .with_state(state);

    Router::new().nest("/api/v1", api_routes)
}

#[utoipa::path(get, path = "/api/v1/health", responses((status = 200, body = HealthResponse)))]
#[instrument(skip(_state))]
async fn health(State(_state): State<AppState>) -> impl IntoResponse {
    debug!("Health check requested");
    let response = HealthResponse {
        status: "healthy".to_string(),
    };
    (StatusCode::OK, Json(response))
}

#[utoipa::path(get, path = "/api/v1/dams", responses((status = 200, body = Vec<Dam>)))]
#[instrument(skip(state))]
async fn list_dams(State(state): State<AppState>) -> Result<Json<Vec<Dam>>, ApiError> {
    let dams = state
        .services
        .dams
        .list_dams()
        .await
        .map_err(|e| reject("Failed to list dams", e))?;
    info!("Listed {} dams", dams.len());
    Ok(Json(dams))
}

#[utoipa::path(
    post,
    path = "/api/v1/dams",
    request_body = NewDam,
    responses(
        (status = 201, body = Dam),
        (status = 422, body = ErrorResponse),
    )
)]
#[instrument(skip(state, dam), fields(name = %dam.name))]
async fn create_dam(
    State(state): State<AppState>,
    Json(dam): Json<NewDam>,
) -> Result<(StatusCode, Json<Dam>), ApiError> {
    let created = state
        .services
        .register_dam(&dam)
        .await
        .map_err(|e| reject("Failed to create dam", e))?;
    info!("Created dam {} ({})", created.id, created.name);
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/api/v1/dams/{dam_id}",
    params(("dam_id" = i64, Path, description = "Dam id")),
    responses((status = 200, body = Dam), (status = 404, body = ErrorResponse))
)]
#[instrument(skip(state), fields(dam_id = %dam_id))]
async fn get_dam(
    State(state): State<AppState>,
    Path(dam_id): Path<i64>,
) -> Result<Json<Dam>, ApiError> {
    let dam = state
        .services
        .dams
        .get_dam(dam_id)
        .await
        .map_err(|e| reject("Failed to fetch dam", e))?;
    Ok(Json(dam))
}

#[utoipa::path(
    get,
    path = "/api/v1/dams/{dam_id}/basin",
    params(("dam_id" = i64, Path, description = "Dam id")),
    responses((status = 200, body = BasinSummary), (status = 404, body = ErrorResponse))
)]
#[instrument(skip(state), fields(dam_id = %dam_id))]
async fn get_basin(
    State(state): State<AppState>,
    Path(dam_id): Path<i64>,
) -> Result<Json<BasinSummary>, ApiError> {
    let basin = state
        .services
        .dams
        .basin_summary(dam_id)
        .await
        .map_err(|e| reject("Failed to resolve basin", e))?;
    info!("Dam {} basin has {} members", dam_id, basin.dams_in_basin);
    Ok(Json(basin))
}

#[utoipa::path(
    get,
    path = "/api/v1/dams/{dam_id}/telemetry",
    params(("dam_id" = i64, Path, description = "Dam id")),
    responses((status = 200, body = Vec<StoredSnapshot>), (status = 404, body = ErrorResponse))
)]
#[instrument(skip(state), fields(dam_id = %dam_id))]
async fn list_telemetry(
    State(state): State<AppState>,
    Path(dam_id): Path<i64>,
) -> Result<Json<Vec<StoredSnapshot>>, ApiError> {
    let snapshots = state
        .services
        .telemetry
        .list_snapshots(dam_id)
        .await
        .map_err(|e| reject("Failed to list snapshots", e))?;
    Ok(Json(snapshots))
}

#[utoipa::path(
    put,
    path = "/api/v1/dams/{dam_id}/telemetry/{category}",
    params(
        ("dam_id" = i64, Path, description = "Dam id"),
        ("category" = String, Path, description = "Category wire name or kebab-case slug"),
    ),
    request_body(content = Value, description = "Partial input block; null clears a field"),
    responses(
        (status = 200, body = WriteOutcome),
        (status = 400, body = ErrorResponse),
        (status = 404, body = ErrorResponse),
        (status = 422, body = ErrorResponse),
    )
)]
#[instrument(skip(state, patch), fields(dam_id = %dam_id, category = %category))]
async fn put_telemetry(
    State(state): State<AppState>,
    Path((dam_id, category)): Path<(i64, String)>,
    Json(patch): Json<Value>,
) -> Result<Json<WriteOutcome>, ApiError> {
    let category = parse_category(&category)?;
    let outcome = state
        .services
        .telemetry
        .write_inputs(dam_id, category, &patch)
        .await
        .map_err(|e| reject("Failed to write telemetry", e))?;
    info!(
        "Wrote {} inputs for dam {} (revision {}, {} snapshots derived)",
        category,
        dam_id,
        outcome.snapshot.input_revision,
        outcome.reports.len()
    );
    Ok(Json(outcome))
}

#[utoipa::path(
    get,
    path = "/api/v1/dams/{dam_id}/telemetry/{category}",
    params(
        ("dam_id" = i64, Path, description = "Dam id"),
        ("category" = String, Path, description = "Category wire name or kebab-case slug"),
    ),
    responses(
        (status = 200, body = StoredSnapshot),
        (status = 400, body = ErrorResponse),
        (status = 404, body = ErrorResponse),
    )
)]
#[instrument(skip(state), fields(dam_id = %dam_id, category = %category))]
async fn get_telemetry(
    State(state): State<AppState>,
    Path((dam_id, category)): Path<(i64, String)>,
) -> Result<Json<StoredSnapshot>, ApiError> {
    let category = parse_category(&category)?;
    let snapshot = state
        .services
        .telemetry
        .get_snapshot(dam_id, category)
        .await
        .map_err(|e| reject("Failed to fetch snapshot", e))?;
    Ok(Json(snapshot))
}

#[utoipa::path(
    delete,
    path = "/api/v1/dams/{dam_id}/telemetry/{category}",
    params(
        ("dam_id" = i64, Path, description = "Dam id"),
        ("category" = String, Path, description = "Category wire name or kebab-case slug"),
    ),
    responses(
        (status = 200, body = Vec<RecomputeReport>, description = "Dependents recomputed after the purge"),
        (status = 404, body = ErrorResponse),
    )
)]
#[instrument(skip(state), fields(dam_id = %dam_id, category = %category))]
async fn delete_telemetry(
    State(state): State<AppState>,
    Path((dam_id, category)): Path<(i64, String)>,
) -> Result<Json<Vec<RecomputeReport>>, ApiError> {
    let category = parse_category(&category)?;
    let reports = state
        .services
        .telemetry
        .purge_snapshot(dam_id, category)
        .await
        .map_err(|e| reject("Failed to purge snapshot", e))?;
    info!("Purged {} snapshot of dam {}", category, dam_id);
    Ok(Json(reports))
}

#[utoipa::path(
    post,
    path = "/api/v1/dams/{dam_id}/recompute",
    params(("dam_id" = i64, Path, description = "Dam id")),
    responses((status = 200, body = Vec<RecomputeReport>), (status = 404, body = ErrorResponse))
)]
#[instrument(skip(state), fields(dam_id = %dam_id))]
async fn recompute_dam(
    State(state): State<AppState>,
    Path(dam_id): Path<i64>,
) -> Result<Json<Vec<RecomputeReport>>, ApiError> {
    let reports = state
        .services
        .recalculation
        .recompute_all_categories(dam_id)
        .await
        .map_err(|e| reject("Failed to recompute dam", e))?;
    info!("Recomputed {} snapshots for dam {}", reports.len(), dam_id);
    Ok(Json(reports))
}

#[utoipa::path(
    post,
    path = "/api/v1/dams/{dam_id}/recompute/{category}",
    params(
        ("dam_id" = i64, Path, description = "Dam id"),
        ("category" = String, Path, description = "Category wire name or kebab-case slug"),
    ),
    responses(
        (status = 200, body = Vec<RecomputeReport>),
        (status = 400, body = ErrorResponse),
        (status = 404, body = ErrorResponse),
    )
)]
#[instrument(skip(state), fields(dam_id = %dam_id, category = %category))]
async fn recompute_dam_category(
    State(state): State<AppState>,
    Path((dam_id, category)): Path<(i64, String)>,
) -> Result<Json<Vec<RecomputeReport>>, ApiError> {
    let category = parse_category(&category)?;
    let reports = state
        .services
        .recalculation
        .recompute_category(dam_id, category)
        .await
        .map_err(|e| reject("Failed to recompute category", e))?;
    Ok(Json(reports))
}

#[utoipa::path(
    post,
    path = "/api/v1/dams/{dam_id}/recompute-stale",
    params(("dam_id" = i64, Path, description = "Dam id")),
    responses((status = 200, body = Vec<RecomputeReport>), (status = 404, body = ErrorResponse))
)]
#[instrument(skip(state), fields(dam_id = %dam_id))]
async fn recompute_dam_stale(
    State(state): State<AppState>,
    Path(dam_id): Path<i64>,
) -> Result<Json<Vec<RecomputeReport>>, ApiError> {
    let reports = state
        .services
        .recalculation
        .recompute_stale(dam_id)
        .await
        .map_err(|e| reject("Failed to recompute stale snapshots", e))?;
    Ok(Json(reports))
}

#[utoipa::path(
    post,
    path = "/api/v1/telemetry/{category}/recompute",
    params(("category" = String, Path, description = "Category wire name or kebab-case slug")),
    responses((status = 200, body = BatchRecomputeReport), (status = 400, body = ErrorResponse))
)]
#[instrument(skip(state), fields(category = %category))]
async fn recompute_category_all_dams(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> Result<Json<BatchRecomputeReport>, ApiError> {
    let category = parse_category(&category)?;
    let report = state
        .services
        .recalculation
        .recompute_category_for_all_dams(category)
        .await
        .map_err(|e| reject("Failed to recompute category across dams", e))?;
    info!(
        "Recomputed {} on {} dams ({} changed, {} failed)",
        category,
        report.dams_processed,
        report.snapshots_changed,
        report.failures.len()
    );
    Ok(Json(report))
}

#[utoipa::path(
    get,
    path = "/api/v1/dams/{dam_id}/views/{audience}",
    params(
        ("dam_id" = i64, Path, description = "Dam id"),
        ("audience" = String, Path, description = "controller, government, rescue or public"),
    ),
    responses(
        (status = 200, body = AudienceView),
        (status = 400, body = ErrorResponse),
        (status = 404, body = ErrorResponse),
    )
)]
#[instrument(skip(state), fields(dam_id = %dam_id, audience = %audience))]
async fn get_view(
    State(state): State<AppState>,
    Path((dam_id, audience)): Path<(i64, String)>,
) -> Result<Json<AudienceView>, ApiError> {
    let audience: Audience = audience.parse().map_err(|e: String| {
        warn!("Rejected audience '{}'", audience);
        ApiError::bad_request(e)
    })?;
    let view = state
        .services
        .views
        .get_view(dam_id, audience)
        .await
        .map_err(|e| reject("Failed to build view", e))?;
    Ok(Json(view))
}

#[utoipa::path(
    get,
    path = "/api/v1/alerts/active",
    params(AlertFilter),
    responses((status = 200, body = Vec<ActiveAlert>), (status = 422, body = ErrorResponse))
)]
#[instrument(skip(state))]
async fn list_active_alerts(
    State(state): State<AppState>,
    Query(filter): Query<AlertFilter>,
) -> Result<Json<Vec<ActiveAlert>>, ApiError> {
    let alerts = state
        .services
        .views
        .list_active_alerts(&filter)
        .await
        .map_err(|e| reject("Failed to list active alerts", e))?;
    info!("{} active alerts", alerts.len());
    Ok(Json(alerts))
}

#[utoipa::path(
    get,
    path = "/api/v1/classify",
    params(ClassifyParams),
    responses(
        (status = 200, body = ClassificationResponse),
        (status = 400, body = ErrorResponse),
        (status = 422, body = ErrorResponse),
    )
)]
#[instrument(skip(state))]
async fn classify(
    State(state): State<AppState>,
    Query(params): Query<ClassifyParams>,
) -> Result<Json<ClassificationResponse>, ApiError> {
    let axis: Axis = params.axis.parse().map_err(|e: String| {
        warn!("Rejected axis '{}'", params.axis);
        ApiError::bad_request(e)
    })?;
    let response = state
        .services
        .views
        .classify(params.score, axis)
        .map_err(|e| reject("Failed to classify score", e))?;
    Ok(Json(response))
}
