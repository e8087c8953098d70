//! REST API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use orchlet_core::{InstanceSpec, InstanceStatus, OrchletError, ServiceSummary};
use orchlet_dispatch::{Orchestrator, OrchestratorStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

/// Application state shared across handlers
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

/// Create the API router
pub fn create_router(orchestrator: Arc<Orchestrator>) -> Router {
    let state = Arc::new(AppState { orchestrator });

    Router::new()
        .route("/api/v1/services", get(list_services))
        .route("/api/v1/services/:service/instances", post(register_instance))
        .route("/api/v1/services/:service/instances", get(list_instances))
        .route("/api/v1/services/:service/requests", post(execute_request))
        .route("/api/v1/status", get(get_status))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

type ApiError = (StatusCode, String);

fn error_response(e: OrchletError) -> ApiError {
    let status = match &e {
        OrchletError::ServiceUnavailable(_) | OrchletError::InterruptedDuringBackoff(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        OrchletError::RetriesExhausted { .. } => StatusCode::BAD_GATEWAY,
        OrchletError::Config(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

/// List all services
async fn list_services(State(state): State<Arc<AppState>>) -> Json<Vec<ServiceSummary>> {
    Json(state.orchestrator.services().await)
}

/// Request to register an instance
#[derive(Debug, Deserialize)]
pub struct RegisterInstanceRequest {
    /// Instance id, unique within the service
    pub id: String,
    pub host: String,
    pub port: u16,
}

/// Register an instance of a service
async fn register_instance(
    State(state): State<Arc<AppState>>,
    Path(service): Path<String>,
    Json(req): Json<RegisterInstanceRequest>,
) -> Result<(StatusCode, Json<InstanceStatus>), ApiError> {
    if req.id.is_empty() || req.host.is_empty() || req.port == 0 {
        return Err((
            StatusCode::BAD_REQUEST,
            "id, host and a non-zero port are required".to_string(),
        ));
    }

    info!(
        service = %service,
        instance_id = %req.id,
        host = %req.host,
        port = req.port,
        "Registering instance"
    );

    let instance = state
        .orchestrator
        .register_spec(InstanceSpec::new(service, req.id, req.host, req.port))
        .await;
    let status = instance
        .status(state.orchestrator.config().breaker.timeout())
        .await;

    Ok((StatusCode::CREATED, Json(status)))
}

/// List the instances of a service
async fn list_instances(
    State(state): State<Arc<AppState>>,
    Path(service): Path<String>,
) -> Result<Json<Vec<InstanceStatus>>, ApiError> {
    let instances = state.orchestrator.instances(&service).await;
    if instances.is_empty() {
        return Err((
            StatusCode::NOT_FOUND,
            format!("Service not found: {}", service),
        ));
    }
    Ok(Json(instances))
}

/// Response for an executed request
#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub request_id: Uuid,
    pub service: String,
    pub result: Value,
}

/// Execute a request against a service
async fn execute_request(
    State(state): State<Arc<AppState>>,
    Path(service): Path<String>,
    Json(payload): Json<Value>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let pending = state.orchestrator.execute_request(&service, payload);
    let request_id = pending.request_id();

    match pending.await {
        Ok(result) => Ok(Json(ExecuteResponse {
            request_id,
            service,
            result,
        })),
        Err(e) => {
            warn!(
                request_id = %request_id,
                service = %service,
                error = %e,
                "Request failed"
            );
            Err(error_response(e))
        }
    }
}

/// System status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: String,
    #[serde(flatten)]
    pub orchestrator: OrchestratorStatus,
}

/// Get system status
async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        orchestrator: state.orchestrator.status().await,
    })
}
