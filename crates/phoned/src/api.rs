use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::engine::Engine;
use crate::engine::PhoneSnapshot;
use crate::phone::service::describe_services;
use crate::phone::service::ServiceDescription;
use crate::phone::PlaceCall;
use crate::phone::ServiceError;

/// Response for the /v1/ping endpoint
#[derive(Serialize)]
struct PingResponse {
    status: String,
}

/// Response for the /v1/info endpoint
#[derive(Serialize)]
struct InfoResponse {
    version: String,
    hostname: String,
    phones: usize,
}

/// One phone as listed by /v1/states
#[derive(Serialize)]
struct EntityStateResponse {
    entity_id: String,
    #[serde(flatten)]
    snapshot: PhoneSnapshot,
    attributes: serde_json::Map<String, serde_json::Value>,
}

impl EntityStateResponse {
    fn new(entity_id: &str, snapshot: &PhoneSnapshot) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            attributes: snapshot.attributes(),
            snapshot: snapshot.clone(),
        }
    }
}

/// Response for a dispatched service call
#[derive(Serialize)]
struct ServiceCallResponse {
    entity_ids: Vec<String>,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    version: &'static str,
    engine: Arc<Engine>,
}

/// Errors returned by API handlers
#[derive(Debug, thiserror::Error)]
enum ApiError {
    #[error("entity not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) | ApiError::Service(ServiceError::UnknownEntity(_)) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Service(ServiceError::Dispatch { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Service(_) => StatusCode::BAD_REQUEST,
        };
        tracing::debug!("Request failed with {}: {}", status, self);
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Handler for GET /v1/ping
#[tracing::instrument]
async fn ping() -> impl IntoResponse {
    tracing::debug!("Handling /v1/ping request");
    (
        StatusCode::OK,
        Json(PingResponse {
            status: "ok".to_string(),
        }),
    )
}

/// Handler for GET /v1/info
#[tracing::instrument(skip(state))]
async fn info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Handling /v1/info request");

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    (
        StatusCode::OK,
        Json(InfoResponse {
            version: state.version.to_string(),
            hostname,
            phones: state.engine.state_snapshot().phones.len(),
        }),
    )
}

/// Handler for GET /v1/states
#[tracing::instrument(skip(state))]
async fn states(State(state): State<Arc<AppState>>) -> Json<Vec<EntityStateResponse>> {
    let snapshot = state.engine.state_snapshot();
    Json(
        snapshot
            .phones
            .iter()
            .map(|(entity_id, phone)| EntityStateResponse::new(entity_id, phone))
            .collect(),
    )
}

/// Handler for GET /v1/states/:entity_id
#[tracing::instrument(skip(state))]
async fn entity_state(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
) -> Result<Json<EntityStateResponse>, ApiError> {
    let snapshot = state.engine.state_snapshot();
    let phone = snapshot
        .phones
        .get(&entity_id)
        .ok_or_else(|| ApiError::NotFound(entity_id.clone()))?;
    Ok(Json(EntityStateResponse::new(&entity_id, phone)))
}

/// Handler for GET /v1/services
#[tracing::instrument]
async fn services() -> Json<Vec<ServiceDescription>> {
    Json(describe_services())
}

/// Handler for POST /v1/services/phone/call_number
#[tracing::instrument(skip(state))]
async fn call_number(
    State(state): State<Arc<AppState>>,
    Json(data): Json<serde_json::Value>,
) -> Result<Json<ServiceCallResponse>, ApiError> {
    let call = PlaceCall::from_service_data(data)?;
    let entity_ids = state.engine.call_service(&call)?;
    tracing::info!("Calling {} from {:?}", call.destination, entity_ids);
    Ok(Json(ServiceCallResponse { entity_ids }))
}

/// Create the API router with all endpoints
pub fn create_router(engine: Arc<Engine>) -> Router {
    let state = Arc::new(AppState {
        version: env!("CARGO_PKG_VERSION"),
        engine,
    });

    Router::new()
        .route("/v1/ping", get(ping))
        .route("/v1/info", get(info))
        .route("/v1/states", get(states))
        .route("/v1/states/:entity_id", get(entity_state))
        .route("/v1/services", get(services))
        .route("/v1/services/phone/call_number", post(call_number))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP API server
///
/// Binds to `listen:port` and serves the API until `shutdown_rx` fires.
pub async fn serve(
    listen: String,
    port: u16,
    engine: Arc<Engine>,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = create_router(engine);

    let addr: SocketAddr = format!("{}:{}", listen, port).parse()?;
    tracing::info!("Starting HTTP API server on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            tracing::info!("HTTP API server shutting down gracefully");
        })
        .await?;

    Ok(())
}
