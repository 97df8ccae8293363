//! Offline proxy server.
//!
//! Fronts the application origin with the cache controller. Local routes live
//! under `/__sw/` and `/health`; every other request is intercepted.

// Allow clippy lint triggered by utoipa's OpenApi derive macro
#![allow(clippy::needless_for_each)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use agent_core::CATALOG;

use crate::config::Config;
use crate::core::offline::{
    self, ActivateReport, CacheController, CacheStorage, ClientMessage, Destination, FetchOutcome,
    HttpFetcher, RequestMode,
};
use crate::core::storage::BlobStore;

/// Largest request body forwarded to the origin.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Shared application state.
pub struct AppState {
    /// The cache controller fronting the origin.
    pub controller: Arc<CacheController>,

    /// API token for the control routes (if configured).
    pub token: Option<String>,
}

type SharedState = Arc<AppState>;

/// `OpenAPI` documentation.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "BeastMode Offline Proxy",
        description = "Offline cache in front of the BeastMode application",
        version = "0.1.0",
        license(name = "MIT")
    ),
    paths(health, list_models, controller_status, post_message),
    components(schemas(ModelEntry, StatusResponse, MessageRequest, MessageResponse))
)]
struct ApiDoc;

/// Authentication middleware.
///
/// Validates the `Authorization: Bearer <token>` header if a token is configured.
async fn auth_middleware(
    State(state): State<SharedState>,
    headers: HeaderMap,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    // If no token configured, allow all requests (localhost-only mode)
    let Some(ref expected_token) = state.token else {
        return next.run(request).await;
    };

    let auth_header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match auth_header {
        Some(token) if token == expected_token => next.run(request).await,
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": "unauthorized",
                "message": "Missing or invalid Authorization header. Use: Bearer <token>"
            })),
        )
            .into_response(),
    }
}

/// Build the router over an already-constructed state.
pub fn router(state: SharedState) -> Router {
    let control_routes = Router::new()
        .route("/__sw/status", get(controller_status))
        .route("/__sw/message", post(post_message))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/__sw/models", get(list_models))
        .merge(SwaggerUi::new("/__sw/docs").url("/__sw/openapi.json", ApiDoc::openapi()));

    Router::new()
        .merge(control_routes)
        .merge(public_routes)
        .fallback(proxy)
        .with_state(state)
}

/// Install and activate the cache, then serve until interrupted.
///
/// # Errors
///
/// Returns an error if the cache configuration is invalid or the server
/// fails to bind or start.
pub async fn serve(config: &Config, storage: Arc<dyn BlobStore>) -> anyhow::Result<()> {
    let controller_config = config.cache.controller_config()?;
    let origin = controller_config.origin.clone();
    let fetcher = HttpFetcher::new(Some(Duration::from_secs(config.runner.timeout_secs)))?;
    let controller = Arc::new(CacheController::new(
        controller_config,
        Arc::new(CacheStorage::persistent(storage)),
        Arc::new(fetcher),
    ));

    let report = controller.install().await?;
    if !report.is_complete() {
        tracing::warn!(
            skipped = report.skipped.len(),
            "origin unreachable for part of the manifest, offline pages may be missing"
        );
    }
    controller.activate()?;

    let state = Arc::new(AppState {
        controller,
        token: config.api.token(),
    });
    let auth_enabled = state.token.is_some();
    let app = router(state).layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.api.host, config.api.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    if auth_enabled {
        tracing::info!(addr = %addr, origin = %origin, "starting offline proxy (auth enabled)");
    } else {
        tracing::warn!(addr = %addr, origin = %origin, "starting offline proxy (NO AUTH - localhost only recommended)");
    }

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service healthy", body = String))
)]
async fn health() -> &'static str {
    "ok"
}

/// One selectable model.
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ModelEntry {
    /// Model identifier used in agent records.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Model vendor.
    pub provider: String,
    /// Whether the model is free to use.
    pub free: bool,
    pub description: String,
}

/// List the model catalog.
#[utoipa::path(
    get,
    path = "/__sw/models",
    responses((status = 200, description = "Model catalog", body = Vec<ModelEntry>))
)]
async fn list_models() -> Json<Vec<ModelEntry>> {
    Json(
        CATALOG
            .iter()
            .map(|m| ModelEntry {
                id: m.id.to_string(),
                name: m.name.to_string(),
                provider: m.provider.to_string(),
                free: m.free,
                description: m.description.to_string(),
            })
            .collect(),
    )
}

/// Controller status.
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct StatusResponse {
    /// Lifecycle state.
    pub state: String,
    /// Generation being served.
    pub generation: String,
    /// Every stored generation.
    pub generations: Vec<String>,
    /// Responses cached in the current generation.
    pub entries: usize,
    pub skip_waiting: bool,
}

/// Report the controller's lifecycle state and cache contents.
#[utoipa::path(
    get,
    path = "/__sw/status",
    responses(
        (status = 200, description = "Controller status", body = StatusResponse),
        (status = 401, description = "Missing or invalid token")
    )
)]
async fn controller_status(State(state): State<SharedState>) -> Json<StatusResponse> {
    let controller = &state.controller;
    let generation = controller.config().generation.clone();
    Json(StatusResponse {
        state: controller.state().to_string(),
        entries: controller.cache().keys(&generation).len(),
        generations: controller.cache().generations(),
        generation,
        skip_waiting: controller.skip_waiting(),
    })
}

/// Message posted by a client view.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct MessageRequest {
    /// Message type, e.g. `SKIP_WAITING`.
    #[serde(rename = "type")]
    pub kind: String,
}

/// Outcome of a client message.
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct MessageResponse {
    /// Lifecycle state after the message.
    pub state: String,
    /// Generations purged by an activation the message triggered.
    #[serde(default)]
    pub deleted: Vec<String>,
    /// Whether the message triggered an activation.
    pub activated: bool,
}

/// Deliver a lifecycle message to the controller.
#[utoipa::path(
    post,
    path = "/__sw/message",
    request_body = MessageRequest,
    responses(
        (status = 200, description = "Message handled", body = MessageResponse),
        (status = 400, description = "Unknown message type"),
        (status = 401, description = "Missing or invalid token"),
        (status = 409, description = "Not valid in the current state")
    )
)]
async fn post_message(
    State(state): State<SharedState>,
    Json(req): Json<MessageRequest>,
) -> Result<Json<MessageResponse>, (StatusCode, String)> {
    let message: ClientMessage = req
        .kind
        .parse()
        .map_err(|e| (StatusCode::BAD_REQUEST, e))?;

    let activation: Option<ActivateReport> = state
        .controller
        .handle_message(message)
        .map_err(|e| (StatusCode::CONFLICT, e.to_string()))?;

    Ok(Json(MessageResponse {
        state: state.controller.state().to_string(),
        activated: activation.is_some(),
        deleted: activation.map(|a| a.deleted).unwrap_or_default(),
    }))
}

/// Whether the client is loading a page rather than a subresource.
fn request_mode(method: &axum::http::Method, headers: &HeaderMap) -> RequestMode {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let navigate = match header("sec-fetch-mode") {
        Some(mode) => mode == "navigate",
        // Clients without fetch metadata: treat HTML page loads as navigations.
        None => {
            method == axum::http::Method::GET
                && header("accept").is_some_and(|a| a.contains("text/html"))
        }
    };
    if navigate {
        RequestMode::Navigate
    } else {
        RequestMode::Other
    }
}

/// Convert an incoming request into a controller request against the origin.
async fn to_offline_request(
    origin: &reqwest::Url,
    request: axum::extract::Request,
) -> Result<offline::Request, (StatusCode, String)> {
    let (parts, body) = request.into_parts();

    // Only the path and query come from the client; scheme and host are fixed.
    let mut url = origin.clone();
    url.set_path(parts.uri.path());
    url.set_query(parts.uri.query());
    if url.origin() != origin.origin() {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("request leaves the origin: {url}"),
        ));
    }

    let method = reqwest::Method::from_bytes(parts.method.as_str().as_bytes())
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    let destination = parts
        .headers
        .get("sec-fetch-dest")
        .and_then(|v| v.to_str().ok())
        .map_or(Destination::Other, Destination::from_fetch_dest);
    let mode = request_mode(&parts.method, &parts.headers);
    let headers = parts
        .headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
        .collect();
    let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| (StatusCode::PAYLOAD_TOO_LARGE, e.to_string()))?
        .to_vec();

    Ok(offline::Request {
        method,
        url,
        mode,
        destination,
        headers,
        body,
    })
}

/// Convert a controller response into an HTTP response.
fn into_http(response: offline::Response) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = axum::http::Response::builder().status(status);
    for (name, value) in &response.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
        .body(Body::from(response.body))
        .unwrap_or_else(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response())
}

/// Every request that is not a local route.
async fn proxy(State(state): State<SharedState>, request: axum::extract::Request) -> Response {
    let controller = &state.controller;
    let request = match to_offline_request(&controller.config().origin, request).await {
        Ok(request) => request,
        Err(rejection) => return rejection.into_response(),
    };

    match controller.intercept(&request).await {
        FetchOutcome::Respond(response) => into_http(response),
        FetchOutcome::Bypass => match controller.pass_through(&request).await {
            Ok(response) => into_http(response),
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "pass-through failed");
                (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
            }
        },
    }
}
