use axum::{
    Router,
    extract::FromRef,
    http::{HeaderName, Method, header},
};
use std::sync::Arc;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod bus;
pub mod config;
pub mod filter;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod store;
pub mod worker;

// --- Public Re-exports ---

// Makes the core types easily accessible to the entry point and tests.
pub use bus::EntityBus;
pub use config::AppConfig;
pub use store::{MemoryStore, StoreState};
pub use worker::EntityWorker;

/// AppState
///
/// The single, thread-safe container shared across all requests: the bus
/// registry (built once at startup, read-only afterwards) and the loaded
/// configuration. No hidden global state; everything a handler needs
/// arrives through this value.
#[derive(Clone)]
pub struct AppState {
    /// The per-entity message-channel registry.
    pub bus: Arc<EntityBus>,
    /// The loaded, immutable configuration.
    pub config: AppConfig,
}

// FromRef implementations let extractors pull individual components out of
// the shared state (the auth extractor only needs the config).

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

impl FromRef<AppState> for Arc<EntityBus> {
    fn from_ref(app_state: &AppState) -> Arc<EntityBus> {
        app_state.bus.clone()
    }
}

/// create_router
///
/// Assembles the application's entire routing structure: one route group
/// per configured entity nested under its endpoint path, the shared CORS
/// policy, and the observability layers (request-id correlation plus
/// request tracing).
pub fn create_router(state: AppState) -> Router {
    // Shared CORS policy: the fixed header and method allow-lists every
    // entity route group answers with.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([
            HeaderName::from_static("x-requested-with"),
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            header::ORIGIN,
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static("x-pingaruner"),
            header::AUTHORIZATION,
        ]);

    let x_request_id = HeaderName::from_static("x-request-id");

    // Base router: a health probe plus one mounted route group per entity.
    let mut base_router = Router::new()
        // GET /health
        // Unauthenticated liveness probe for monitors and load balancers.
        .route("/health", axum::routing::get(|| async { "ok" }));

    for entity in &state.config.entities {
        tracing::info!(entity = %entity.name, endpoint = %entity.endpoint, "mounting entity routes");
        base_router = base_router.nest(&entity.endpoint, routes::entity_routes(entity));
    }

    let base_router = base_router.with_state(state);

    // Observability and correlation layers, applied outermost.
    base_router
        .layer(
            ServiceBuilder::new()
                // Request ID generation: a unique UUID for every request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // Request tracing: wraps the request lifecycle in a span
                // correlated by the generated request id.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // Request ID propagation back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Customizes the `TraceLayer` span so every log line for a single request
/// is correlated by the `x-request-id` header alongside the method and URI.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
