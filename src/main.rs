use docgate::{
    AppState, EntityBus, EntityWorker,
    config::{AppConfig, Env},
    create_router, store,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// The asynchronous entry point: configuration, logging, document store,
/// database workers, and the HTTP server, in that order.
#[tokio::main]
async fn main() {
    // 1. Configuration Loading (Fail-Fast)
    // An optional first CLI argument overrides the config file location.
    dotenv::dotenv().ok();
    let config_path = std::env::args().nth(1);
    let config = AppConfig::load(config_path.as_deref());

    // 2. Logging Filter Setup
    // RUST_LOG wins; otherwise sensible defaults for local development.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "docgate=debug,tower_http=info,axum=trace".into());

    // 3. Initialize Logging based on Environment
    match config.env {
        Env::Local => {
            // LOCAL: pretty output for human readability.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // PROD: JSON output for centralized log aggregation.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Gateway starting in {:?} mode", config.env);

    // 4. Document Store Initialization
    let store = store::connect(&config.store);

    // 5. Database Tier: one worker per configured entity, registered on the
    // bus under the entity's address.
    let mut bus = EntityBus::new();
    for entity in &config.entities {
        let sender = EntityWorker::spawn(entity.name.clone(), store.clone());
        bus.register(entity.name.clone(), sender);
    }

    // 6. Router and Server Startup
    let port = config
        .http_port
        .expect("FATAL: no port specified in configuration");

    let state = AppState {
        bus: Arc::new(bus),
        config,
    };
    let app = create_router(state);

    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .unwrap_or_else(|e| panic!("FATAL: could not bind port {port}: {e}"));

    tracing::info!("HTTP server listening on 0.0.0.0:{port}");

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated");
}
