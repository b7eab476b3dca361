use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pollroom::config::ServerConfig;
use pollroom::persist::{FileStore, PollStore};
use pollroom::state::AppState;
use pollroom::ws;

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pollroom=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting poll room server...");

    let config = ServerConfig::from_env();

    let store = config.data_file.clone().map(|path| {
        Arc::new(FileStore::new(
            path,
            chrono::Duration::hours(config.retention_hours),
        )) as Arc<dyn PollStore>
    });

    let state = Arc::new(match store {
        Some(store) => AppState::with_store(config.clone(), store),
        None => AppState::new(config.clone()),
    });

    // Repopulate rooms saved by a previous run (best-effort)
    state.load_persisted().await;

    let app = Router::new()
        .route("/", get(health))
        .route("/ws", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}

async fn health() -> &'static str {
    "Real-Time Poll app is healthy!"
}
