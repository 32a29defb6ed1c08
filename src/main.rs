//! Live-session binary entrypoint wiring room WebSockets, group notifications and storage.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quiz_live_back::{
    config::{AppConfig, StorageBackend},
    dao::live_store::{
        Collaborators,
        memory::{InMemoryGroupDirectory, InMemoryLiveStore},
    },
    routes,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let port = config.port();
    let app_state = AppState::new(config);

    start_storage(&app_state).await;
    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Install the configured collaborators. MongoDB is connected by the storage supervisor in
/// the background; the server stays in degraded mode until it succeeds.
async fn start_storage(state: &SharedState) {
    match state.config().storage().clone() {
        StorageBackend::Memory => install_memory(state).await,
        #[cfg(feature = "mongo-store")]
        StorageBackend::Mongo { uri, database } => {
            use quiz_live_back::{
                dao::live_store::mongodb::{MongoConfig, MongoLiveStore},
                services::storage_supervisor,
            };

            info!(database = ?database, "using MongoDB storage");
            tokio::spawn(storage_supervisor::run(state.clone(), move || {
                let uri = uri.clone();
                let database = database.clone();
                async move {
                    let config = MongoConfig::from_uri(&uri, database.as_deref()).await?;
                    let store = Arc::new(MongoLiveStore::connect(config).await?);
                    Ok(Collaborators::new(store.clone(), store))
                }
            }));
        }
        #[cfg(not(feature = "mongo-store"))]
        StorageBackend::Mongo { .. } => {
            warn!("MongoDB storage configured but the `mongo-store` feature is disabled");
            install_memory(state).await;
        }
    }
}

async fn install_memory(state: &SharedState) {
    let groups =
        InMemoryGroupDirectory::from_memberships(state.config().group_memberships().to_vec());
    state
        .install_collaborators(Collaborators::new(
            Arc::new(InMemoryLiveStore::new()),
            Arc::new(groups),
        ))
        .await;
    info!("using in-memory storage; data is lost on restart");
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
