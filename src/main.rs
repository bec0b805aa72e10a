//! reel-pick binary entrypoint wiring the HTTP surface, the change feed and the storage backend.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reel_pick::{
    config::AppConfig,
    dao::{
        metadata::{MetadataProvider, PlaceholderMetadata, TmdbClient},
        session_store::{SessionStore, memory::MemorySessionStore},
        storage::StorageError,
    },
    routes,
    services::storage_supervisor,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let metadata: Arc<dyn MetadataProvider> = match config.metadata_token() {
        Some(token) => Arc::new(TmdbClient::new(config.metadata().clone(), token)),
        None => Arc::new(PlaceholderMetadata),
    };
    let app_state = AppState::new(config, metadata);

    spawn_storage(app_state.clone()).await;
    let app = build_router(app_state);

    let port = env::var("PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Pick the backend from the environment: MongoDB when `MONGO_URI` is set, CouchDB when
/// `COUCH_BASE_URL` is set, otherwise an in-memory store.
async fn spawn_storage(state: SharedState) {
    #[cfg(feature = "mongo-store")]
    {
        use reel_pick::dao::session_store::mongodb::{MongoConfig, MongoSessionStore};

        if env::var_os("MONGO_URI").is_some() {
            info!("using MongoDB session store");
            tokio::spawn(storage_supervisor::run(state, || async {
                let config = MongoConfig::from_env().await?;
                let store = MongoSessionStore::connect(config).await?;
                Ok::<_, StorageError>(Arc::new(store) as Arc<dyn SessionStore>)
            }));
            return;
        }
    }

    #[cfg(feature = "couch-store")]
    {
        use reel_pick::dao::session_store::couchdb::{CouchConfig, CouchSessionStore};

        if env::var_os("COUCH_BASE_URL").is_some() {
            info!("using CouchDB session store");
            tokio::spawn(storage_supervisor::run(state, || async {
                let config = CouchConfig::from_env()?;
                let store = CouchSessionStore::connect(config).await?;
                Ok::<_, StorageError>(Arc::new(store) as Arc<dyn SessionStore>)
            }));
            return;
        }
    }

    warn!("no database configured; sessions live in memory and vanish on restart");
    state
        .install_session_store(Arc::new(MemorySessionStore::new()))
        .await;
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM.
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
                warn!(error = %err, "cannot listen for SIGTERM; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
