//! Lantern server
//!
//! Wires the core resolution pipeline into an axum application: explicit
//! registry and catalog construction, manifest loading, the disk cache with
//! its periodic cleanup, and graceful shutdown.

use anyhow::{Context, Result};
use axum::extract::{Request, State};
use axum::response::Response;
use axum::Router;
use lantern_core::{Handler, Registry, SourceContext};
use lantern_core::{Cache, Catalog};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub mod cache;
pub mod config;
pub mod enrich;
pub mod manifest;
pub mod objects;

pub use config::{CacheConfig, ServerConfig};

use cache::DiskCache;
use enrich::{MacCanonicalizer, UuidCanonicalizer};
use objects::FileObjectStore;

#[derive(Clone)]
pub struct AppState {
    handler: Arc<Handler>,
}

/// Every path below the base path resolves through the boot pipeline.
pub fn router(handler: Arc<Handler>) -> Router {
    Router::new()
        .fallback(serve_boot)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { handler })
}

async fn serve_boot(State(state): State<AppState>, request: Request) -> Response {
    state.handler.serve(request).await
}

/// Enrichment chain wired at process start.
pub fn default_registry() -> Arc<Registry> {
    let registry = Registry::new();
    registry.register(Arc::new(MacCanonicalizer::new()));
    registry.register(Arc::new(UuidCanonicalizer::new()));
    Arc::new(registry)
}

/// Fully wired application plus the cache handle for periodic cleanup.
pub struct App {
    pub router: Router,
    pub catalog: Arc<Catalog>,
    pub cache: Option<Arc<DiskCache>>,
}

pub async fn build(config: &ServerConfig) -> Result<App> {
    let cache = if config.cache.enabled {
        let cache = Arc::new(
            DiskCache::new(&config.cache.dir, config.fetch_timeout())
                .context("building content cache")?,
        );
        cache.init().await.context("initializing content cache")?;
        Some(cache)
    } else {
        None
    };

    let objects = config
        .object_dir
        .as_ref()
        .map(|dir| Arc::new(FileObjectStore::new(dir)) as Arc<dyn lantern_core::ObjectStore>);

    let ctx = SourceContext {
        cache: cache.clone().map(|c| c as Arc<dyn Cache>),
        objects,
        fetch_timeout: Some(config.fetch_timeout()),
    };

    let catalog = Arc::new(Catalog::new());
    if let Some(dir) = &config.manifest_dir {
        let summary = manifest::load_dir(&catalog, &ctx, dir)
            .await
            .context("loading manifests")?;
        info!(
            documents = summary.documents,
            profiles = summary.profiles,
            matchers = summary.matchers,
            rejected = summary.rejected,
            degraded = summary.degraded,
            "manifests loaded"
        );
    } else {
        warn!("no manifest directory configured; catalog starts empty");
    }

    let handler = Arc::new(Handler::new(
        &config.base_path,
        catalog.clone(),
        default_registry(),
    ));

    Ok(App {
        router: router(handler),
        catalog,
        cache,
    })
}

/// Run until SIGINT/SIGTERM.
pub async fn run(config: ServerConfig) -> Result<()> {
    let app = build(&config).await?;

    if let Some(cache) = app.cache.clone() {
        let ttl = Duration::from_secs(config.cache.ttl_secs);
        let interval = Duration::from_secs(config.cache.cleanup_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = cache.cleanup(ttl).await {
                    warn!(error = %e, "cache cleanup failed");
                }
            }
        });
    }

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("binding {}", config.listen))?;
    info!(listen = %config.listen, base_path = %config.base_path, "serving boot requests");

    axum::serve(listener, app.router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            warn!("installing Ctrl+C handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "installing SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
