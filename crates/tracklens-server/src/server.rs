use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, routing::get};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracklens_analytics::AnalyticsEngine;
use tracklens_db_memory::InMemoryStore;

use crate::{config::AppConfig, handlers};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub engine: AnalyticsEngine,
    pub request_timeout: Duration,
}

pub struct TracklensServer {
    addr: SocketAddr,
    app: Router,
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        // Health and info endpoints
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        // Analytics
        .route(
            "/api/analytics/trackedEntities/query/{target}",
            get(handlers::query_tracked_entities),
        )
        .route(
            "/api/analytics/cache",
            get(handlers::cache_stats).delete(handlers::clear_cache),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
}

pub struct ServerBuilder {
    config: AppConfig,
    store: Option<Arc<InMemoryStore>>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            store: None,
        }
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.config = cfg;
        self
    }

    /// Uses `store` instead of loading `storage.snapshot_path`.
    pub fn with_store(mut self, store: Arc<InMemoryStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> anyhow::Result<TracklensServer> {
        let store = match (self.store, &self.config.storage.snapshot_path) {
            (Some(store), _) => store,
            (None, Some(path)) => Arc::new(InMemoryStore::from_snapshot_file(path)?),
            (None, None) => {
                tracing::warn!("no storage.snapshot_path configured, starting with an empty store");
                Arc::new(InMemoryStore::new())
            }
        };
        let state = AppState {
            engine: AnalyticsEngine::from_store(store, self.config.analytics.clone()),
            request_timeout: self.config.request_timeout(),
        };
        Ok(TracklensServer {
            addr: self.config.addr(),
            app: build_app(state),
        })
    }
}

impl TracklensServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
