//! HTTP surface: a fallback handler that resolves every configured route
//! through the route table, plus a health endpoint.
mod auth;
mod handler;
mod health;

pub use auth::ApiKeySet;
pub use handler::{dispatch, error_response, CachedResponse, X_CACHE};
pub use health::health;

use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::db::QueryBackend;
use crate::engine::{AuthMode, QueryExecutor, RouteTable, TtlCache};

/// Shared per-process state. Only the cache is mutable.
#[derive(Clone)]
pub struct AppState {
    pub table: Arc<RouteTable>,
    pub executor: QueryExecutor,
    pub cache: Arc<TtlCache<CachedResponse>>,
    pub api_keys: Arc<ApiKeySet>,
}

impl AppState {
    pub fn new(table: RouteTable, backend: Arc<dyn QueryBackend>, api_keys: ApiKeySet) -> Self {
        Self {
            table: Arc::new(table),
            executor: QueryExecutor::new(backend),
            cache: Arc::new(TtlCache::new()),
            api_keys: Arc::new(api_keys),
        }
    }
}

pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    let cors = if config.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .route("/health", get(health))
        .fallback(dispatch)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Log the route table so operators can see what is being served.
pub fn log_routes(state: &AppState) {
    for route in state.table.routes() {
        info!(
            method = %route.method(),
            path = %route.path(),
            params = ?route.definition.params,
            auth = matches!(route.plan.auth, AuthMode::ApiKey { .. }),
            pagination = ?route.plan.pagination,
            cache = ?route.plan.cache,
            "route registered"
        );
    }
    let needs_keys = state
        .table
        .routes()
        .iter()
        .any(|r| matches!(r.plan.auth, AuthMode::ApiKey { .. }));
    if needs_keys && state.api_keys.is_empty() {
        warn!("routes require an API key but no keys are configured; they will reject every request");
    }
}

pub async fn serve(state: AppState, config: &ServerConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = config.socket_addr().parse()?;
    log_routes(&state);
    let router = build_router(state, config);

    let listener = TcpListener::bind(addr).await?;
    info!("listening on http://{}", addr);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
