//! Axum server setup
//!
//! Server skeleton with:
//! - CORS limited to configured origins unless permissive mode is on
//! - Tracing middleware
//! - Graceful shutdown on SIGTERM/Ctrl+C

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::Router;
use compass_core::config::MatchingSection;
use compass_core::CompassConfig;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::routes;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (default: 127.0.0.1:3030)
    pub bind_addr: SocketAddr,

    /// Allow permissive CORS (default: false = configured origins only)
    ///
    /// WARNING: Setting this to true allows any origin.
    pub cors_permissive: bool,

    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&CompassConfig::default())
    }
}

impl From<&CompassConfig> for ServerConfig {
    fn from(config: &CompassConfig) -> Self {
        Self {
            bind_addr: config.server.bind,
            cors_permissive: config.server.cors_permissive,
            allowed_origins: config.server.allowed_origins.clone(),
        }
    }
}

impl ServerConfig {
    fn cors_layer(&self) -> CorsLayer {
        if self.cors_permissive {
            tracing::warn!("CORS: Permissive mode enabled - all origins allowed");
            return CorsLayer::permissive();
        }

        let origins: Vec<HeaderValue> = self
            .allowed_origins
            .iter()
            .filter_map(|origin| match origin.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(%origin, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Shared application state
pub struct AppState {
    pub pool: PgPool,
    /// Duplicate-donor scoring settings
    pub matching: MatchingSection,
}

impl AppState {
    pub fn new(pool: PgPool, matching: MatchingSection) -> Self {
        Self { pool, matching }
    }
}

/// Build the application router with all routes
pub fn build_router(state: Arc<AppState>, config: &ServerConfig) -> Router {
    let api = Router::new()
        .merge(routes::me::router())
        .merge(routes::clients::router())
        .merge(routes::donors::router())
        .merge(routes::batches::router())
        .merge(routes::donations::router())
        .merge(routes::imports::router())
        .merge(routes::policies::router())
        .merge(routes::reconciliation::router())
        .merge(routes::admin::router());

    Router::new()
        .merge(routes::health::router())
        .nest("/api", api)
        .layer(config.cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server until a shutdown signal arrives.
///
/// # Example
///
/// ```ignore
/// let pool = create_pool(&database_url).await?;
/// let config = CompassConfig::load(None)?;
/// run_server(pool, &config).await?;
/// ```
pub async fn run_server(pool: PgPool, config: &CompassConfig) -> Result<(), ServerError> {
    let server = ServerConfig::from(config);
    let state = Arc::new(AppState::new(pool, config.matching.clone()));
    let app = build_router(state, &server);

    let listener = TcpListener::bind(server.bind_addr).await?;
    tracing::info!("Server listening on {}", server.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting shutdown");
        }
    }
}

/// Server error type
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 3030);
        assert!(!config.cors_permissive);
        assert!(!config.allowed_origins.is_empty());
    }

    #[test]
    fn config_follows_compass_config() {
        let mut compass = CompassConfig::default();
        compass.server.cors_permissive = true;
        compass.server.bind = "0.0.0.0:8080".parse().unwrap();

        let config = ServerConfig::from(&compass);
        assert!(config.cors_permissive);
        assert_eq!(config.bind_addr.port(), 8080);
    }
}
