//! API server setup and configuration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::Request;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::api::routes;
use crate::error::Result;
use crate::metrics::HealthChecker;
use crate::monitor::{MetricsRegistry, RunningMonitors};

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Server bind address
    pub bind_address: String,
    /// Server port
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 5000,
            enable_cors: true,
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server start time for uptime calculation
    pub start_time: Instant,
    /// Health checker; `None` reports healthy (tests without a database)
    pub health_checker: Option<Arc<HealthChecker>>,
    /// Per-stream monitor metrics
    pub metrics: Arc<MetricsRegistry>,
    /// Streams with a running monitor loop
    pub running: RunningMonitors,
}

impl AppState {
    pub fn new(metrics: Arc<MetricsRegistry>, running: RunningMonitors) -> Self {
        Self {
            start_time: Instant::now(),
            health_checker: None,
            metrics,
            running,
        }
    }

    pub fn with_health_checker(mut self, health_checker: Arc<HealthChecker>) -> Self {
        self.health_checker = Some(health_checker);
        self
    }
}

/// API server.
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
    cancel_token: CancellationToken,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, state: AppState, cancel_token: CancellationToken) -> Self {
        Self {
            config,
            state,
            cancel_token,
        }
    }

    /// Get the cancellation token for graceful shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Build the router with all middleware and routes.
    pub fn build_router(&self) -> Router {
        let mut router = routes::create_router(self.state.clone());

        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            router = router.layer(cors);
        }

        // Health checks are polled constantly; keep them out of the request log.
        router.layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request| {
                    if req.uri().path().starts_with("/health") {
                        Span::none()
                    } else {
                        let mut make_span =
                            tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO);
                        use tower_http::trace::MakeSpan;
                        make_span.make_span(req)
                    }
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &Span| {
                        if span.is_disabled() {
                            return;
                        }
                        let on_response =
                            tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO);
                        use tower_http::trace::OnResponse;
                        on_response.on_response(res, latency, span);
                    },
                ),
        )
    }

    /// Bind the configured address.
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| crate::error::Error::ApiError(format!("Invalid address: {}", e)))?;

        let listener = TcpListener::bind(addr).await.map_err(|e| {
            crate::error::Error::ApiError(format!("Failed to bind {}: {}", addr, e))
        })?;
        tracing::info!("API server listening on http://{}", addr);
        Ok(listener)
    }

    /// Serve on a bound listener until the cancellation token fires.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let router = self.build_router();
        let cancel_token = self.cancel_token.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                tracing::info!("API server shutting down...");
            })
            .await
            .map_err(|e| crate::error::Error::ApiError(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Bind and serve until the cancellation token fires.
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ApiServerConfig::default();
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.port, 5000);
        assert!(config.enable_cors);
    }

    #[tokio::test]
    async fn test_run_rejects_bad_address() {
        let config = ApiServerConfig {
            bind_address: "not an address".to_string(),
            ..Default::default()
        };
        let state = AppState::new(Arc::new(MetricsRegistry::new()), RunningMonitors::default());
        let server = ApiServer::new(config, state, CancellationToken::new());
        assert!(server.run().await.is_err());
    }

    #[tokio::test]
    async fn test_bind_fails_when_port_in_use() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let config = ApiServerConfig {
            bind_address: "127.0.0.1".to_string(),
            port: taken.local_addr().unwrap().port(),
            enable_cors: false,
        };
        let state = AppState::new(Arc::new(MetricsRegistry::new()), RunningMonitors::default());
        let server = ApiServer::new(config, state, CancellationToken::new());

        let err = server.bind().await.unwrap_err();
        assert!(err.to_string().contains("Failed to bind"));
    }

    #[tokio::test]
    async fn test_serve_stops_on_cancel() {
        let config = ApiServerConfig {
            bind_address: "127.0.0.1".to_string(),
            port: 0,
            enable_cors: false,
        };
        let state = AppState::new(Arc::new(MetricsRegistry::new()), RunningMonitors::default());
        let cancel = CancellationToken::new();
        let server = ApiServer::new(config, state, cancel.clone());

        let listener = server.bind().await.unwrap();
        let serving = tokio::spawn(async move { server.serve(listener).await });
        cancel.cancel();
        assert!(serving.await.unwrap().is_ok());
    }
}
