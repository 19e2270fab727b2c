//! Router assembly and HTTP server with graceful shutdown

use axum::{routing::get, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

use crate::{
    config::Config,
    error::Result,
    health,
    middleware::MiddlewarePipeline,
    openapi,
    state::AppState,
    ws,
};

/// Assemble the full application router.
///
/// Validates the admission pipeline's stage ordering before attaching it;
/// an ordering violation refuses to launch.
pub fn build_router(state: AppState) -> Result<Router> {
    let pipeline = MiddlewarePipeline::standard();
    pipeline.validate_dependencies()?;

    let router: Router<AppState> = Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics_endpoint))
        .route("/system-info", get(health::system_info))
        .route("/web", get(ws::endpoint::websocket_endpoint))
        .merge(openapi::swagger_ui());

    let router = pipeline.apply(router, state.clone());

    Ok(router.with_state(state))
}

/// HTTP server wrapper
pub struct Server {
    config: Config,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the server until the shutdown future resolves; the caller
    /// completes the teardown sequence afterwards.
    pub async fn serve<F>(self, app: Router, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.service.port));

        tracing::info!("Starting {} on {}", self.config.service.name, addr);

        let body_limit = self.config.admission.max_request_body_size as usize;

        let app = app
            .layer(TimeoutLayer::new(self.config.service.request_timeout()))
            // Backstop for bodies without a Content-Length header; the
            // admission pipeline answers declared oversizes with the
            // enveloped 413.
            .layer(RequestBodyLimitLayer::new(body_limit))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new())
                    .on_response(DefaultOnResponse::new()),
            );

        let listener = TcpListener::bind(&addr).await?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        tracing::info!("Server shutdown complete");

        Ok(())
    }
}

/// Wait for SIGTERM or SIGINT
pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}

/// Bound shutdown waits for background tasks
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);
