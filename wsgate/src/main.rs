use anyhow::Context;

use wsgate::config::Config;
use wsgate::metrics::{describe_metrics, install_recorder, record_build_info};
use wsgate::observability::init_tracing;
use wsgate::server::{build_router, shutdown_signal, Server, SHUTDOWN_TIMEOUT};
use wsgate::startup;
use wsgate::state::AppState;
use wsgate::supervisor::Supervisor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    init_tracing(&config).context("Failed to initialize tracing")?;

    let metrics_handle = install_recorder().context("Failed to install metrics recorder")?;
    describe_metrics();

    let (state, audit_worker) = AppState::build(config.clone(), metrics_handle)
        .await
        .context("Failed to build application state")?;

    startup::validate(&state)
        .await
        .context("Startup validation failed")?;

    state
        .audit_storage()
        .initialize()
        .await
        .context("Failed to initialize audit storage")?;

    record_build_info(&config.service.environment.to_string());

    let mut supervisor = Supervisor::new();
    supervisor.start(&state, audit_worker);

    let app = build_router(state.clone()).context("Failed to build router")?;

    // On signal: stop accepting, then close live connections so the dispatch
    // loops (and graceful shutdown) can finish.
    let graceful = {
        let state = state.clone();
        async move {
            shutdown_signal().await;
            state.registry().close_all(1001, "Server going away").await;
        }
    };

    Server::new(config).serve(app, graceful).await?;

    supervisor.shutdown(&state, SHUTDOWN_TIMEOUT).await;

    Ok(())
}
