use api_rest::startup::{Settings, build_state};
use api_shared::HealthService;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the SkyVigilance PV application
///
/// Loads `.env`, resolves configuration once, opens the case store and serves the REST API
/// (with Swagger UI at `/swagger-ui`) until Ctrl-C.
///
/// # Environment Variables
/// - `PV_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `PV_DATA_DIR`: directory for case documents; in-memory when unset
/// - `PV_ACCOUNTS_FILE`, `PV_MEDDRA_FILE`, `PV_IME_FILE`: optional YAML overrides
/// - `PV_E2B_SENDER`, `PV_E2B_RECEIVER`, `PV_MEDDRA_VERSION`: export identifiers
/// - `PV_STORE_TIMEOUT_MS`: per-request store timeout
///
/// # Returns
/// * `Ok(())` - If the server starts and shuts down cleanly
/// * `Err(anyhow::Error)` - If configuration, startup or serving fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("skyvig_run=info".parse()?)
                .add_directive("api_rest=info".parse()?)
                .add_directive("pv_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;
    let state = build_state(&settings)?;
    let health = HealthService::check_health();
    tracing::info!("++ {} ({} cases on record)", health.message, state.service.stats()?.total);
    tracing::info!("++ Starting PV REST on {}", settings.rest_addr);

    let app = api_rest::router(state);
    let listener = tokio::net::TcpListener::bind(&settings.rest_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("-- PV REST stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
