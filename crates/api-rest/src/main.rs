//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the REST API server on its own.
//!
//! ## Intended use
//! Useful for development and debugging when only the HTTP surface is wanted. The workspace's
//! main `skyvig-run` binary serves the same router.
//!
//! See [`api_rest::startup`] for the environment variables read at start-up.

use api_rest::startup::{build_state, Settings};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Starts the REST API server on the configured address (default: 0.0.0.0:3000).
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the environment holds an invalid setting or an override file cannot be loaded,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("pv_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;
    tracing::info!("-- Starting PV REST API on {}", settings.rest_addr);

    let app = api_rest::router(build_state(&settings)?);

    let listener = tokio::net::TcpListener::bind(&settings.rest_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
