//! Binary entry point for the readshelf EPUB gateway.

use readshelf_core::janitor;
use readshelf_server::{api_routes, config::ServerConfig, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("readshelf_server=info,readshelf_core=info")
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run(ServerConfig::from_env()).await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let state = AppState::new(config)?;

    let sweeper = janitor::spawn_periodic(
        state.service.scratch().path().to_path_buf(),
        state.service.max_age(),
        state.config.sweep_interval,
    );

    let app = api_routes(state.clone()).layer(tower_http::cors::CorsLayer::permissive());

    let addr = state.config.bind_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        "EPUB gateway listening on {} (scratch: {})",
        addr,
        state.service.scratch().path().display()
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    sweeper.abort();
    tracing::info!("Shut down");
    Ok(())
}
