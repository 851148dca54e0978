// PharmyDash Monitor - Local Development Server

use std::net::SocketAddr;
use tokio::signal;
use tokio::sync::oneshot;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use pharmydash_common::config::{Config, DEFAULT_RUST_LOG};
use pharmydash_conversations::DashboardState;
use pharmydash_feed::FeedConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    let rust_log = config
        .as_ref()
        .map(|c| c.rust_log.as_str())
        .unwrap_or(DEFAULT_RUST_LOG);
    tracing_subscriber::fmt()
        .with_env_filter(pharmydash_app::log_filter(rust_log))
        .pretty()
        .init();

    info!("Starting PharmyDash monitor local development server");

    let config = config.map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let feed_config = FeedConfig::from_env().map_err(|e| {
        error!("Failed to load feed configuration: {}", e);
        anyhow::anyhow!("Feed configuration failed: {}", e)
    })?;

    info!(feed = ?feed_config, "Configuration loaded successfully");

    let adapter = pharmydash_app::create_monitor(&config, feed_config)
        .await
        .map_err(|e| {
            error!("Failed to create monitor: {}", e);
            e
        })?;

    let state = DashboardState::new(adapter.subscribe());

    let (stop_adapter, adapter_stopped) = oneshot::channel::<()>();
    let adapter_task = tokio::spawn(adapter.run(async {
        let _ = adapter_stopped.await;
    }));

    let app = pharmydash_app::create_app(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .into_inner(),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    info!("Server starting on http://{}", addr);
    info!("Health check available at http://{}/health", addr);
    info!("Dashboard available at http://{}/v1/dashboard", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = stop_adapter.send(());
    if let Err(e) = adapter_task.await {
        warn!("Change feed adapter did not stop cleanly: {}", e);
    }

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}
