use axum::http::StatusCode;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use dynamic_market::{
    FileStore, Market, MarketConfig, MarketError, SystemClock,
    api::{self, AppState},
};

#[tokio::main]
async fn main() -> Result<(), MarketError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    info!("🚀 Dynamic Market Core v2 启动中...");

    let config = MarketConfig::from_env()?;
    let store = Arc::new(FileStore::new(&config.store_path));
    let market = Market::start(&config, store, Arc::new(SystemClock));

    let app = api::router(AppState::new(&market))
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(10)));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("✨ API 节点已上线: {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    market.shutdown().await;
    info!("👋 所有数据已同步，系统安全退出。");
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
