use anyhow::Result;
use shopping_list_wizard::{create_app_router, state::AppState, tasks::start_wizard_expirer_scheduler};
use std::{net::SocketAddr, sync::Arc};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
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

    info!("signal received, starting graceful shutdown");
}

#[tokio::main(flavor = "multi_thread", worker_threads = 8)]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let app_state = AppState::new().await?;
    info!("application state initialized (database, redis, wizard orchestrator)");

    let expirer_pool = app_state.db.pool().clone();
    tokio::spawn(async move {
        if let Err(e) = start_wizard_expirer_scheduler(expirer_pool).await {
            tracing::error!("failed to start wizard expirer scheduler: {}", e);
        }
    });
    info!("wizard expirer scheduler started (daily flag pass, 5-minute lock sweep)");

    let app = create_app_router(Arc::new(app_state));

    let port = std::env::var("PORT").unwrap_or_else(|_| "8000".to_string()).parse::<u16>().unwrap_or(8000);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("server shutdown completed");

    Ok(())
}
