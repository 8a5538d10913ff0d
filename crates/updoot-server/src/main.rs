mod config;

use anyhow::Context;
use axum::http::HeaderValue;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use updoot_api::routes;
use updoot_api::state::AppStateInner;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "updoot=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let db = updoot_db::Database::open(&config.db_path)
        .with_context(|| format!("opening database at {}", config.db_path.display()))?;
    let state = AppStateInner::new(db, config.jwt_secret.clone());

    for op in routes::operations() {
        info!("  {:<6} {:<20} {} ({:?})", op.method, op.path, op.name, op.access);
    }

    let cors = match &config.cors_origin {
        Some(origin) => CorsLayer::permissive().allow_origin(
            origin
                .parse::<HeaderValue>()
                .with_context(|| format!("invalid UPDOOT_CORS_ORIGIN {:?}", origin))?,
        ),
        None => CorsLayer::permissive(),
    };

    let app = routes::router(state)?
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    info!("Updoot server listening on {}", config.addr);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sig) => sig,
                Err(e) => {
                    tracing::warn!("SIGTERM handler unavailable: {}", e);
                    ctrl_c.await.ok();
                    info!("Received Ctrl+C, shutting down...");
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
