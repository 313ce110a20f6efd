//! `auralis`: the combined Submission API (C3), Notification Gateway (C5)
//! and Auth module (C6) process.

use std::sync::Arc;

use auralis::auth::TokenIssuer;
use auralis::config::{init_tracing, is_production, ApiConfig};
use auralis::context::AppContext;
use auralis::db::postgres::PostgresStore;
use auralis::stream::redis_stream::RedisJobStream;
use auralis::{correlation, gateway, submission};
use axum::Router;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let production = is_production();
    init_tracing(production);

    let config = ApiConfig::parse();

    let store = Arc::new(PostgresStore::connect(&config.database_url).await?);
    store.run_migrations().await?;

    let stream = Arc::new(
        RedisJobStream::connect(&config.redis_url, &config.jobs_stream, &config.jobs_group).await?,
    );
    stream.ensure_group().await?;

    let token_issuer = Arc::new(TokenIssuer::new(config.jwt_secret.clone()));
    let config = Arc::new(config);

    let db: Arc<dyn auralis::db::JobStore> = store.clone();
    let users: Arc<dyn auralis::db::UserStore> = store.clone();
    let job_stream: Arc<dyn auralis::stream::JobStream> = stream.clone();

    let ctx = AppContext::new(db, users, job_stream, token_issuer, config.clone());

    let app = Router::new()
        .merge(submission::router(ctx.clone()))
        .merge(auralis::auth::api::router(ctx.clone()))
        .merge(gateway::router(ctx.clone()))
        .layer(axum::middleware::from_fn(correlation::correlation_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(ctx);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "auralis listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
