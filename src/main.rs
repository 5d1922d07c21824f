use axum::{routing::get, Extension, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use runtrace::config;
use runtrace::db::Db;
use runtrace::middleware::{access_log, rate_limit};
use runtrace::ratelimit::RateLimiter;
use runtrace::routes::api_routes;
use runtrace::singlewriter::SingleWriterGuard;
use runtrace::state::AppState;

async fn root() -> &'static str {
    "runtrace telemetry ingestion service"
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    dotenvy::dotenv().ok();

    if let Err(reason) = config::validate_at_startup() {
        tracing::error!(%reason, "startup configuration invalid");
        return Err(reason.into());
    }

    // Refuses to start if another process already holds the data
    // directory's lock (spec.md §4.2). Held for the life of the process.
    let _writer_guard = SingleWriterGuard::acquire(&config::BASE_DIR)
        .map_err(|reason| -> Box<dyn std::error::Error> { reason.into() })?;

    let db = Db::open(&config::DB_PATH)?;
    tracing::info!(
        db_path = %config::DB_PATH.display(),
        journal_mode = %db.journal_mode(),
        synchronous = %db.synchronous(),
        "storage engine ready"
    );

    let state = AppState {
        db,
        rate_limiter: Arc::new(RateLimiter::new(*config::RATE_LIMIT_RPM)),
    };

    // Layers nest outside-in in reverse registration order: Extension
    // must be outermost so both access_log and rate_limit can extract
    // it, and access_log must wrap rate_limit so a 429 still gets logged.
    let app = Router::new()
        .route("/", get(root))
        .merge(api_routes())
        .layer(axum::middleware::from_fn(rate_limit))
        .layer(axum::middleware::from_fn(access_log))
        .layer(Extension(state));

    let addr: SocketAddr = format!("{}:{}", config::BIND_ADDRESS.as_str(), *config::BIND_PORT)
        .parse()
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error>)?;
    tracing::info!(%addr, "listening for incoming connections");

    axum::Server::bind(&addr)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await?;

    Ok(())
}
