mod capability;
mod config;
mod db;
mod errors;
mod generation;
mod jobs;
mod models;
mod portfolio;
mod routes;
mod state;
mod status;
mod storage;
mod templates;
#[cfg(test)]
mod testing;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::jobs::RedisJobQueue;
use crate::routes::build_router;
use crate::state::AppState;
use crate::status::{spawn_pg_listener, ChangeFeed};
use crate::storage::{PgPortfolioStore, S3BlobStore};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Folio API v{}", env!("CARGO_PKG_VERSION"));

    // PostgreSQL (runs pending migrations)
    let db = create_pool(&config.database_url).await?;

    // Redis job queue
    let redis = redis::Client::open(config.redis_url.clone())?;
    let queue = RedisJobQueue::new(redis, config.queue_name.clone());
    info!("Job queue '{}' initialized", config.queue_name);

    // S3 / MinIO
    let s3 = build_s3_client(&config).await;
    let blobs = S3BlobStore::new(
        s3,
        config.resume_bucket.clone(),
        config.profile_bucket.clone(),
        config.s3_public_url.clone(),
    );
    info!("S3 client initialized");

    // Change feed, fed by LISTEN on the portfolios table trigger
    let feed = ChangeFeed::default();
    let listener_task = spawn_pg_listener(db.clone(), feed.clone());

    let state = AppState {
        store: Arc::new(PgPortfolioStore::new(db)),
        blobs: Arc::new(blobs),
        queue: Arc::new(queue),
        feed,
        config: config.clone(),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    listener_task.abort();
    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "folio-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&s3_config)
        .force_path_style(true)
        .build();

    aws_sdk_s3::Client::from_conf(s3_config)
}
