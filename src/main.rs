use chat_delivery_service::config::Config;
use chat_delivery_service::error::AppResult;
use chat_delivery_service::state::AppState;
use chat_delivery_service::store::activity::PgActivityLog;
use chat_delivery_service::store::ledger::PgLedger;
use chat_delivery_service::store::metadata::PgMetadataStore;
use chat_delivery_service::store::redis::{RedisBroadcaster, RedisCache, RedisUnreadStore};
use chat_delivery_service::store::s3::S3ColdStore;
use chat_delivery_service::tasks::BackgroundTasks;
use chat_delivery_service::{db, logging, workers};
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> AppResult<()> {
    logging::init_tracing();

    let config = Config::from_env()?;

    let pool = db::init_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;

    let redis_client = redis::Client::open(config.redis_url.as_str())?;
    let s3_client = build_s3_client(&config).await;

    let state = AppState {
        ledger: Arc::new(PgLedger::new(pool.clone())),
        metadata: Arc::new(PgMetadataStore::new(pool.clone())),
        cold: Arc::new(S3ColdStore::new(Arc::new(s3_client), &config.s3)),
        broadcaster: Arc::new(RedisBroadcaster::new(redis_client.clone())),
        unread: Arc::new(RedisUnreadStore::new(redis_client.clone())),
        activity: Arc::new(PgActivityLog::new(pool)),
        cache: Arc::new(RedisCache::new(redis_client)),
        tasks: BackgroundTasks::new(),
        config: Arc::new(config),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = workers::spawn_workers(state.clone(), shutdown_rx);
    tracing::info!("chat delivery service started");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| chat_delivery_service::error::AppError::Config(format!("signal: {e}")))?;
    tracing::info!("shutdown signal received");

    let _ = shutdown_tx.send(true);
    for handle in workers {
        let _ = handle.await;
    }

    // Let in-flight fire-and-forget work (unread increments, cache fills)
    // land before the process exits.
    state.tasks.wait_idle().await;
    tracing::info!("shutdown complete");
    Ok(())
}

async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(config.s3.region.clone()))
        .load()
        .await;

    let mut builder = aws_sdk_s3::config::Builder::from(&aws_config);
    if let Some(endpoint) = &config.s3.endpoint {
        // Local stacks (minio, localstack) need the endpoint override and
        // path-style addressing.
        builder = builder.endpoint_url(endpoint).force_path_style(true);
    }
    aws_sdk_s3::Client::from_conf(builder.build())
}
