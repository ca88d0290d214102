use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;

// Embed SQL migrations at compile time for deterministic startup
const MIGRATIONS: &[&str] = &[
    include_str!("../migrations/0001_create_messages.sql"),
    include_str!("../migrations/0002_create_inbox.sql"),
    include_str!("../migrations/0003_create_message_metadata.sql"),
    include_str!("../migrations/0004_create_archive_index.sql"),
    include_str!("../migrations/0005_create_group_activity.sql"),
    include_str!("../migrations/0006_create_conversation_members.sql"),
];

pub async fn init_pool(database_url: &str) -> Result<Pool<Postgres>, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(env_u32("DB_MAX_CONNECTIONS", 20))
        .min_connections(env_u32("DB_MIN_CONNECTIONS", 5))
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .test_before_acquire(true)
        .connect(database_url)
        .await?;

    sqlx::query("SELECT 1").execute(&pool).await?;
    tracing::info!("database pool created and verified");
    Ok(pool)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub async fn run_migrations(db: &Pool<Postgres>) -> Result<(), sqlx::Error> {
    // Run sequentially; each file may contain multiple statements and is
    // written to be safe to re-apply.
    for (i, sql) in MIGRATIONS.iter().enumerate() {
        let label = i + 1;
        match sqlx::query(sql).execute(db).await {
            Ok(_) => tracing::info!(migration = %label, "migration applied"),
            Err(e) => {
                tracing::warn!(migration = %label, error = %e, "migration may have been applied already");
            }
        }
    }
    Ok(())
}
