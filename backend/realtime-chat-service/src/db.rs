use db_pool::{create_pool as create_pg_pool, DbConfig as DbPoolConfig, DbPoolError, PgPool};

const SERVICE_NAME: &str = "realtime-chat-service";

const MIGRATIONS: &[(&str, &str)] = &[(
    "0001_chat_schema",
    include_str!("../migrations/0001_chat_schema.sql"),
)];

pub async fn init_pool(database_url: &str) -> Result<PgPool, DbPoolError> {
    let cfg = DbPoolConfig::from_env(SERVICE_NAME).unwrap_or_else(|_| DbPoolConfig {
        service_name: SERVICE_NAME.to_string(),
        database_url: database_url.to_string(),
        ..DbPoolConfig::default()
    });
    cfg.log_config();
    let pool = create_pg_pool(cfg).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// Apply the embedded schema in order. Statements are idempotent.
pub async fn run_migrations(pool: &PgPool) -> Result<(), DbPoolError> {
    let client = pool.get().await?;
    for (name, sql) in MIGRATIONS {
        client.batch_execute(sql).await?;
        tracing::info!(migration = name, "applied migration");
    }
    Ok(())
}
