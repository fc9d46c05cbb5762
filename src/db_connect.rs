use anyhow::{Context, Result};
use bb8::Pool;
use bb8_postgres::PostgresConnectionManager;
use log::info;
use std::time::Duration;
use tokio_postgres::{Config, NoTls};

/// Builds the PostgreSQL connection configuration from `DB_HOST`, `DB_PORT`,
/// `DB_NAME`, `DB_USER` and `DB_PASSWORD`.
fn build_pg_config() -> Config {
    let mut config = Config::new();
    let host = std::env::var("DB_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port_str = std::env::var("DB_PORT").unwrap_or_else(|_| "5432".to_string());
    let port = port_str.parse::<u16>().unwrap_or(5432);
    let dbname = std::env::var("DB_NAME").unwrap_or_else(|_| "schools".to_string());
    let user = std::env::var("DB_USER").unwrap_or_else(|_| "postgres".to_string());
    let password = std::env::var("DB_PASSWORD").unwrap_or_default();

    info!(
        "DB Config: Host={}, Port={}, DB={}, User={}",
        host, port, dbname, user
    );
    config
        .host(&host)
        .port(port)
        .dbname(&dbname)
        .user(&user)
        .password(&password);
    config.application_name("review_trends");
    config.connect_timeout(Duration::from_secs(10));
    config
}

pub type PgPool = Pool<PostgresConnectionManager<NoTls>>;

/// Establishes the connection pool and checks it with `SELECT 1`.
///
/// The tools run a handful of reads per invocation, so the pool stays small.
pub async fn connect() -> Result<PgPool> {
    let config = build_pg_config();
    info!("Connecting to PostgreSQL database...");
    let manager = PostgresConnectionManager::new(config, NoTls);

    let pool_max_size = 8;
    let pool_idle_timeout = Some(Duration::from_secs(60));
    let pool_connection_timeout = Duration::from_secs(20);

    let pool = Pool::builder()
        .max_size(pool_max_size)
        .idle_timeout(pool_idle_timeout)
        .connection_timeout(pool_connection_timeout)
        .build(manager)
        .await
        .context("Failed to build database connection pool")?;

    let conn = pool
        .get()
        .await
        .context("Failed to get test connection from pool")?;
    conn.query_one("SELECT 1", &[])
        .await
        .context("Test query 'SELECT 1' failed")?;
    drop(conn);
    info!(
        "Database connection pool initialized with max_size: {}, idle_timeout: {:?}.",
        pool_max_size, pool_idle_timeout,
    );
    Ok(pool)
}
