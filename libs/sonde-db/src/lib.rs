pub mod models;
pub mod repositories;

use anyhow::{Context, Result, bail};
pub use sqlx;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

/// Open the outbound store and bring its schema up to date.
pub async fn connect(url: &str) -> Result<PgPool> {
    let scheme = url.split_once("://").map(|(s, _)| s).unwrap_or_default();
    if !matches!(scheme, "postgres" | "postgresql") {
        bail!("unsupported database URL scheme {scheme:?}, expected postgres:// or postgresql://");
    }

    let pool = PgPoolOptions::new()
        .max_connections(16)
        .acquire_timeout(Duration::from_secs(5))
        .connect(url)
        .await
        .context("cannot open the outbound store")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("outbounds schema migration failed")?;

    Ok(pool)
}
