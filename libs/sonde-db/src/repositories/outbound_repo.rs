use crate::models::{Outbound, OutboundType, ProbeResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::debug;

/// Narrow persistence interface consumed by the probing engine. The sqlx
/// repository below implements it against Postgres; tests use an in-memory
/// store.
#[async_trait]
pub trait OutboundStore: Send + Sync {
    async fn get_by_tag(&self, tag: &str) -> Result<Option<Outbound>>;

    /// All outbounds that are legal probe targets (synthetic types excluded).
    async fn list_probeable(&self) -> Result<Vec<Outbound>>;

    /// Rows for the given tags; missing tags are silently dropped and the
    /// order of the returned rows is unspecified.
    async fn list_by_tags(&self, tags: &[String]) -> Result<Vec<Outbound>>;

    /// Merge probe-derived fields onto the row. `available` and
    /// `last_test_time` are always written; enrichment fields only when the
    /// probe observed a landing IP, so a failed run never erases the last
    /// known location. A concurrently deleted row is a no-op.
    async fn apply_probe_update(&self, tag: &str, result: &ProbeResult) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct OutboundRepository {
    pool: PgPool,
}

impl OutboundRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_outbound(row: &PgRow) -> Result<Outbound> {
        let raw_kind: String = row.try_get("type").context("outbound row missing type")?;
        let kind: OutboundType = raw_kind.parse()?;

        Ok(Outbound {
            id: row.try_get::<i64, _>("id").unwrap_or_default(),
            tag: row.try_get::<String, _>("tag").unwrap_or_default(),
            kind,
            config: row
                .try_get::<String, _>("config")
                .unwrap_or_else(|_| "{}".to_string()),
            landing_ip: row.try_get::<String, _>("landing_ip").unwrap_or_default(),
            country: row.try_get::<String, _>("country").unwrap_or_default(),
            region: row.try_get::<String, _>("region").unwrap_or_default(),
            city: row.try_get::<String, _>("city").unwrap_or_default(),
            isp: row.try_get::<String, _>("isp").unwrap_or_default(),
            ip_type: row.try_get::<String, _>("ip_type").unwrap_or_default(),
            fraud_score: row.try_get::<i32, _>("fraud_score").unwrap_or_default(),
            available: row.try_get::<bool, _>("available").unwrap_or(false),
            last_test_time: row.try_get::<i64, _>("last_test_time").unwrap_or_default(),
            latency: row.try_get::<i32, _>("latency").unwrap_or_default(),
            real_latency: row.try_get::<i32, _>("real_latency").unwrap_or_default(),
            created_at: row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>("created_at")
                .ok()
                .flatten(),
        })
    }

    fn rows_to_outbounds(rows: Vec<PgRow>) -> Result<Vec<Outbound>> {
        rows.iter().map(Self::row_to_outbound).collect()
    }

    pub async fn get_all(&self) -> Result<Vec<Outbound>> {
        let rows = sqlx::query("SELECT * FROM outbounds ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch all outbounds")?;
        Self::rows_to_outbounds(rows)
    }

    pub async fn count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM outbounds")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count outbounds")
    }

    pub async fn create(&self, tag: &str, kind: OutboundType, config: &str) -> Result<i64> {
        sqlx::query_scalar("INSERT INTO outbounds (tag, type, config) VALUES ($1, $2, $3) RETURNING id")
            .bind(tag)
            .bind(kind.as_str())
            .bind(config)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to create outbound {tag}"))
    }

    pub async fn update_config(&self, tag: &str, new_tag: &str, config: &str) -> Result<()> {
        sqlx::query("UPDATE outbounds SET tag = $1, config = $2 WHERE tag = $3")
            .bind(new_tag)
            .bind(config)
            .bind(tag)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to update outbound {tag}"))?;
        Ok(())
    }

    pub async fn delete_by_tag(&self, tag: &str) -> Result<()> {
        sqlx::query("DELETE FROM outbounds WHERE tag = $1")
            .bind(tag)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to delete outbound {tag}"))?;
        Ok(())
    }
}

#[async_trait]
impl OutboundStore for OutboundRepository {
    async fn get_by_tag(&self, tag: &str) -> Result<Option<Outbound>> {
        let row = sqlx::query("SELECT * FROM outbounds WHERE tag = $1")
            .bind(tag)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch outbound by tag")?;
        row.as_ref().map(Self::row_to_outbound).transpose()
    }

    async fn list_probeable(&self) -> Result<Vec<Outbound>> {
        let rows = sqlx::query(
            "SELECT * FROM outbounds WHERE type NOT IN ('direct', 'block', 'selector', 'urltest', 'dns') ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch probeable outbounds")?;
        Self::rows_to_outbounds(rows)
    }

    async fn list_by_tags(&self, tags: &[String]) -> Result<Vec<Outbound>> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query("SELECT * FROM outbounds WHERE tag = ANY($1)")
            .bind(tags)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch outbounds by tags")?;
        Self::rows_to_outbounds(rows)
    }

    async fn apply_probe_update(&self, tag: &str, result: &ProbeResult) -> Result<()> {
        let affected = if result.landing_ip.is_empty() {
            // Reachability-only merge. real_latency keeps its previous value
            // unless this run actually measured one (0 means unknown).
            sqlx::query(
                r#"
                UPDATE outbounds
                SET available = $1,
                    last_test_time = $2,
                    latency = $3,
                    real_latency = CASE WHEN $4 > 0 THEN $4 ELSE real_latency END
                WHERE tag = $5
                "#,
            )
            .bind(result.available)
            .bind(result.last_test_time)
            .bind(result.latency)
            .bind(result.real_latency)
            .bind(tag)
            .execute(&self.pool)
            .await
            .context("Failed to apply probe update")?
            .rows_affected()
        } else {
            sqlx::query(
                r#"
                UPDATE outbounds
                SET available = $1,
                    last_test_time = $2,
                    latency = $3,
                    real_latency = $4,
                    landing_ip = $5,
                    country = $6,
                    region = $7,
                    city = $8,
                    isp = $9,
                    ip_type = $10,
                    fraud_score = $11
                WHERE tag = $12
                "#,
            )
            .bind(result.available)
            .bind(result.last_test_time)
            .bind(result.latency)
            .bind(result.real_latency)
            .bind(&result.landing_ip)
            .bind(&result.country)
            .bind(&result.region)
            .bind(&result.city)
            .bind(&result.isp)
            .bind(&result.ip_type)
            .bind(result.fraud_score)
            .bind(tag)
            .execute(&self.pool)
            .await
            .context("Failed to apply probe update")?
            .rows_affected()
        };

        if affected == 0 {
            // Row deleted while the probe was in flight.
            debug!("probe update for {} matched no row, skipping", tag);
        }
        Ok(())
    }
}
