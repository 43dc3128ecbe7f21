use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use common::{BatchSummary, Error, Result, ResultStore, ScreeningResult};

/// SQLite-backed `ResultStore`.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect (creating the database file if needed) and apply migrations.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        let store = Self::from_pool(pool);
        store.migrate().await?;
        info!(url, "Result store ready");
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(sqlx::Error::from)?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn run_summary(&self, run_id: &str) -> Result<Option<BatchSummary>> {
        let row = sqlx::query(
            r#"
            SELECT run_id, strategy, started_at, attempted, succeeded, failed,
                   matched, incomplete, duration_ms
            FROM screening_runs
            WHERE run_id = ?1
            "#,
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let started_at: String = row.try_get("started_at")?;
        let started_at = DateTime::parse_from_rfc3339(&started_at)
            .map_err(|e| Error::Other(format!("bad started_at '{started_at}': {e}")))?
            .with_timezone(&Utc);

        Ok(Some(BatchSummary {
            run_id: row.try_get("run_id")?,
            strategy: row.try_get("strategy")?,
            started_at,
            attempted: row.try_get::<i64, _>("attempted")? as usize,
            succeeded: row.try_get::<i64, _>("succeeded")? as usize,
            failed: row.try_get::<i64, _>("failed")? as usize,
            matched: row.try_get::<i64, _>("matched")? as usize,
            incomplete: row.try_get::<i64, _>("incomplete")? as usize,
            duration: Duration::from_millis(row.try_get::<i64, _>("duration_ms")? as u64),
        }))
    }

    /// Results saved for a run, in insertion order.
    pub async fn results_for_run(&self, run_id: &str) -> Result<Vec<ScreeningResult>> {
        let payloads: Vec<String> = sqlx::query_scalar(
            "SELECT payload FROM screening_results WHERE run_id = ?1 ORDER BY id",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        payloads
            .iter()
            .map(|p| serde_json::from_str(p).map_err(Error::from))
            .collect()
    }
}

#[async_trait]
impl ResultStore for SqliteStore {
    async fn save_run(&self, summary: &BatchSummary) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO screening_runs
                (run_id, strategy, started_at, attempted, succeeded, failed,
                 matched, incomplete, duration_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(run_id) DO NOTHING
            "#,
        )
        .bind(&summary.run_id)
        .bind(&summary.strategy)
        .bind(summary.started_at.to_rfc3339())
        .bind(summary.attempted as i64)
        .bind(summary.succeeded as i64)
        .bind(summary.failed as i64)
        .bind(summary.matched as i64)
        .bind(summary.incomplete as i64)
        .bind(summary.duration.as_millis() as i64)
        .execute(&self.pool)
        .await?;

        debug!(run_id = %summary.run_id, "Saved run summary");
        Ok(())
    }

    async fn save_result(&self, result: &ScreeningResult, run_id: &str) -> Result<()> {
        let payload = serde_json::to_string(result)?;
        let rec = result.recommendation.as_ref();

        sqlx::query(
            r#"
            INSERT INTO screening_results
                (run_id, symbol, strategy, screened_at, matches, signal_strength, price,
                 contract_symbol, strike, expiration, annualized_yield, payload)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(run_id)
        .bind(&result.symbol)
        .bind(&result.strategy)
        .bind(result.timestamp.to_rfc3339())
        .bind(result.matches)
        .bind(result.signal_strength)
        .bind(result.quote.price)
        .bind(rec.map(|r| r.contract.contract_symbol.clone()))
        .bind(rec.map(|r| r.contract.strike))
        .bind(rec.map(|r| r.contract.expiration.to_string()))
        .bind(rec.map(|r| r.annualized_yield))
        .bind(payload)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
