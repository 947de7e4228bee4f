use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::DateTime;
use libsql::{Value, params};

use super::query::ObservationFilter;
use crate::monitoring::Observation;
use crate::pool::{ConnectionManager, LibsqlPool};

/// Durable, append-only home of every observation
///
/// Only the sink pump appends; only the query facade reads.
#[async_trait]
pub trait ObservationStore: Send + Sync {
    /// Append one observation
    async fn append(&self, observation: &Observation) -> Result<()>;

    /// All observations matching `filter`, oldest first
    async fn find(&self, filter: &ObservationFilter) -> Result<Vec<Observation>>;
}

/// LibSQL observation store
pub struct LibsqlStore {
    pool: LibsqlPool,
}

impl LibsqlStore {
    pub fn new(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    async fn get_conn(&self) -> Result<deadpool::managed::Object<ConnectionManager>> {
        Ok(self.pool.get().await?)
    }
}

#[async_trait]
impl ObservationStore for LibsqlStore {
    async fn append(&self, observation: &Observation) -> Result<()> {
        let conn = self.get_conn().await?;

        conn.execute(
            "INSERT INTO pings (url, timestamp_ms, status_code, content_length, duration_ms, error) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                observation.url.clone(),
                observation.timestamp.timestamp_millis(),
                observation.status_code as i64,
                observation.content_length.map(|v| v as i64),
                observation.duration_ms as i64,
                observation.error.clone()
            ],
        )
        .await?;

        Ok(())
    }

    async fn find(&self, filter: &ObservationFilter) -> Result<Vec<Observation>> {
        let conn = self.get_conn().await?;

        let mut sql = String::from(
            "SELECT url, timestamp_ms, status_code, content_length, duration_ms, error FROM pings",
        );
        let mut clauses = Vec::new();
        let mut values = Vec::new();

        if let Some(url) = &filter.url {
            clauses.push("url = ?");
            values.push(Value::Text(url.clone()));
        }
        if let Some(since) = filter.since {
            clauses.push("timestamp_ms >= ?");
            values.push(Value::Integer(since.timestamp_millis()));
        }
        if let Some(status_code) = filter.status_code {
            clauses.push("status_code = ?");
            values.push(Value::Integer(status_code as i64));
        }

        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY timestamp_ms, id");

        let mut rows = conn.query(&sql, libsql::params::Params::Positional(values)).await?;
        let mut observations = Vec::new();

        while let Some(row) = rows.next().await? {
            let timestamp_ms: i64 = row.get(1)?;

            observations.push(Observation {
                url: row.get(0)?,
                timestamp: DateTime::from_timestamp_millis(timestamp_ms)
                    .ok_or_else(|| anyhow!("invalid stored timestamp {timestamp_ms}"))?,
                status_code: row.get::<i64>(2)? as u16,
                content_length: row.get::<Option<i64>>(3)?.map(|v| v as u64),
                duration_ms: row.get::<i64>(4)? as u64,
                error: row.get(5)?,
            });
        }

        Ok(observations)
    }
}
