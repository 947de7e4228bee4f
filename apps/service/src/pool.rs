//! Pooled libsql connections for the observation store.

use anyhow::Result;
use deadpool::managed::{self, Metrics, Pool, RecycleError, RecycleResult};
use libsql::{Connection, Database, Error as LibsqlError};
use tracing::debug;

/// Hands out connections to one opened database
pub struct ConnectionManager {
    database: Database,
}

impl ConnectionManager {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

impl managed::Manager for ConnectionManager {
    type Type = Connection;
    type Error = LibsqlError;

    async fn create(&self) -> Result<Connection, LibsqlError> {
        debug!("Opening pooled database connection");
        self.database.connect()
    }

    /// A connection goes back into service only if it still answers
    async fn recycle(&self, conn: &mut Connection, metrics: &Metrics) -> RecycleResult<LibsqlError> {
        let mut rows = conn.query("SELECT 1", ()).await?;
        match rows.next().await? {
            Some(_) => Ok(()),
            None => {
                debug!(recycled = metrics.recycle_count, "Dropping unresponsive connection");
                Err(RecycleError::Message("liveness query returned no rows".into()))
            }
        }
    }
}

pub type LibsqlPool = Pool<ConnectionManager>;

/// Build a pool of at most `max_size` connections over an opened database
pub fn build_pool(database: Database, max_size: usize) -> Result<LibsqlPool> {
    Ok(Pool::builder(ConnectionManager::new(database)).max_size(max_size.max(1)).build()?)
}
