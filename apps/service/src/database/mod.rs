/// Database layer
///
/// Observations are kept in a LibSQL (SQLite) database, local file or
/// remote, behind a pooled [`ObservationStore`].
pub mod migrations;
pub mod query;
pub mod repository;

pub use query::{ObservationFilter, PingSearch, SearchParams};
pub use repository::{LibsqlStore, ObservationStore};

use anyhow::Result;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::pool::{LibsqlPool, build_pool};

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}

/// Open the configured database, migrate it and return a pool over it
pub async fn open(config: &DatabaseConfig) -> Result<LibsqlPool> {
    let database = if config.is_remote() {
        info!(url = %config.url, "Opening remote database");
        libsql::Builder::new_remote(config.url.clone(), config.auth_token.clone().unwrap_or_default())
            .build()
            .await?
    } else {
        info!(path = %config.url, "Opening local database");
        libsql::Builder::new_local(&config.url).build().await?
    };

    let pool = build_pool(database, config.max_connections)?;

    let conn = pool.get().await?;
    initialize_database(&conn).await?;

    Ok(pool)
}

#[cfg(test)]
pub(crate) async fn test_store() -> Result<(LibsqlStore, tempfile::TempDir)> {
    let dir = tempfile::tempdir()?;
    let config = DatabaseConfig {
        url: dir.path().join("test.db").to_string_lossy().to_string(),
        auth_token: None,
        max_connections: 4,
    };

    let pool = open(&config).await?;
    Ok((LibsqlStore::new(pool), dir))
}
