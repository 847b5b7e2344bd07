use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{error, info};
use serde::Serialize;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{Sqlite, SqlitePool, SqlitePoolOptions};

use crate::config::DatabaseConfig;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database not initialized. Call run() first")]
    NotInitialized,
    #[error("Database accessor has been stopped")]
    Stopped,
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreState {
    Uninitialized,
    Running,
    Stopped,
}

enum Lifecycle {
    Uninitialized,
    Running(SqlitePool),
    Stopped,
}

/// Owns the relational connection pool from startup to shutdown.
///
/// Nothing in the task pipeline writes to the store yet; it is health-checked
/// at startup and hands out pooled sessions to whoever needs one.
pub struct StoreAccessor {
    config: DatabaseConfig,
    lifecycle: RwLock<Lifecycle>,
}

impl StoreAccessor {
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            lifecycle: RwLock::new(Lifecycle::Uninitialized),
        }
    }

    /// Creates the pool. Connections are opened lazily on first acquire.
    pub fn run(&self) -> Result<(), StoreError> {
        let mut lifecycle = self.write();
        match &*lifecycle {
            Lifecycle::Running(_) => return Ok(()),
            Lifecycle::Stopped => return Err(StoreError::Stopped),
            Lifecycle::Uninitialized => {}
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(self.config.max_connections)
            .connect_lazy(&self.config.url)?;
        *lifecycle = Lifecycle::Running(pool);
        info!("Database pool created for {}", self.config.url);
        Ok(())
    }

    pub fn state(&self) -> StoreState {
        match *self.read() {
            Lifecycle::Uninitialized => StoreState::Uninitialized,
            Lifecycle::Running(_) => StoreState::Running,
            Lifecycle::Stopped => StoreState::Stopped,
        }
    }

    /// Connections currently held by the pool, idle or checked out.
    pub fn active_connections(&self) -> u32 {
        match &*self.read() {
            Lifecycle::Running(pool) => pool.size(),
            _ => 0,
        }
    }

    /// A pooled connection; it goes back to the pool when dropped.
    pub async fn session(&self) -> Result<PoolConnection<Sqlite>, StoreError> {
        let pool = self.pool()?;
        Ok(pool.acquire().await?)
    }

    pub async fn check_connection(&self) -> Result<(), StoreError> {
        let result = async {
            let mut session = self.session().await?;
            sqlx::query("SELECT 1").execute(&mut *session).await?;
            Ok::<(), StoreError>(())
        }
        .await;

        match &result {
            Ok(()) => info!("Successfully connected to database"),
            Err(e) => error!("Failed to connect to the database: {}", e),
        }
        result
    }

    /// Closes the pool and waits for every connection to be released.
    pub async fn stop(&self) {
        let previous = std::mem::replace(&mut *self.write(), Lifecycle::Stopped);
        if let Lifecycle::Running(pool) = previous {
            pool.close().await;
            info!("Database pool closed");
        }
    }

    fn pool(&self) -> Result<SqlitePool, StoreError> {
        match &*self.read() {
            Lifecycle::Running(pool) => Ok(pool.clone()),
            Lifecycle::Uninitialized => Err(StoreError::NotInitialized),
            Lifecycle::Stopped => Err(StoreError::Stopped),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Lifecycle> {
        self.lifecycle.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Lifecycle> {
        self.lifecycle.write().unwrap_or_else(PoisonError::into_inner)
    }
}
