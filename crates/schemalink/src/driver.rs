//! Database drivers.
//!
//! A [`Driver`] pairs an [`Inspector`] with an [`Executor`] over one
//! connection pool. [`open`] picks the implementation from the DSN scheme.

use std::sync::Arc;

use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use schemalink_sql::Dialect;
use sqlx::mysql::MySqlPoolOptions;
use tokio_postgres::NoTls;

use crate::config::LinkConfig;
use crate::error::BackendError;
use crate::inspect::{BoxFuture, Inspector, MySqlInspector, PostgresInspector};
use crate::plan::ChangeStep;
use crate::traced::{TracedMySqlPool, TracedPool};
use crate::{Error, Result};

/// Runs DDL statements.
pub trait Executor: Send + Sync {
    fn execute<'a>(&'a self, step: &'a ChangeStep) -> BoxFuture<'a, Result<(), BackendError>>;

    /// Release the pool. Calling it twice is harmless.
    fn close(&self) -> BoxFuture<'_, ()>;

    fn is_closed(&self) -> bool;
}

/// Everything a connection needs from a database.
pub trait Driver: Executor {
    fn dialect(&self) -> Dialect;

    fn inspector(&self) -> &dyn Inspector;
}

/// Connect to the database described by `config`.
pub async fn open(config: &LinkConfig) -> Result<Arc<dyn Driver>> {
    let driver: Arc<dyn Driver> = match config.dialect()? {
        Dialect::Postgres => Arc::new(PostgresDriver::connect(config).await?),
        Dialect::MySql => Arc::new(MySqlDriver::connect(config).await?),
    };
    tracing::info!(
        database = %config.name,
        dialect = %driver.dialect(),
        max_connections = config.max_connections,
        "connected"
    );
    Ok(driver)
}

fn connect_error(config: &LinkConfig, source: BackendError) -> Error {
    Error::Connect {
        database: config.name.clone(),
        source,
    }
}

pub struct PostgresDriver {
    pool: TracedPool,
    inspector: PostgresInspector,
}

impl PostgresDriver {
    pub fn new(pool: TracedPool) -> Self {
        Self {
            inspector: PostgresInspector::new(pool.clone()),
            pool,
        }
    }

    /// Build the pool and check out one connection to verify the DSN.
    pub async fn connect(config: &LinkConfig) -> Result<Self> {
        let pg_config: tokio_postgres::Config = config
            .dsn
            .parse()
            .map_err(|e| connect_error(config, BackendError::Postgres(e)))?;

        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(manager)
            .max_size(config.max_connections as usize)
            .wait_timeout(Some(config.acquire_timeout))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| connect_error(config, BackendError::Other(e.to_string())))?;

        let pool = TracedPool::new(pool);
        pool.get()
            .await
            .map_err(|e| connect_error(config, e))?;

        Ok(Self::new(pool))
    }
}

impl Executor for PostgresDriver {
    fn execute<'a>(&'a self, step: &'a ChangeStep) -> BoxFuture<'a, Result<(), BackendError>> {
        Box::pin(async move {
            let conn = self.pool.get().await?;
            conn.batch_execute(&step.sql).await
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move { self.pool.close() })
    }

    fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

impl Driver for PostgresDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn inspector(&self) -> &dyn Inspector {
        &self.inspector
    }
}

pub struct MySqlDriver {
    pool: TracedMySqlPool,
    inspector: MySqlInspector,
}

impl MySqlDriver {
    pub fn new(pool: TracedMySqlPool) -> Self {
        Self {
            inspector: MySqlInspector::new(pool.clone()),
            pool,
        }
    }

    pub async fn connect(config: &LinkConfig) -> Result<Self> {
        // sqlx only knows the mysql scheme
        let dsn = match config.dsn.split_once("://") {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("mariadb") => {
                format!("mysql://{}", rest)
            }
            _ => config.dsn.clone(),
        };

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&dsn)
            .await
            .map_err(|e| connect_error(config, e.into()))?;

        Ok(Self::new(TracedMySqlPool::new(pool)))
    }
}

impl Executor for MySqlDriver {
    fn execute<'a>(&'a self, step: &'a ChangeStep) -> BoxFuture<'a, Result<(), BackendError>> {
        Box::pin(async move {
            self.pool.execute(&step.sql).await?;
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.pool.close())
    }

    fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

impl Driver for MySqlDriver {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    fn inspector(&self) -> &dyn Inspector {
        &self.inspector
    }
}
