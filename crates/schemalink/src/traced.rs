//! Traced connection pool wrappers.
//!
//! Every statement runs inside a `db.query` or `db.execute` debug span carrying
//! the SQL text, so a subscriber sees the exact DDL the synchronizer issued.

use std::ops::Deref;

use sqlx::mysql::{MySqlPool, MySqlRow};
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;
use tracing::Instrument;

use crate::error::BackendError;

/// A traced PostgreSQL connection pool.
#[derive(Clone)]
pub struct TracedPool {
    inner: deadpool_postgres::Pool,
}

impl TracedPool {
    pub fn new(pool: deadpool_postgres::Pool) -> Self {
        Self { inner: pool }
    }

    /// Get a traced connection from the pool.
    pub async fn get(&self) -> Result<TracedObject, BackendError> {
        let conn = self.inner.get().await?;
        Ok(TracedObject { inner: conn })
    }

    pub fn close(&self) {
        self.inner.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// A pooled PostgreSQL connection whose statements are logged.
pub struct TracedObject {
    inner: deadpool_postgres::Object,
}

impl TracedObject {
    /// Run one or more statements without parameters.
    pub async fn batch_execute(&self, sql: &str) -> Result<(), BackendError> {
        let span = tracing::debug_span!("db.execute", sql = %sql);
        let client: &tokio_postgres::Client = self.inner.deref();
        client.batch_execute(sql).instrument(span).await?;
        Ok(())
    }

    /// Execute a query, returning all rows.
    pub async fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>, BackendError> {
        let span = tracing::debug_span!(
            "db.query",
            sql = %sql,
            params = params.len(),
            rows = tracing::field::Empty,
        );
        let client: &tokio_postgres::Client = self.inner.deref();
        let rows = client.query(sql, params).instrument(span.clone()).await?;
        span.record("rows", rows.len());
        Ok(rows)
    }
}

/// A traced MySQL connection pool.
#[derive(Clone)]
pub struct TracedMySqlPool {
    inner: MySqlPool,
}

impl TracedMySqlPool {
    pub fn new(pool: MySqlPool) -> Self {
        Self { inner: pool }
    }

    /// Execute a statement, returning the number of rows affected.
    pub async fn execute(&self, sql: &str) -> Result<u64, BackendError> {
        let span = tracing::debug_span!(
            "db.execute",
            sql = %sql,
            affected = tracing::field::Empty,
        );
        let result = sqlx::raw_sql(sql)
            .execute(&self.inner)
            .instrument(span.clone())
            .await?;
        span.record("affected", result.rows_affected());
        Ok(result.rows_affected())
    }

    /// Run a query with string parameters bound in order.
    pub async fn query(&self, sql: &str, params: &[&str]) -> Result<Vec<MySqlRow>, BackendError> {
        let span = tracing::debug_span!(
            "db.query",
            sql = %sql,
            params = params.len(),
            rows = tracing::field::Empty,
        );
        let mut query = sqlx::query(sql);
        for param in params {
            query = query.bind(*param);
        }
        let rows = query.fetch_all(&self.inner).instrument(span.clone()).await?;
        span.record("rows", rows.len());
        Ok(rows)
    }

    pub async fn close(&self) {
        self.inner.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}
