//! PostgreSQL Backend Implementation
//!
//! Implements the backend traits on top of a sqlx `PgPool`. Statements without
//! parameters go through the simple query protocol so migration scripts are
//! sent verbatim, exactly as written in the file.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::pool::PoolConnection;
use sqlx::{Column, Executor, PgPool, Postgres, Row, TypeInfo, ValueRef};

use super::core::*;
use crate::error::{MigrateError, MigrateResult};

/// PostgreSQL connection pool implementation
#[derive(Debug, Clone)]
pub struct PostgresPool {
    pool: PgPool,
}

impl PostgresPool {
    /// Wrap an existing sqlx pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a new pool with the given connect options
    pub async fn connect(
        options: PgConnectOptions,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> MigrateResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect_with(options)
            .await
            .map_err(|e| MigrateError::Connection(format!("Failed to create PostgreSQL pool: {}", e)))?;

        tracing::debug!("PostgreSQL pool created (max_connections={})", max_connections);
        Ok(Self::new(pool))
    }

    /// Get the underlying sqlx pool
    pub fn inner(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DatabasePool for PostgresPool {
    async fn begin_transaction(&self) -> MigrateResult<Box<dyn DatabaseTransaction>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MigrateError::Transaction(format!("Failed to start transaction: {}", e)))?;

        Ok(Box::new(PostgresTransaction { tx: Some(tx) }))
    }

    async fn execute(&self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<u64> {
        let result = if params.is_empty() {
            (&self.pool).execute(sql).await
        } else {
            bind_params(sqlx::query(sql), params).execute(&self.pool).await
        };

        result
            .map(|r| r.rows_affected())
            .map_err(|e| MigrateError::Database(e.to_string()))
    }

    async fn fetch_all(&self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<Vec<DatabaseRow>> {
        let rows = bind_params(sqlx::query(sql), params)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::Database(format!("Query fetch failed: {}", e)))?;

        rows.iter().map(convert_row).collect()
    }

    async fn advisory_lock(&self, key: i64) -> MigrateResult<Box<dyn AdvisoryLock>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| MigrateError::Connection(format!("Failed to acquire connection: {}", e)))?;

        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(key)
            .execute(&mut *conn)
            .await
            .map_err(|e| MigrateError::Database(format!("Failed to take advisory lock {}: {}", key, e)))?;

        Ok(Box::new(PostgresAdvisoryLock { conn: Some(conn), key }))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// PostgreSQL transaction implementation
pub struct PostgresTransaction {
    tx: Option<sqlx::Transaction<'static, Postgres>>,
}

impl PostgresTransaction {
    fn active(&mut self) -> MigrateResult<&mut sqlx::Transaction<'static, Postgres>> {
        self.tx
            .as_mut()
            .ok_or_else(|| MigrateError::Transaction("Transaction already completed".to_string()))
    }
}

#[async_trait]
impl DatabaseTransaction for PostgresTransaction {
    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<u64> {
        let tx = self.active()?;

        let result = if params.is_empty() {
            (&mut **tx).execute(sql).await
        } else {
            bind_params(sqlx::query(sql), params).execute(&mut **tx).await
        };

        result
            .map(|r| r.rows_affected())
            .map_err(|e| MigrateError::Database(e.to_string()))
    }

    async fn commit(mut self: Box<Self>) -> MigrateResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| MigrateError::Transaction("Transaction already completed".to_string()))?;

        tx.commit()
            .await
            .map_err(|e| MigrateError::Transaction(format!("Transaction commit failed: {}", e)))
    }

    async fn rollback(mut self: Box<Self>) -> MigrateResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| MigrateError::Transaction("Transaction already completed".to_string()))?;

        tx.rollback()
            .await
            .map_err(|e| MigrateError::Transaction(format!("Transaction rollback failed: {}", e)))
    }
}

/// Advisory lock pinned to the pooled connection that took it
///
/// The lock lives as long as the server session. A guard dropped without
/// `release` detaches its connection from the pool so the session ends
/// with it instead of idling in the pool while still holding the key.
pub struct PostgresAdvisoryLock {
    conn: Option<PoolConnection<Postgres>>,
    key: i64,
}

#[async_trait]
impl AdvisoryLock for PostgresAdvisoryLock {
    fn key(&self) -> i64 {
        self.key
    }

    async fn release(mut self: Box<Self>) -> MigrateResult<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };

        match sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(self.key)
            .execute(&mut *conn)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                drop(conn.detach());
                Err(MigrateError::Database(format!(
                    "Failed to release advisory lock {}: {}",
                    self.key, e
                )))
            }
        }
    }
}

impl Drop for PostgresAdvisoryLock {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::warn!(
                "Advisory lock {} dropped without release, closing its connection",
                self.key
            );
            drop(conn.detach());
        }
    }
}

fn bind_params<'q>(
    mut query: sqlx::query::Query<'q, Postgres, PgArguments>,
    params: &[DatabaseValue],
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            DatabaseValue::Null => query.bind(Option::<String>::None),
            DatabaseValue::Bool(b) => query.bind(*b),
            DatabaseValue::Int32(i) => query.bind(*i),
            DatabaseValue::Int64(i) => query.bind(*i),
            DatabaseValue::String(s) => query.bind(s.clone()),
            DatabaseValue::DateTime(dt) => query.bind(*dt),
        };
    }
    query
}

fn convert_row(row: &PgRow) -> MigrateResult<DatabaseRow> {
    let columns = row
        .columns()
        .iter()
        .enumerate()
        .map(|(index, column)| Ok((column.name().to_string(), convert_value(row, index)?)))
        .collect::<MigrateResult<Vec<_>>>()?;

    Ok(DatabaseRow::new(columns))
}

/// Convert a PostgreSQL column value to DatabaseValue
fn convert_value(row: &PgRow, index: usize) -> MigrateResult<DatabaseValue> {
    let raw = row
        .try_get_raw(index)
        .map_err(|e| MigrateError::Database(format!("Failed to read column {}: {}", index, e)))?;
    if raw.is_null() {
        return Ok(DatabaseValue::Null);
    }

    let type_name = row.columns()[index].type_info().name().to_string();
    let decode_err = |e: sqlx::Error| {
        MigrateError::Database(format!("Failed to decode {} column {}: {}", type_name, index, e))
    };

    let value = match type_name.as_str() {
        "BOOL" => DatabaseValue::Bool(row.try_get(index).map_err(decode_err)?),
        "INT2" => DatabaseValue::Int32(i32::from(row.try_get::<i16, _>(index).map_err(decode_err)?)),
        "INT4" => DatabaseValue::Int32(row.try_get(index).map_err(decode_err)?),
        "INT8" => DatabaseValue::Int64(row.try_get(index).map_err(decode_err)?),
        "TIMESTAMP" => {
            let naive: NaiveDateTime = row.try_get(index).map_err(decode_err)?;
            DatabaseValue::DateTime(DateTime::from_naive_utc_and_offset(naive, Utc))
        }
        "TIMESTAMPTZ" => DatabaseValue::DateTime(row.try_get(index).map_err(decode_err)?),
        _ => DatabaseValue::String(row.try_get(index).map_err(decode_err)?),
    };

    Ok(value)
}
