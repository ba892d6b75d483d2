//! Core Database Backend Traits
//!
//! The migration core talks to the database only through these traits so the
//! runner can be driven by PostgreSQL in production and by an in-memory
//! backend in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{MigrateError, MigrateResult};

/// Abstract database connection pool
#[async_trait]
pub trait DatabasePool: Send + Sync {
    /// Begin a transaction on a pooled connection
    async fn begin_transaction(&self) -> MigrateResult<Box<dyn DatabaseTransaction>>;

    /// Execute a statement outside any explicit transaction
    async fn execute(&self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<u64>;

    /// Execute a query and return all result rows
    async fn fetch_all(&self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<Vec<DatabaseRow>>;

    /// Take a session-level advisory lock, blocking until it is granted
    async fn advisory_lock(&self, key: i64) -> MigrateResult<Box<dyn AdvisoryLock>>;

    /// Close the pool
    async fn close(&self);
}

/// Abstract database transaction
///
/// Dropping a transaction without calling [`commit`](Self::commit) rolls it back.
#[async_trait]
pub trait DatabaseTransaction: Send {
    /// Execute a statement within the transaction
    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<u64>;

    /// Commit the transaction
    async fn commit(self: Box<Self>) -> MigrateResult<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> MigrateResult<()>;
}

/// Held advisory lock; must be released explicitly
#[async_trait]
pub trait AdvisoryLock: Send {
    /// Key the lock was taken with
    fn key(&self) -> i64;

    /// Release the lock and return its connection to the pool
    async fn release(self: Box<Self>) -> MigrateResult<()>;
}

/// Database value enumeration for parameter binding and row access
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    String(String),
    DateTime(DateTime<Utc>),
}

impl DatabaseValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DatabaseValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DatabaseValue::Int32(i) => Some(i64::from(*i)),
            DatabaseValue::Int64(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            DatabaseValue::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }
}

impl From<&str> for DatabaseValue {
    fn from(value: &str) -> Self {
        DatabaseValue::String(value.to_string())
    }
}

impl From<String> for DatabaseValue {
    fn from(value: String) -> Self {
        DatabaseValue::String(value)
    }
}

impl From<i64> for DatabaseValue {
    fn from(value: i64) -> Self {
        DatabaseValue::Int64(value)
    }
}

/// A single result row: column names paired with their values, in select order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatabaseRow {
    columns: Vec<(String, DatabaseValue)>,
}

impl DatabaseRow {
    pub fn new(columns: Vec<(String, DatabaseValue)>) -> Self {
        Self { columns }
    }

    /// Get a column value by name
    pub fn get_by_name(&self, name: &str) -> MigrateResult<&DatabaseValue> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
            .ok_or_else(|| MigrateError::Database(format!("Column '{}' not found", name)))
    }

    pub fn get_string(&self, name: &str) -> MigrateResult<String> {
        self.get_by_name(name)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| MigrateError::Database(format!("Column '{}' is not a string", name)))
    }

    pub fn get_i64(&self, name: &str) -> MigrateResult<i64> {
        self.get_by_name(name)?
            .as_i64()
            .ok_or_else(|| MigrateError::Database(format!("Column '{}' is not an integer", name)))
    }

    pub fn get_datetime(&self, name: &str) -> MigrateResult<DateTime<Utc>> {
        self.get_by_name(name)?
            .as_datetime()
            .ok_or_else(|| MigrateError::Database(format!("Column '{}' is not a timestamp", name)))
    }
}
