//! Test support: an in-memory backend and a recording logger
//!
//! [`MemoryPool`] behaves like a single PostgreSQL database as far as the
//! runner can observe: transactions buffer their work until commit, a failed
//! statement aborts the transaction, the ledger enforces unique names, and
//! any statement containing a registered pattern fails.

use std::error::Error;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::backends::{AdvisoryLock, DatabasePool, DatabaseRow, DatabaseTransaction, DatabaseValue};
use crate::error::{MigrateError, MigrateResult};
use crate::migrations::definitions::{MigrationRecord, DEFAULT_LEDGER_TABLE};
use crate::migrations::logger::{error_chain, MigrationLogger};

/// Advisory lock activity observed by a [`MemoryPool`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockEvent {
    Acquired(i64),
    Released(i64),
}

#[derive(Debug)]
struct MemoryState {
    ledger_table: String,
    table_exists: bool,
    ledger: Vec<MigrationRecord>,
    next_id: i64,
    executed: Vec<String>,
    failures: Vec<String>,
    lock_fails: bool,
    commits: usize,
    rollbacks: usize,
    locks: Vec<LockEvent>,
}

#[derive(Debug)]
enum Op {
    CreateLedger,
    Insert(String),
    Delete(String),
    Statement(String),
}

impl MemoryState {
    fn classify(&self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<Op> {
        let sql = sql.trim();
        let table = &self.ledger_table;
        let name = || {
            params
                .first()
                .and_then(DatabaseValue::as_str)
                .map(str::to_string)
                .ok_or_else(|| MigrateError::Database("missing name parameter".to_string()))
        };

        if sql.starts_with(&format!("CREATE TABLE IF NOT EXISTS {} ", table)) {
            Ok(Op::CreateLedger)
        } else if sql.starts_with(&format!("INSERT INTO {} ", table)) {
            Ok(Op::Insert(name()?))
        } else if sql.starts_with(&format!("DELETE FROM {} ", table)) {
            Ok(Op::Delete(name()?))
        } else {
            Ok(Op::Statement(sql.to_string()))
        }
    }

    fn check_failure(&self, sql: &str) -> MigrateResult<()> {
        match self.failures.iter().find(|pattern| sql.contains(pattern.as_str())) {
            Some(pattern) => Err(MigrateError::Database(format!("simulated failure on '{}'", pattern))),
            None => Ok(()),
        }
    }

    fn apply(&mut self, op: Op) {
        match op {
            Op::CreateLedger => self.table_exists = true,
            Op::Insert(name) => {
                self.next_id += 1;
                self.ledger.push(MigrationRecord {
                    id: self.next_id,
                    name,
                    executed_at: Utc::now(),
                });
            }
            Op::Delete(name) => self.ledger.retain(|record| record.name != name),
            Op::Statement(sql) => self.executed.push(sql),
        }
    }

    fn missing_table(&self) -> MigrateError {
        MigrateError::Database(format!("relation \"{}\" does not exist", self.ledger_table))
    }
}

/// In-memory stand-in for a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct MemoryPool {
    state: Arc<Mutex<MemoryState>>,
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPool {
    pub fn new() -> Self {
        Self::with_ledger_table(DEFAULT_LEDGER_TABLE)
    }

    pub fn with_ledger_table(table: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                ledger_table: table.to_string(),
                table_exists: false,
                ledger: Vec::new(),
                next_id: 0,
                executed: Vec::new(),
                failures: Vec::new(),
                lock_fails: false,
                commits: 0,
                rollbacks: 0,
                locks: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every statement containing `pattern` fail
    pub fn fail_on(&self, pattern: &str) {
        self.lock().failures.push(pattern.to_string());
    }

    /// Make every advisory lock request fail
    pub fn fail_lock(&self) {
        self.lock().lock_fails = true;
    }

    /// Pre-populate the ledger as if these migrations had been applied
    pub fn seed_ledger(&self, names: &[&str]) {
        let mut state = self.lock();
        state.table_exists = true;
        for name in names {
            state.apply(Op::Insert(name.to_string()));
        }
    }

    /// Committed statements other than ledger bookkeeping, in execution order
    pub fn executed_statements(&self) -> Vec<String> {
        self.lock().executed.clone()
    }

    pub fn ledger_names(&self) -> Vec<String> {
        self.lock().ledger.iter().map(|r| r.name.clone()).collect()
    }

    pub fn ledger_records(&self) -> Vec<MigrationRecord> {
        self.lock().ledger.clone()
    }

    pub fn ledger_table_exists(&self) -> bool {
        self.lock().table_exists
    }

    pub fn commit_count(&self) -> usize {
        self.lock().commits
    }

    pub fn rollback_count(&self) -> usize {
        self.lock().rollbacks
    }

    pub fn lock_events(&self) -> Vec<LockEvent> {
        self.lock().locks.clone()
    }
}

#[async_trait]
impl DatabasePool for MemoryPool {
    async fn begin_transaction(&self) -> MigrateResult<Box<dyn DatabaseTransaction>> {
        Ok(Box::new(MemoryTransaction {
            state: Arc::clone(&self.state),
            ops: Vec::new(),
            aborted: false,
            finished: false,
        }))
    }

    async fn execute(&self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<u64> {
        let mut state = self.lock();
        state.check_failure(sql)?;
        let op = state.classify(sql, params)?;
        match &op {
            Op::Insert(name) if state.ledger.iter().any(|r| &r.name == name) => {
                return Err(MigrateError::Database(format!("duplicate key value: {}", name)));
            }
            Op::Insert(_) | Op::Delete(_) if !state.table_exists => return Err(state.missing_table()),
            _ => {}
        }
        state.apply(op);
        Ok(1)
    }

    async fn fetch_all(&self, sql: &str, _params: &[DatabaseValue]) -> MigrateResult<Vec<DatabaseRow>> {
        let state = self.lock();
        state.check_failure(sql)?;

        if !sql.contains(&format!(" FROM {}", state.ledger_table)) {
            return Ok(Vec::new());
        }
        if !state.table_exists {
            return Err(state.missing_table());
        }

        Ok(state
            .ledger
            .iter()
            .map(|record| {
                DatabaseRow::new(vec![
                    ("id".to_string(), DatabaseValue::Int64(record.id)),
                    ("name".to_string(), DatabaseValue::String(record.name.clone())),
                    ("executed_at".to_string(), DatabaseValue::DateTime(record.executed_at)),
                ])
            })
            .collect())
    }

    async fn advisory_lock(&self, key: i64) -> MigrateResult<Box<dyn AdvisoryLock>> {
        let mut state = self.lock();
        if state.lock_fails {
            return Err(MigrateError::Database(format!("simulated failure taking advisory lock {}", key)));
        }
        state.locks.push(LockEvent::Acquired(key));
        Ok(Box::new(MemoryLock {
            state: Arc::clone(&self.state),
            key,
            released: false,
        }))
    }

    async fn close(&self) {}
}

struct MemoryTransaction {
    state: Arc<Mutex<MemoryState>>,
    ops: Vec<Op>,
    aborted: bool,
    finished: bool,
}

impl MemoryTransaction {
    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn pending_names(&self, committed: &[MigrationRecord]) -> Vec<String> {
        let mut names: Vec<String> = committed.iter().map(|r| r.name.clone()).collect();
        for op in &self.ops {
            match op {
                Op::Insert(name) => names.push(name.clone()),
                Op::Delete(name) => names.retain(|n| n != name),
                _ => {}
            }
        }
        names
    }

    fn stage(&mut self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<()> {
        if self.aborted {
            return Err(MigrateError::Database(
                "current transaction is aborted, commands ignored until end of transaction block".to_string(),
            ));
        }

        let op = {
            let state = self.lock();
            state.check_failure(sql)?;
            let op = state.classify(sql, params)?;
            let table_exists =
                state.table_exists || self.ops.iter().any(|o| matches!(o, Op::CreateLedger));
            match &op {
                Op::Insert(_) | Op::Delete(_) if !table_exists => return Err(state.missing_table()),
                Op::Insert(name) if self.pending_names(&state.ledger).contains(name) => {
                    return Err(MigrateError::Database(format!(
                        "duplicate key value violates unique constraint: {}",
                        name
                    )));
                }
                _ => {}
            }
            op
        };

        self.ops.push(op);
        Ok(())
    }
}

#[async_trait]
impl DatabaseTransaction for MemoryTransaction {
    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<u64> {
        match self.stage(sql, params) {
            Ok(()) => Ok(1),
            Err(err) => {
                self.aborted = true;
                Err(err)
            }
        }
    }

    async fn commit(mut self: Box<Self>) -> MigrateResult<()> {
        self.finished = true;
        let ops = std::mem::take(&mut self.ops);
        let mut state = self.lock();
        if self.aborted {
            state.rollbacks += 1;
            return Ok(());
        }
        for op in ops {
            state.apply(op);
        }
        state.commits += 1;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> MigrateResult<()> {
        self.finished = true;
        self.lock().rollbacks += 1;
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.lock().rollbacks += 1;
        }
    }
}

struct MemoryLock {
    state: Arc<Mutex<MemoryState>>,
    key: i64,
    released: bool,
}

impl MemoryLock {
    fn record_release(&mut self) {
        if !self.released {
            self.released = true;
            let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            state.locks.push(LockEvent::Released(self.key));
        }
    }
}

/// Dropping the guard ends the session, which frees the lock
impl Drop for MemoryLock {
    fn drop(&mut self) {
        self.record_release();
    }
}

#[async_trait]
impl AdvisoryLock for MemoryLock {
    fn key(&self) -> i64 {
        self.key
    }

    async fn release(mut self: Box<Self>) -> MigrateResult<()> {
        self.record_release();
        Ok(())
    }
}

/// Severity of a [`RecordingLogger`] entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Log,
    Warn,
    Error,
}

/// Logger that keeps every message for later assertions
#[derive(Debug, Default)]
pub struct RecordingLogger {
    entries: Mutex<Vec<(LogLevel, String)>>,
}

impl RecordingLogger {
    fn push(&self, level: LogLevel, message: &str, error: Option<&(dyn Error + 'static)>) {
        let text = match error {
            Some(err) => format!("{} ({})", message, error_chain(err)),
            None => message.to_string(),
        };
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((level, text));
    }

    pub fn entries(&self) -> Vec<(LogLevel, String)> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn with_level(&self, level: LogLevel) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, text)| text)
            .collect()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.with_level(LogLevel::Warn)
    }

    pub fn errors(&self) -> Vec<String> {
        self.with_level(LogLevel::Error)
    }

    /// True if any entry, at any level, contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.entries().iter().any(|(_, text)| text.contains(needle))
    }
}

impl MigrationLogger for RecordingLogger {
    fn log(&self, message: &str) {
        self.push(LogLevel::Log, message, None);
    }

    fn warn(&self, message: &str, error: Option<&(dyn Error + 'static)>) {
        self.push(LogLevel::Warn, message, error);
    }

    fn error(&self, message: &str, error: Option<&(dyn Error + 'static)>) {
        self.push(LogLevel::Error, message, error);
    }
}
