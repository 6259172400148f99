//! SQLite connection implementation.
//!
//! This module provides safe wrappers around SQLite's C API and implements the
//! [`Connection`] trait from relgraph-core.

// Allow casts in FFI code where we need to match C types exactly
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::borrow_as_ptr)]

use crate::ffi;
use crate::types;
use relgraph_core::{
    ColumnInfo, Connection, ConnectionError, Error, Params, QueryError, QueryErrorKind, Result,
    Row, Value,
};
use std::ffi::{CStr, CString, c_int};
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard};

/// Configuration for opening SQLite connections.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path to the database file, or ":memory:" for an in-memory database.
    pub path: String,
    pub read_only: bool,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
    /// Run `PRAGMA foreign_keys = ON` after opening.
    pub foreign_keys: bool,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            read_only: false,
            busy_timeout_ms: 5000,
            foreign_keys: true,
        }
    }
}

impl SqliteConfig {
    /// Create a new config for a file-based database.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Create a new config for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Set busy timeout.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    /// Enforce foreign-key constraints.
    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    fn open_flags(&self) -> c_int {
        let mode = if self.read_only {
            ffi::SQLITE_OPEN_READONLY
        } else {
            ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE
        };
        mode | ffi::SQLITE_OPEN_URI | ffi::SQLITE_OPEN_FULLMUTEX
    }
}

/// Inner state of the SQLite connection, protected by a mutex.
struct SqliteInner {
    db: *mut ffi::sqlite3,
    in_transaction: bool,
}

// SAFETY: the handle is opened in serialized mode and only touched under the Mutex.
unsafe impl Send for SqliteInner {}

/// A synchronous connection to a SQLite database.
pub struct SqliteConnection {
    inner: Mutex<SqliteInner>,
    path: String,
}

impl SqliteConnection {
    /// Open a new SQLite connection with the given configuration.
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let c_path = CString::new(config.path.as_str()).map_err(|_| {
            Error::Connection(ConnectionError {
                message: "Invalid path: contains null byte".to_string(),
                source: None,
            })
        })?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        // SAFETY: We pass valid pointers and check the return value
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, config.open_flags(), ptr::null()) };

        if rc != ffi::SQLITE_OK {
            let msg = if db.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: db is a valid (failed) handle that must still be closed
                unsafe {
                    let msg = ffi::last_error(db);
                    ffi::sqlite3_close(db);
                    msg
                }
            };
            return Err(Error::Connection(ConnectionError {
                message: format!("Failed to open database {}: {}", config.path, msg),
                source: None,
            }));
        }

        if config.busy_timeout_ms > 0 {
            let timeout = c_int::try_from(config.busy_timeout_ms).unwrap_or(c_int::MAX);
            // SAFETY: db is valid
            unsafe {
                ffi::sqlite3_busy_timeout(db, timeout);
            }
        }

        let conn = Self {
            inner: Mutex::new(SqliteInner {
                db,
                in_transaction: false,
            }),
            path: config.path.clone(),
        };
        if config.foreign_keys {
            conn.execute_raw("PRAGMA foreign_keys = ON")?;
        }
        tracing::debug!(path = %config.path, version = ffi::version(), "opened sqlite database");
        Ok(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::open(&SqliteConfig::memory())
    }

    /// Open a file-based database.
    pub fn open_file(path: impl Into<String>) -> Result<Self> {
        Self::open(&SqliteConfig::file(path))
    }

    /// Get the database path.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn in_transaction(&self) -> bool {
        self.lock().in_transaction
    }

    fn lock(&self) -> MutexGuard<'_, SqliteInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Execute SQL directly without preparing (DDL, pragmas, several statements).
    pub fn execute_raw(&self, sql: &str) -> Result<()> {
        let inner = self.lock();
        exec(inner.db, sql)
    }

    /// Get the last insert rowid.
    pub fn last_insert_rowid(&self) -> i64 {
        let inner = self.lock();
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_last_insert_rowid(inner.db) }
    }

    /// Get the number of rows changed by the last statement.
    pub fn changes(&self) -> i32 {
        let inner = self.lock();
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_changes(inner.db) }
    }

    /// Prepare, bind and step a statement, collecting any rows it produces.
    fn run(&self, inner: &SqliteInner, sql: &str, params: &Params) -> Result<Vec<Row>> {
        tracing::trace!(sql = %sql, params = params.len(), types = params.types(), "sqlite statement");
        let stmt = Statement::prepare(inner.db, sql)?;
        for (i, value) in params.values().iter().enumerate() {
            stmt.bind(i + 1, value)?;
        }

        // SAFETY: stmt is valid
        let col_count = unsafe { ffi::sqlite3_column_count(stmt.raw) };
        let names = (0..col_count)
            // SAFETY: stmt is valid and i is in range
            .map(|i| unsafe { types::column_name(stmt.raw, i) }.unwrap_or_else(|| format!("col{}", i)))
            .collect();
        let columns = Arc::new(ColumnInfo::new(names));

        let mut rows = Vec::new();
        loop {
            // SAFETY: stmt is valid
            match unsafe { ffi::sqlite3_step(stmt.raw) } {
                ffi::SQLITE_ROW => {
                    let values = (0..col_count)
                        // SAFETY: we just got SQLITE_ROW
                        .map(|i| unsafe { types::read_column(stmt.raw, i) })
                        .collect();
                    rows.push(Row::with_columns(Arc::clone(&columns), values));
                }
                ffi::SQLITE_DONE => break,
                _ => return Err(step_error(inner.db, sql)),
            }
        }
        Ok(rows)
    }

    fn transaction_error(message: &str) -> Error {
        Error::Query(QueryError::new(QueryErrorKind::Transaction, message))
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        let inner = self.lock();
        if !inner.db.is_null() {
            // SAFETY: db is valid and no statement outlives the call that created it
            unsafe {
                ffi::sqlite3_close_v2(inner.db);
            }
        }
    }
}

impl Connection for SqliteConnection {
    fn query(&self, sql: &str, params: &Params) -> Result<Vec<Row>> {
        let inner = self.lock();
        self.run(&inner, sql, params)
    }

    fn execute(&self, sql: &str, params: &Params) -> Result<u64> {
        let inner = self.lock();
        self.run(&inner, sql, params)?;
        // SAFETY: db is valid
        let changes = unsafe { ffi::sqlite3_changes(inner.db) };
        Ok(u64::try_from(changes).unwrap_or(0))
    }

    fn insert(&self, sql: &str, params: &Params) -> Result<i64> {
        let inner = self.lock();
        self.run(&inner, sql, params)?;
        // SAFETY: db is valid; the lock keeps other statements from interleaving
        Ok(unsafe { ffi::sqlite3_last_insert_rowid(inner.db) })
    }

    fn begin(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.in_transaction {
            return Err(Self::transaction_error("Already in a transaction"));
        }
        exec(inner.db, "BEGIN IMMEDIATE")?;
        inner.in_transaction = true;
        tracing::trace!("BEGIN");
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let mut inner = self.lock();
        if !inner.in_transaction {
            return Err(Self::transaction_error("Not in a transaction"));
        }
        exec(inner.db, "COMMIT")?;
        inner.in_transaction = false;
        tracing::trace!("COMMIT");
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        let mut inner = self.lock();
        if !inner.in_transaction {
            return Err(Self::transaction_error("Not in a transaction"));
        }
        inner.in_transaction = false;
        exec(inner.db, "ROLLBACK")?;
        tracing::trace!("ROLLBACK");
        Ok(())
    }
}

/// A prepared statement, finalized on drop.
struct Statement<'a> {
    raw: *mut ffi::sqlite3_stmt,
    db: *mut ffi::sqlite3,
    sql: &'a str,
}

impl<'a> Statement<'a> {
    fn prepare(db: *mut ffi::sqlite3, sql: &'a str) -> Result<Self> {
        let c_sql = CString::new(sql).map_err(|_| {
            Error::Query(
                QueryError::new(QueryErrorKind::Syntax, "SQL contains null byte").with_sql(sql),
            )
        })?;
        let len = c_int::try_from(c_sql.as_bytes().len()).map_err(|_| {
            Error::Query(QueryError::new(QueryErrorKind::Syntax, "SQL too long").with_sql(sql))
        })?;

        let mut raw: *mut ffi::sqlite3_stmt = ptr::null_mut();
        // SAFETY: All pointers are valid
        let rc = unsafe { ffi::sqlite3_prepare_v2(db, c_sql.as_ptr(), len, &mut raw, ptr::null_mut()) };
        if rc != ffi::SQLITE_OK {
            // SAFETY: db is valid
            let msg = unsafe { ffi::last_error(db) };
            return Err(Error::Query(
                QueryError::new(error_code_to_kind(rc), format!("Failed to prepare statement: {}", msg))
                    .with_sql(sql),
            ));
        }
        Ok(Self { raw, db, sql })
    }

    fn bind(&self, index: usize, value: &Value) -> Result<()> {
        let position = c_int::try_from(index).unwrap_or(c_int::MAX);
        // SAFETY: raw is a valid statement; SQLite range-checks the index
        let rc = unsafe { types::bind_value(self.raw, position, value) };
        if rc == ffi::SQLITE_OK {
            return Ok(());
        }
        // SAFETY: db is valid
        let msg = unsafe { ffi::last_error(self.db) };
        Err(Error::Query(
            QueryError::new(
                QueryErrorKind::Database,
                format!("Failed to bind parameter {}: {}", index, msg),
            )
            .with_sql(self.sql),
        ))
    }
}

impl Drop for Statement<'_> {
    fn drop(&mut self) {
        // SAFETY: raw came from sqlite3_prepare_v2 (finalizing null is a no-op)
        unsafe {
            ffi::sqlite3_finalize(self.raw);
        }
    }
}

fn exec(db: *mut ffi::sqlite3, sql: &str) -> Result<()> {
    let c_sql = CString::new(sql).map_err(|_| {
        Error::Query(QueryError::new(QueryErrorKind::Syntax, "SQL contains null byte").with_sql(sql))
    })?;
    let mut errmsg: *mut std::ffi::c_char = ptr::null_mut();

    // SAFETY: All pointers are valid
    let rc = unsafe { ffi::sqlite3_exec(db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg) };
    if rc == ffi::SQLITE_OK {
        return Ok(());
    }

    let msg = if errmsg.is_null() {
        ffi::error_string(rc).to_string()
    } else {
        // SAFETY: errmsg is a valid C string allocated by SQLite
        unsafe {
            let msg = CStr::from_ptr(errmsg).to_string_lossy().into_owned();
            ffi::sqlite3_free(errmsg.cast());
            msg
        }
    };
    Err(Error::Query(QueryError::new(error_code_to_kind(rc), msg).with_sql(sql)))
}

fn step_error(db: *mut ffi::sqlite3, sql: &str) -> Error {
    // SAFETY: db is valid
    let (msg, code) = unsafe { (ffi::last_error(db), ffi::sqlite3_errcode(db)) };
    Error::Query(QueryError::new(error_code_to_kind(code), msg).with_sql(sql))
}

fn error_code_to_kind(code: c_int) -> QueryErrorKind {
    // Extended codes carry the primary code in the low byte.
    match code & 0xff {
        ffi::SQLITE_CONSTRAINT => QueryErrorKind::Constraint,
        ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED => QueryErrorKind::Busy,
        ffi::SQLITE_PERM | ffi::SQLITE_AUTH => QueryErrorKind::Permission,
        ffi::SQLITE_NOTFOUND => QueryErrorKind::NotFound,
        ffi::SQLITE_ERROR => QueryErrorKind::Syntax,
        _ => QueryErrorKind::Database,
    }
}
