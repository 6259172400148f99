//! The SQL client contract consumed by the graph engine.
//!
//! - [`Connection`] - synchronous query/execute/insert plus explicit transaction control
//! - [`Txn`] - whether a call opens and/or closes the surrounding transaction
//!
//! Every statement is a SQL string plus a [`Params`] list whose type-tag string runs
//! parallel to its values.

use crate::error::{Error, Result};
use crate::row::Row;
use crate::value::Params;

/// A synchronous connection to a relational database.
///
/// Implementations use interior mutability where they need it; every method takes
/// `&self` so that the engine can hold one shared borrow for the whole operation.
pub trait Connection {
    /// Execute a parameterized query and return all rows.
    fn query(&self, sql: &str, params: &Params) -> Result<Vec<Row>>;

    /// Execute a query that carries no parameters.
    fn query_plain(&self, sql: &str) -> Result<Vec<Row>> {
        self.query(sql, &Params::new())
    }

    /// Execute a query expected to produce at most one row.
    ///
    /// More than one row is a [`Error::NotUnique`] failure.
    fn query_single(&self, sql: &str, params: &Params) -> Result<Option<Row>> {
        let mut rows = self.query(sql, params)?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            n => Err(Error::not_unique("row", n)),
        }
    }

    /// Execute a statement and return the number of affected rows.
    fn execute(&self, sql: &str, params: &Params) -> Result<u64>;

    /// Execute an INSERT and return the generated key of the new row.
    fn insert(&self, sql: &str, params: &Params) -> Result<i64>;

    /// Begin a transaction.
    fn begin(&self) -> Result<()>;

    /// Commit the current transaction.
    fn commit(&self) -> Result<()>;

    /// Roll back the current transaction.
    fn rollback(&self) -> Result<()>;
}

impl<C: Connection + ?Sized> Connection for &C {
    fn query(&self, sql: &str, params: &Params) -> Result<Vec<Row>> {
        (**self).query(sql, params)
    }

    fn query_plain(&self, sql: &str) -> Result<Vec<Row>> {
        (**self).query_plain(sql)
    }

    fn query_single(&self, sql: &str, params: &Params) -> Result<Option<Row>> {
        (**self).query_single(sql, params)
    }

    fn execute(&self, sql: &str, params: &Params) -> Result<u64> {
        (**self).execute(sql, params)
    }

    fn insert(&self, sql: &str, params: &Params) -> Result<i64> {
        (**self).insert(sql, params)
    }

    fn begin(&self) -> Result<()> {
        (**self).begin()
    }

    fn commit(&self) -> Result<()> {
        (**self).commit()
    }

    fn rollback(&self) -> Result<()> {
        (**self).rollback()
    }
}

/// Transaction responsibilities of one call in a nested write.
///
/// The outermost call opens and closes; recursive calls for parents, pointing-back
/// fixups and batch members run inside the caller's transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Txn {
    pub begin: bool,
    pub commit: bool,
}

impl Txn {
    /// Open and commit a transaction around the call.
    pub const OWNED: Txn = Txn {
        begin: true,
        commit: true,
    };

    /// Run inside a transaction someone else manages.
    pub const JOINED: Txn = Txn {
        begin: false,
        commit: false,
    };

    /// Run `body` under these responsibilities.
    ///
    /// When this call opened the transaction, any failure rolls it back before the
    /// error is returned. The original error wins over a rollback failure.
    pub fn run<C, T, F>(self, conn: &C, body: F) -> Result<T>
    where
        C: Connection + ?Sized,
        F: FnOnce() -> Result<T>,
    {
        if self.begin {
            conn.begin()?;
        }
        let outcome = body().and_then(|value| {
            if self.commit {
                conn.commit()?;
            }
            Ok(value)
        });
        if let Err(err) = &outcome {
            if self.begin {
                tracing::warn!(error = %err, "rolling back transaction");
                if let Err(rollback_err) = conn.rollback() {
                    tracing::warn!(error = %rollback_err, "rollback failed");
                }
            }
        }
        outcome
    }
}
