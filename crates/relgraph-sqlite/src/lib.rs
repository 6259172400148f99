//! SQLite client for relgraph.
//!
// FFI bindings require unsafe code
#![allow(unsafe_code)]
//!
//! This crate implements the `Connection` trait from relgraph-core over the bundled
//! SQLite library. It is the reference SQL client for the graph engine and the one the
//! integration tests run against.
//!
//! # Example
//!
//! ```rust
//! use relgraph_core::{BindType, Connection, Params, Value};
//! use relgraph_sqlite::SqliteConnection;
//!
//! let conn = SqliteConnection::open_memory().unwrap();
//! conn.execute_raw("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)").unwrap();
//!
//! let mut params = Params::new();
//! params.push(Value::Text("Alice".into()), BindType::Text);
//! let id = conn.insert("INSERT INTO users (name) VALUES (?)", &params).unwrap();
//! assert_eq!(id, 1);
//! ```
//!
//! # Type Mapping
//!
//! | relgraph `Value` | SQLite storage class |
//! |------------------|----------------------|
//! | `Bool` | INTEGER (0/1) |
//! | `Int`, `BigInt` | INTEGER |
//! | `Double` | REAL |
//! | `Text` | TEXT |
//! | `Bytes` | BLOB |
//! | `Null` | NULL |
//!
//! Dates, times, emails, addresses and colors reach the client already rendered as
//! text.
//!
//! # Thread Safety
//!
//! `SqliteConnection` is `Send` and `Sync`; the handle sits behind a mutex and is
//! opened in serialized mode.

pub mod connection;
pub mod ffi;
pub mod types;

pub use connection::{SqliteConfig, SqliteConnection};

/// The SQLite library version.
pub fn sqlite_version() -> &'static str {
    ffi::version()
}

/// The SQLite library version number.
pub fn sqlite_version_number() -> i32 {
    ffi::version_number()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_version() {
        assert!(sqlite_version().starts_with('3'));
        assert!(sqlite_version_number() >= 3_035_000);
    }

    #[test]
    fn connection_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SqliteConnection>();
    }
}
