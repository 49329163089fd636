//! Synchronous Postgres wire protocol client, authentication and connection pool.
//!
//! [`Connection`] speaks the frontend/backend protocol over a blocking
//! socket and drives the extended query protocol exclusively (no Simple
//! Query). [`Pool`] hands out [`Connection`]s to multiple threads, each of
//! which uses its connection single-threaded for the duration of a checkout.
//!
//! ```no_run
//! use pgdirect::{Connection, Config};
//!
//! let config = Config::new("localhost", "postgres");
//! let conn = Connection::connect(&config)?;
//! let stmt = conn.prepare("select 1")?;
//! let mut cursor = stmt.execute(&[], true)?;
//! while let Some(row) = cursor.next_row()? {
//!     let _ = row;
//! }
//! # Ok::<(), pgdirect::Error>(())
//! ```
pub mod codec;
pub mod common;
pub mod connection;
pub mod crypto;
pub mod cursor;
pub mod delegate;
pub mod error;
pub mod message;
pub mod notice;
pub mod params;
pub mod pool;
pub mod row;
pub mod statement;
pub mod tls;

pub use connection::{Config, Connection, Credential};
pub use cursor::{Cursor, CursorId};
pub use delegate::{Delegate, LoggingDelegate};
pub use error::{Error, ErrorKind, Result};
pub use notice::Notice;
pub use pool::{Pool, PoolConfig, PoolMetrics};
pub use row::{ColumnIndex, ColumnMetadata, Row, Value};
pub use statement::{Statement, StatementName};
