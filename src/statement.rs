//! Prepared statement handle and server-side name generation.
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::{
    connection::Shared,
    error::ErrorKind,
    Result,
};

/// A monotonically increasing, wrap-around statement name, rendered as
/// `s<digits>` for use as a server-side prepared-statement name.
#[derive(Clone, PartialEq, Eq)]
pub struct StatementName(Arc<str>);

impl StatementName {
    pub(crate) fn next(counter: &AtomicU32) -> Self {
        let id = counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::from(format!("s{id}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StatementName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Debug for StatementName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("StatementName").field(&self.as_str()).finish()
    }
}

/// A prepared statement, server-side-named and owned by the [`Connection`]
/// that created it.
///
/// Closed by [`Statement::close`] or implicitly when the owning connection
/// closes. A closed statement rejects every operation.
pub struct Statement {
    pub(crate) connection: Weak<Mutex<Shared>>,
    pub(crate) name: StatementName,
    pub(crate) sql: Arc<str>,
    pub(crate) closed: bool,
}

impl Statement {
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn connection(&self) -> Result<Arc<Mutex<Shared>>> {
        self.connection.upgrade().ok_or_else(|| ErrorKind::ConnectionClosed.into())
    }

    /// Close the server-side prepared statement. Idempotent. Errors are
    /// logged and swallowed, matching the envelope's treatment of
    /// `CloseStatement` (spec §4.3).
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Ok(shared) = self.connection() {
            if let Ok(mut shared) = shared.lock() {
                if let Err(e) = shared.close_statement(&self.name) {
                    log::warn!("failed to close statement {}: {e}", self.name);
                }
            }
        }
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        self.close();
    }
}
