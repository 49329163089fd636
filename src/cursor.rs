//! Cursor streaming over an open portal.
use std::sync::{Arc, Mutex, Weak};

use crate::{
    connection::Shared,
    error::ErrorKind,
    row::{ColumnIndex, Row},
    statement::StatementName,
    Result,
};

/// Identifies a cursor within its connection; used only for the "implicitly
/// closes the prior cursor" bookkeeping and logging.
pub type CursorId = u64;

/// The sole authority on what the server is expected to send next for the
/// connection's current cursor.
pub(crate) enum CursorState {
    /// No cursor active; the connection is at a `ReadyForQuery` boundary.
    Closed,
    /// The server accepted an `Execute`; rows are being drained. A row may
    /// be buffered ahead so `execute` can surface errors synchronously.
    Open { cursor_id: CursorId, columns: Option<Arc<ColumnIndex>>, buffered_row: Option<Row> },
    /// Command completion or empty-query was observed; no more rows, but
    /// the portal has not yet been closed and synced.
    Drained { cursor_id: CursorId, row_count: Option<u64> },
}

impl CursorState {
    pub(crate) fn cursor_id(&self) -> Option<CursorId> {
        match self {
            CursorState::Closed => None,
            CursorState::Open { cursor_id, .. } | CursorState::Drained { cursor_id, .. } => Some(*cursor_id),
        }
    }
}

/// A single open result-set, streaming rows from the server one at a time.
///
/// At most one cursor per connection is ever "current": opening a new one,
/// or calling any protocol-driving [`Connection`][crate::connection::Connection]
/// method, implicitly closes the prior cursor.
pub struct Cursor {
    pub(crate) connection: Weak<Mutex<Shared>>,
    pub(crate) statement_name: StatementName,
    pub(crate) cursor_id: CursorId,
    pub(crate) row_count: Option<u64>,
    pub(crate) finished: bool,
}

impl Cursor {
    /// Column metadata, if it was requested when this cursor was opened.
    pub fn columns(&self) -> Result<Vec<crate::row::ColumnMetadata>> {
        let shared = self.connection.upgrade().ok_or(ErrorKind::ConnectionClosed)?;
        let shared = shared.lock().unwrap();
        shared
            .cursor_columns(self.cursor_id)
            .map(|idx| idx.columns().to_vec())
            .ok_or_else(|| ErrorKind::ColumnMetadataNotAvailable.into())
    }

    /// Number of rows affected/returned, populated only once the final row
    /// has been observed (i.e. after iteration reaches its end).
    pub fn row_count(&self) -> Option<u64> {
        self.row_count
    }

    /// Pull the next row, or `None` at end of sequence.
    pub fn next_row(&mut self) -> Result<Option<Row>> {
        if self.finished {
            return Ok(None);
        }
        let shared = self.connection.upgrade().ok_or(ErrorKind::ConnectionClosed)?;
        let mut shared = shared.lock().unwrap();
        let row = shared.next_row(self.cursor_id)?;
        match row {
            Some(row) => Ok(Some(row)),
            None => {
                self.finished = true;
                self.row_count = shared.cursor_row_count(self.cursor_id);
                Ok(None)
            }
        }
    }
}

impl Iterator for Cursor {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}
