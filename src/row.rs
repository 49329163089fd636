//! Decoded rows and their column metadata.
use bytes::Bytes;
use std::sync::Arc;

use crate::common::ByteStr;

/// Column description from a `RowDescription` message.
#[derive(Debug, Clone)]
pub struct ColumnMetadata {
    pub name: ByteStr,
    pub table_oid: u32,
    pub attr_number: u16,
    pub type_oid: u32,
    pub type_size: i16,
    pub type_modifier: i32,
}

/// Resolves a column name to its index within a row, shared by every [`Row`]
/// produced from the same [`Cursor`][crate::cursor::Cursor].
#[derive(Debug)]
pub struct ColumnIndex {
    columns: Vec<ColumnMetadata>,
}

impl ColumnIndex {
    pub(crate) fn new(columns: Vec<ColumnMetadata>) -> Arc<Self> {
        Arc::new(Self { columns })
    }

    pub fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name.as_str() == name)
    }
}

/// A single nullable, raw text-format column value.
#[derive(Debug, Clone)]
pub struct Value(pub(crate) Option<Bytes>);

impl Value {
    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    /// The raw text-format bytes, or `None` for SQL NULL.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        self.0.as_deref()
    }

    /// The raw value decoded as UTF-8 text, or `None` for SQL NULL.
    ///
    /// Postgres always returns text-format values as valid UTF-8 under
    /// `client_encoding = UTF8`, which this client enforces (see the
    /// parameter policy).
    pub fn as_text(&self) -> Option<&str> {
        self.0.as_deref().map(|b| std::str::from_utf8(b).expect("client_encoding is UTF8"))
    }
}

/// An ordered sequence of column values from one `DataRow`.
#[derive(Debug, Clone)]
pub struct Row {
    values: Vec<Value>,
    columns: Option<Arc<ColumnIndex>>,
}

impl Row {
    pub(crate) fn new(values: Vec<Option<Bytes>>, columns: Option<Arc<ColumnIndex>>) -> Self {
        Self { values: values.into_iter().map(Value).collect(), columns }
    }

    pub fn columns(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Look up a value by column name. Requires that column metadata was
    /// requested when the cursor was opened.
    pub fn get_named(&self, name: &str) -> Option<&Value> {
        let idx = self.columns.as_ref()?.index_of(name)?;
        self.values.get(idx)
    }

    /// The column metadata resolver attached to this row, if column
    /// metadata was requested when the cursor was opened.
    pub fn column_index(&self) -> Option<&ColumnIndex> {
        self.columns.as_deref()
    }
}
