//! Postgres `ErrorResponse`/`NoticeResponse` field parsing.
use std::fmt;

use crate::common::ByteStr;

/// A map from a single-byte field tag to a UTF-8 string, as carried by
/// `ErrorResponse` and `NoticeResponse`.
///
/// <https://www.postgresql.org/docs/current/protocol-error-fields.html>
#[derive(Debug, Clone)]
pub struct Notice {
    fields: Vec<(u8, ByteStr)>,
}

macro_rules! accessor {
    ($name:ident, $tag:literal) => {
        pub fn $name(&self) -> Option<&str> {
            self.field($tag)
        }
    };
}

impl Notice {
    pub(crate) fn new(fields: Vec<(u8, ByteStr)>) -> Self {
        Self { fields }
    }

    fn field(&self, tag: u8) -> Option<&str> {
        self.fields.iter().find(|(t, _)| *t == tag).map(|(_, v)| v.as_str())
    }

    accessor!(severity, b'S');
    accessor!(code, b'C');
    accessor!(message, b'M');
    accessor!(detail, b'D');
    accessor!(hint, b'H');
    accessor!(position, b'P');
    accessor!(internal_position, b'p');
    accessor!(internal_query, b'q');
    accessor!(context, b'W');
    accessor!(schema, b's');
    accessor!(table, b't');
    accessor!(column, b'c');
    accessor!(data_type, b'd');
    accessor!(constraint, b'n');
    accessor!(file, b'F');
    accessor!(line, b'L');
    accessor!(routine, b'R');
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            self.severity().unwrap_or("ERROR"),
            self.message().unwrap_or("(no message)"),
        )?;
        if let Some(code) = self.code() {
            write!(f, " ({code})")?;
        }
        if let Some(detail) = self.detail() {
            write!(f, "\nDETAIL: {detail}")?;
        }
        if let Some(hint) = self.hint() {
            write!(f, "\nHINT: {hint}")?;
        }
        Ok(())
    }
}
