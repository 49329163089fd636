//! `pgdirect` error types.
use std::{backtrace::Backtrace, fmt, io};

use crate::notice::Notice;

/// A specialized [`Result`] type for `pgdirect` operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All possible errors from `pgdirect`.
pub struct Error {
    context: String,
    backtrace: Backtrace,
    kind: ErrorKind,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// Attach a short human-readable context to this error.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }
}

/// All possible error kinds from `pgdirect`.
pub enum ErrorKind {
    // credential mismatch
    CleartextPasswordRequired,
    Md5PasswordRequired,
    ScramSha256Required,
    TrustRequired,
    UnsupportedAuthenticationType(i32),
    InvalidUsernameString,
    InvalidPasswordString,

    // lifecycle
    ConnectionClosed,
    ConnectionPoolClosed,
    StatementClosed,
    CursorClosed,
    ColumnMetadataNotAvailable,

    // pool back-pressure
    TooManyRequestsForConnections,
    TimedOutAcquiringConnection,

    // transport
    Socket(io::Error),
    Ssl(String),
    SslNotSupported,

    // protocol/server
    ServerError(String),
    SqlError(Notice),

    // session constraint
    InvalidParameterValue { name: String, value: String, allowed: Vec<&'static str> },

    // value conversion
    ValueIsNil,
    ValueConversionError { value: String, target_type: &'static str },
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for Error {
            fn from($pat: $ty) -> Self {
                let backtrace = std::backtrace::Backtrace::capture();
                Self { context: String::new(), backtrace, kind: $body }
            }
        }
    };
}

from!(<ErrorKind>e => e);
from!(<io::Error>e => ErrorKind::Socket(e));
from!(<Notice>e => ErrorKind::SqlError(e));

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.context.is_empty() {
            write!(f, "{}: ", self.context)?;
        }

        fmt::Display::fmt(&self.kind, f)?;

        if let std::backtrace::BacktraceStatus::Captured = self.backtrace.status() {
            let mut backtrace = self.backtrace.to_string();
            write!(f, "\n\nStack backtrace:\n")?;
            backtrace.truncate(backtrace.trim_end().len());
            write!(f, "{backtrace}")?;
        }

        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl std::error::Error for ErrorKind {}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CleartextPasswordRequired => f.write_str("server requires a cleartext password"),
            Self::Md5PasswordRequired => f.write_str("server requires an md5 password"),
            Self::ScramSha256Required => f.write_str("server requires SCRAM-SHA-256"),
            Self::TrustRequired => f.write_str("server accepted the connection without a credential"),
            Self::UnsupportedAuthenticationType(tag) => write!(f, "unsupported authentication type: {tag}"),
            Self::InvalidUsernameString => f.write_str("username is not a valid SASL string"),
            Self::InvalidPasswordString => f.write_str("password is not a valid SASL string"),
            Self::ConnectionClosed => f.write_str("connection is closed"),
            Self::ConnectionPoolClosed => f.write_str("connection pool is closed"),
            Self::StatementClosed => f.write_str("statement is closed"),
            Self::CursorClosed => f.write_str("cursor is closed"),
            Self::ColumnMetadataNotAvailable => f.write_str("column metadata was not requested for this cursor"),
            Self::TooManyRequestsForConnections => f.write_str("too many requests for connections"),
            Self::TimedOutAcquiringConnection => f.write_str("timed out acquiring connection"),
            Self::Socket(e) => write!(f, "socket error: {e}"),
            Self::Ssl(e) => write!(f, "ssl error: {e}"),
            Self::SslNotSupported => f.write_str("server does not support ssl"),
            Self::ServerError(e) => write!(f, "protocol error: {e}"),
            Self::SqlError(notice) => write!(f, "{notice}"),
            Self::InvalidParameterValue { name, value, allowed } => {
                write!(f, "invalid value {value:?} for parameter {name:?}, allowed: {allowed:?}")
            }
            Self::ValueIsNil => f.write_str("value is SQL NULL"),
            Self::ValueConversionError { value, target_type } => {
                write!(f, "cannot convert {value:?} into {target_type}")
            }
        }
    }
}

impl fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

/// Shorthand to build an [`Error`] directly from an [`ErrorKind`].
pub(crate) fn err<T>(kind: ErrorKind) -> Result<T> {
    Err(kind.into())
}
