//! Connection lifecycle and the extended-query state machine.
//!
//! The connection is strictly single-threaded: every public method blocks
//! on the socket until it completes, and exactly one logical operation is
//! in flight at a time. [`CursorState`] is the sole authority on what the
//! server is expected to send next.
pub mod config;

use std::net::TcpStream;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub use config::{Config, Credential};

use crate::{
    codec::Codec,
    crypto::{self, scram::ScramSha256},
    cursor::{Cursor, CursorId, CursorState},
    delegate::Delegate,
    error::{Error, ErrorKind},
    message::{backend, backend::Backend, frontend},
    params,
    row::{ColumnIndex, Row},
    statement::{Statement, StatementName},
    tls,
    Result,
};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(0);

fn next_connection_id() -> u64 {
    NEXT_CONNECTION_ID.fetch_add(1, Ordering::SeqCst)
}

fn unexpected_message(message: Backend) -> Error {
    ErrorKind::ServerError(format!("unexpected message: {message:?}")).into()
}

/// Parse the row count from a `CommandComplete` tag: `"INSERT oid n"`,
/// `"UPDATE n"`, `"DELETE n"`, `"SELECT n"`, `"MOVE n"`, `"FETCH n"`,
/// `"COPY n"`. Commands without a row count (`"BEGIN"`, `"CREATE TABLE"`, …)
/// yield `None`.
fn parse_command_tag(tag: &str) -> Option<u64> {
    let mut parts = tag.split_whitespace();
    match parts.next()? {
        "INSERT" | "UPDATE" | "DELETE" | "SELECT" | "MOVE" | "FETCH" | "COPY" => {
            parts.last().and_then(|n| n.parse().ok())
        }
        _ => None,
    }
}

/// Mutable connection state, shared between the [`Connection`] handle and
/// every [`Statement`]/[`Cursor`] it has produced via a weak back-reference.
/// No component reaches "upward" for lifetime: a `Statement` holds a `Weak`
/// pointer here rather than the connection holding strong references to its
/// statements.
pub(crate) struct Shared {
    codec: Codec<tls::Socket>,
    cursor_state: CursorState,
    delegate: Option<Arc<dyn Delegate>>,
    id: u64,
    closed: bool,
    transaction_status: backend::TransactionStatus,
    stmt_counter: AtomicU32,
    cursor_counter: u64,
    last_cursor_id: Option<CursorId>,
    last_cursor_columns: Option<Arc<ColumnIndex>>,
    last_cursor_row_count: Option<u64>,
    scram: Option<ScramSha256>,
}

impl Shared {
    // -- asynchronous message delegation -----------------------------------

    fn notify_notice(&self, notice: &crate::notice::Notice) {
        if let Some(d) = &self.delegate {
            d.on_notice(notice);
        }
    }

    fn notify_notification(&self, n: &backend::NotificationResponse) {
        if let Some(d) = &self.delegate {
            d.on_notification(n.process_id, n.channel.as_str(), n.payload.as_str());
        }
    }

    fn notify_parameter_status(&self, name: &str, value: &str) {
        if let Some(d) = &self.delegate {
            d.on_parameter_status(name, value);
        }
    }

    /// Enforce the parameter policy (§4.6); closes the connection on a
    /// disallowed value change.
    fn handle_parameter_status(&mut self, ps: backend::ParameterStatus) -> Result<()> {
        self.notify_parameter_status(ps.name.as_str(), ps.value.as_str());
        if let Some(allowed) = params::allowed_values(ps.name.as_str()) {
            if !allowed.contains(&ps.value.as_str()) {
                self.force_close();
                return Err(ErrorKind::InvalidParameterValue {
                    name: ps.name.to_string(),
                    value: ps.value.to_string(),
                    allowed: allowed.to_vec(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Read one response frame, transparently handling asynchronous/
    /// informational messages (§4.5). `ErrorResponse` raises immediately;
    /// everything else not swallowed here is returned for the caller to
    /// match against the type it expects.
    fn receive(&mut self) -> Result<Backend> {
        loop {
            match self.codec.recv()? {
                Backend::BackendKeyData(_) => continue,
                Backend::NoticeResponse(n) => {
                    self.notify_notice(&n);
                    continue;
                }
                Backend::NotificationResponse(n) => {
                    self.notify_notification(&n);
                    continue;
                }
                Backend::ParameterStatus(ps) => {
                    self.handle_parameter_status(ps)?;
                    continue;
                }
                Backend::ErrorResponse(notice) => return Err(ErrorKind::SqlError(notice).into()),
                other => return Ok(other),
            }
        }
    }

    // -- startup and authentication (§4.2) ----------------------------------

    fn startup(&mut self, config: &Config) -> Result<()> {
        let params = [
            ("user", config.user.as_str()),
            ("database", config.database.as_str()),
            ("application_name", config.application_name.as_str()),
            ("client_encoding", "UTF8"),
            ("DateStyle", "ISO, MDY"),
            ("TimeZone", "GMT"),
            ("bytea_output", "hex"),
        ];
        self.codec.send(&frontend::Startup { params: &params });
        self.codec.flush()?;

        loop {
            let auth = match self.receive()? {
                Backend::Authentication(auth) => auth,
                other => return Err(unexpected_message(other)),
            };
            match auth {
                backend::Authentication::Ok => break,
                backend::Authentication::CleartextPassword => {
                    let password = match &config.credential {
                        Credential::Cleartext(p) => p.clone(),
                        Credential::Trust => return Err(ErrorKind::TrustRequired.into()),
                        _ => return Err(ErrorKind::CleartextPasswordRequired.into()),
                    };
                    self.codec.send(&frontend::PasswordMessage { password: password.as_str() });
                    self.codec.flush()?;
                }
                backend::Authentication::Md5Password { salt } => {
                    let password = match &config.credential {
                        Credential::Md5(p) => p.clone(),
                        Credential::Trust => return Err(ErrorKind::TrustRequired.into()),
                        _ => return Err(ErrorKind::Md5PasswordRequired.into()),
                    };
                    let hashed = crypto::md5_password(config.user.as_str(), password.as_str(), salt);
                    self.codec.send(&frontend::PasswordMessage { password: hashed.as_str() });
                    self.codec.flush()?;
                }
                backend::Authentication::Sasl { mechanisms } => {
                    let password = match &config.credential {
                        Credential::ScramSha256(p) => p.clone(),
                        Credential::Trust => return Err(ErrorKind::TrustRequired.into()),
                        _ => return Err(ErrorKind::ScramSha256Required.into()),
                    };
                    if !mechanisms.iter().any(|m| m.as_str() == "SCRAM-SHA-256") {
                        return Err(ErrorKind::ScramSha256Required.into());
                    }
                    let mut scram = ScramSha256::new();
                    let client_first = scram.client_first(&config.user, &password, None)?;
                    self.codec.send(&frontend::SaslInitialResponse {
                        mechanism: "SCRAM-SHA-256",
                        data: client_first.as_bytes(),
                    });
                    self.codec.flush()?;
                    self.scram = Some(scram);
                }
                backend::Authentication::SaslContinue { data } => {
                    let mut scram = self
                        .scram
                        .take()
                        .ok_or_else(|| ErrorKind::ServerError("SASLContinue without a pending exchange".into()))?;
                    let server_first = std::str::from_utf8(&data)
                        .map_err(|_| ErrorKind::ServerError("malformed SASL message (not utf8)".into()))?;
                    let client_final = scram.client_final(server_first)?;
                    self.codec.send(&frontend::SaslResponse { data: client_final.as_bytes() });
                    self.codec.flush()?;
                    self.scram = Some(scram);
                }
                backend::Authentication::SaslFinal { data } => {
                    let mut scram = self
                        .scram
                        .take()
                        .ok_or_else(|| ErrorKind::ServerError("SASLFinal without a pending exchange".into()))?;
                    let server_final = std::str::from_utf8(&data)
                        .map_err(|_| ErrorKind::ServerError("malformed SASL message (not utf8)".into()))?;
                    scram.verify_server_final(server_final)?;
                }
                backend::Authentication::Unknown(tag) => {
                    return Err(ErrorKind::UnsupportedAuthenticationType(tag).into())
                }
            }
        }

        match self.receive()? {
            Backend::ReadyForQuery(r) => {
                self.transaction_status = r.0;
                Ok(())
            }
            other => Err(unexpected_message(other)),
        }
    }

    // -- the extended-query envelope (§4.3) ---------------------------------

    fn resync(&mut self) -> Result<()> {
        self.codec.send(&frontend::Sync);
        self.codec.flush()?;
        loop {
            match self.codec.recv()? {
                Backend::ReadyForQuery(r) => {
                    self.transaction_status = r.0;
                    self.cursor_state = CursorState::Closed;
                    return Ok(());
                }
                Backend::NoticeResponse(n) => self.notify_notice(&n),
                Backend::NotificationResponse(n) => self.notify_notification(&n),
                Backend::ParameterStatus(ps) => {
                    let _ = self.handle_parameter_status(ps);
                }
                _ => {}
            }
        }
    }

    fn resync_or_close(&mut self) {
        if self.resync().is_err() {
            self.force_close();
        }
    }

    /// Runs `op`, first draining any cursor left open by a prior operation
    /// (implicit close). On any error, attempts resynchronization (or
    /// closes the connection if that fails) before propagating.
    fn envelope<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if let Err(e) = self.drain_current_cursor() {
            self.resync_or_close();
            return Err(e);
        }
        if self.closed {
            return Err(ErrorKind::ConnectionClosed.into());
        }
        match op(self) {
            Ok(v) => Ok(v),
            Err(e) => {
                self.resync_or_close();
                Err(e)
            }
        }
    }

    /// Like [`Shared::envelope`] but does not drain a prior cursor first —
    /// used by `next_row`, which drives the *current* cursor rather than
    /// implicitly closing it.
    fn envelope_no_drain<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.closed {
            return Err(ErrorKind::ConnectionClosed.into());
        }
        match op(self) {
            Ok(v) => Ok(v),
            Err(e) => {
                self.resync_or_close();
                Err(e)
            }
        }
    }

    fn drain_current_cursor(&mut self) -> Result<()> {
        loop {
            match &self.cursor_state {
                CursorState::Closed => return Ok(()),
                CursorState::Open { .. } => {
                    self.pump_cursor()?;
                }
                CursorState::Drained { .. } => break,
            }
        }
        self.close_portal_and_sync()
    }

    fn close_portal_and_sync(&mut self) -> Result<()> {
        self.codec.send(&frontend::ClosePortal { portal: "" });
        self.codec.send(&frontend::Flush);
        self.codec.flush()?;
        match self.receive()? {
            Backend::CloseComplete => {}
            other => return Err(unexpected_message(other)),
        }
        self.codec.send(&frontend::Sync);
        self.codec.flush()?;
        match self.receive()? {
            Backend::ReadyForQuery(r) => self.transaction_status = r.0,
            other => return Err(unexpected_message(other)),
        }
        self.cursor_state = CursorState::Closed;
        Ok(())
    }

    // -- cursor iteration (§4.4, the heart) ---------------------------------

    fn pump_cursor(&mut self) -> Result<Option<Row>> {
        match std::mem::replace(&mut self.cursor_state, CursorState::Closed) {
            CursorState::Closed => Err(ErrorKind::CursorClosed.into()),
            CursorState::Drained { cursor_id, row_count } => {
                self.cursor_state = CursorState::Drained { cursor_id, row_count };
                Ok(None)
            }
            CursorState::Open { cursor_id, columns, buffered_row: Some(row) } => {
                self.cursor_state = CursorState::Open { cursor_id, columns, buffered_row: None };
                Ok(Some(row))
            }
            CursorState::Open { cursor_id, columns, buffered_row: None } => match self.receive()? {
                Backend::EmptyQuery => {
                    self.cursor_state = CursorState::Drained { cursor_id, row_count: Some(0) };
                    self.last_cursor_row_count = Some(0);
                    Ok(None)
                }
                Backend::CommandComplete(tag) => {
                    let row_count = parse_command_tag(tag.0.as_str());
                    self.cursor_state = CursorState::Drained { cursor_id, row_count };
                    self.last_cursor_row_count = row_count;
                    Ok(None)
                }
                Backend::DataRow(columns_data) => {
                    self.cursor_state = CursorState::Open { cursor_id, columns: columns.clone(), buffered_row: None };
                    Ok(Some(Row::new(columns_data.0, columns)))
                }
                other => Err(unexpected_message(other)),
            },
        }
    }

    pub(crate) fn next_row(&mut self, cursor_id: CursorId) -> Result<Option<Row>> {
        if self.cursor_state.cursor_id() != Some(cursor_id) {
            return Err(ErrorKind::CursorClosed.into());
        }
        self.envelope_no_drain(|shared| {
            let row = shared.pump_cursor()?;
            if row.is_none() && matches!(shared.cursor_state, CursorState::Drained { .. }) {
                shared.close_portal_and_sync()?;
            }
            Ok(row)
        })
    }

    pub(crate) fn cursor_columns(&self, cursor_id: CursorId) -> Option<Arc<ColumnIndex>> {
        (self.last_cursor_id == Some(cursor_id)).then(|| self.last_cursor_columns.clone()).flatten()
    }

    pub(crate) fn cursor_row_count(&self, cursor_id: CursorId) -> Option<u64> {
        (self.last_cursor_id == Some(cursor_id)).then_some(self.last_cursor_row_count).flatten()
    }

    // -- prepare / execute / close statement (§4.3) -------------------------

    fn prepare(&mut self, sql: &str) -> Result<StatementName> {
        self.envelope(|shared| {
            let name = StatementName::next(&shared.stmt_counter);
            shared.codec.send(&frontend::Parse { name: name.as_str(), sql });
            shared.codec.send(&frontend::Flush);
            shared.codec.flush()?;
            match shared.receive()? {
                Backend::ParseComplete => Ok(name),
                other => Err(unexpected_message(other)),
            }
        })
    }

    fn execute(
        &mut self,
        stmt_name: &StatementName,
        params: &[Option<&[u8]>],
        retrieve_column_metadata: bool,
    ) -> Result<CursorId> {
        self.envelope(|shared| {
            shared.codec.send(&frontend::Bind { portal: "", statement: stmt_name.as_str(), params });
            shared.codec.send(&frontend::Flush);
            shared.codec.flush()?;
            match shared.receive()? {
                Backend::BindComplete => {}
                other => return Err(unexpected_message(other)),
            }

            let columns = if retrieve_column_metadata {
                shared.codec.send(&frontend::DescribePortal { portal: "" });
                shared.codec.send(&frontend::Flush);
                shared.codec.flush()?;
                match shared.receive()? {
                    Backend::RowDescription(rd) => Some(ColumnIndex::new(rd.0)),
                    Backend::NoData => None,
                    other => return Err(unexpected_message(other)),
                }
            } else {
                None
            };

            shared.codec.send(&frontend::Execute { portal: "", max_rows: 0 });
            shared.codec.send(&frontend::Flush);
            shared.codec.flush()?;

            shared.cursor_counter += 1;
            let cursor_id = shared.cursor_counter;
            shared.cursor_state = CursorState::Open { cursor_id, columns: columns.clone(), buffered_row: None };
            shared.last_cursor_id = Some(cursor_id);
            shared.last_cursor_columns = columns;
            shared.last_cursor_row_count = None;

            // Pre-fetch the first row so execution errors (e.g. constraint
            // violations evaluated during Execute) surface here rather than
            // on the caller's first iteration (spec §4.4 rationale).
            if let Some(row) = shared.pump_cursor()? {
                if let CursorState::Open { buffered_row, .. } = &mut shared.cursor_state {
                    *buffered_row = Some(row);
                }
            } else if matches!(shared.cursor_state, CursorState::Drained { .. }) {
                shared.close_portal_and_sync()?;
            }

            Ok(cursor_id)
        })
    }

    pub(crate) fn close_statement(&mut self, name: &StatementName) -> Result<()> {
        self.envelope(|shared| {
            shared.codec.send(&frontend::CloseStatement { name: name.as_str() });
            shared.codec.send(&frontend::Flush);
            shared.codec.flush()?;
            match shared.receive()? {
                Backend::CloseComplete => Ok(()),
                other => Err(unexpected_message(other)),
            }
        })
    }

    fn force_close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.cursor_state = CursorState::Closed;
        self.codec.send(&frontend::Terminate);
        let _ = self.codec.flush();
    }
}

/// A live connection to a Postgres server, driving the v3 wire protocol
/// over a blocking TCP (optionally TLS) socket.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Mutex<Shared>>,
}

impl Connection {
    /// Open a TCP (optionally TLS) socket, and complete startup,
    /// authentication, and parameter setup synchronously.
    pub fn connect(config: &Config) -> Result<Self> {
        Self::connect_with_delegate(config, None)
    }

    pub fn connect_with_delegate(config: &Config, delegate: Option<Arc<dyn Delegate>>) -> Result<Self> {
        let stream = TcpStream::connect((config.host.as_str(), config.port))?;
        stream.set_nodelay(true).ok();
        if let Some(timeout) = config.socket_timeout {
            stream.set_read_timeout(Some(timeout))?;
            stream.set_write_timeout(Some(timeout))?;
        }

        let socket = if config.ssl {
            tls::negotiate(stream, config.host.as_str())?
        } else {
            tls::Socket::Plain(stream)
        };

        let mut shared = Shared {
            codec: Codec::new(socket),
            cursor_state: CursorState::Closed,
            delegate,
            id: next_connection_id(),
            closed: false,
            transaction_status: backend::TransactionStatus::Idle,
            stmt_counter: AtomicU32::new(0),
            cursor_counter: 0,
            last_cursor_id: None,
            last_cursor_columns: None,
            last_cursor_row_count: None,
            scram: None,
        };

        shared.startup(config)?;

        Ok(Self { shared: Arc::new(Mutex::new(shared)) })
    }

    /// Library-wide monotonic connection identifier, used for logging and
    /// pool entry identity.
    pub fn id(&self) -> u64 {
        self.shared.lock().unwrap().id
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().unwrap().closed
    }

    pub fn transaction_status(&self) -> backend::TransactionStatus {
        self.shared.lock().unwrap().transaction_status
    }

    /// Close the socket, transition to `Closed`, and send a best-effort
    /// `Terminate`. Idempotent.
    pub fn close(&self) {
        self.shared.lock().unwrap().force_close();
    }

    /// Prepare a SQL statement; the server-side prepared-statement name
    /// equals this handle's name.
    pub fn prepare(&self, sql: &str) -> Result<Statement> {
        let mut shared = self.shared.lock().unwrap();
        let name = shared.prepare(sql)?;
        Ok(Statement {
            connection: Arc::downgrade(&self.shared),
            name,
            sql: Arc::from(sql),
            closed: false,
        })
    }

    fn run_to_completion(&self, sql: &str) -> Result<()> {
        let mut stmt = self.prepare(sql)?;
        let mut cursor = stmt.execute(&[], false)?;
        while cursor.next_row()?.is_some() {}
        stmt.close();
        Ok(())
    }

    /// Implemented, like any other statement, by preparing and executing
    /// the literal SQL command through the extended-query path — this
    /// library never uses the Simple Query (`'Q'`) message.
    pub fn begin_transaction(&self) -> Result<()> {
        self.run_to_completion("BEGIN")
    }

    pub fn commit_transaction(&self) -> Result<()> {
        self.run_to_completion("COMMIT")
    }

    pub fn rollback_transaction(&self) -> Result<()> {
        self.run_to_completion("ROLLBACK")
    }
}

impl Statement {
    /// Bind `params` (already text-encoded, `None` for SQL NULL) and
    /// execute, returning a streaming [`Cursor`].
    pub fn execute(&self, params: &[Option<&[u8]>], retrieve_column_metadata: bool) -> Result<Cursor> {
        if self.closed {
            return Err(ErrorKind::StatementClosed.into());
        }
        let shared = self.connection.upgrade().ok_or(ErrorKind::ConnectionClosed)?;
        let cursor_id = {
            let mut shared = shared.lock().unwrap();
            shared.execute(&self.name, params, retrieve_column_metadata)?
        };
        Ok(Cursor {
            connection: self.connection.clone(),
            statement_name: self.name.clone(),
            cursor_id,
            row_count: None,
            finished: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::parse_command_tag;

    #[test]
    fn parses_row_count_from_dml_tags() {
        assert_eq!(parse_command_tag("INSERT 0 7"), Some(7));
        assert_eq!(parse_command_tag("UPDATE 3"), Some(3));
        assert_eq!(parse_command_tag("DELETE 0"), Some(0));
        assert_eq!(parse_command_tag("SELECT 1"), Some(1));
        assert_eq!(parse_command_tag("MOVE 2"), Some(2));
        assert_eq!(parse_command_tag("FETCH 5"), Some(5));
        assert_eq!(parse_command_tag("COPY 42"), Some(42));
    }

    #[test]
    fn commands_without_a_row_count_yield_none() {
        assert_eq!(parse_command_tag("BEGIN"), None);
        assert_eq!(parse_command_tag("COMMIT"), None);
        assert_eq!(parse_command_tag("ROLLBACK"), None);
        assert_eq!(parse_command_tag("CREATE TABLE"), None);
    }

    #[test]
    fn malformed_tag_yields_none() {
        assert_eq!(parse_command_tag("SELECT not-a-number"), None);
        assert_eq!(parse_command_tag(""), None);
    }
}
