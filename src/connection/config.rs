//! Connection configuration.
use std::{env::var, time::Duration};

use crate::common::ByteStr;

/// The credential the client is configured to present, and the proof it
/// must be able to produce.
#[derive(Clone, Debug)]
pub enum Credential {
    Trust,
    Cleartext(ByteStr),
    Md5(ByteStr),
    ScramSha256(ByteStr),
}

/// Postgres connection configuration.
///
/// Out of scope for this crate's core: this is a thin value object: no URL
/// scheme dialect, no pooling policy, no TLS certificate configuration
/// beyond the platform default trust store.
#[derive(Clone, Debug)]
pub struct Config {
    pub host: ByteStr,
    pub port: u16,
    pub ssl: bool,
    pub socket_timeout: Option<Duration>,
    pub database: ByteStr,
    pub user: ByteStr,
    pub credential: Credential,
    pub application_name: ByteStr,
}

impl Config {
    pub fn new(host: impl Into<ByteStr>, user: impl Into<ByteStr>) -> Self {
        let user = user.into();
        Self {
            host: host.into(),
            port: 5432,
            ssl: false,
            socket_timeout: None,
            database: user.clone(),
            user,
            credential: Credential::Trust,
            application_name: ByteStr::from_static("pgdirect"),
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn database(mut self, database: impl Into<ByteStr>) -> Self {
        self.database = database.into();
        self
    }

    pub fn ssl(mut self, ssl: bool) -> Self {
        self.ssl = ssl;
        self
    }

    pub fn socket_timeout(mut self, timeout: Duration) -> Self {
        self.socket_timeout = Some(timeout);
        self
    }

    pub fn credential(mut self, credential: Credential) -> Self {
        self.credential = credential;
        self
    }

    pub fn application_name(mut self, name: impl Into<ByteStr>) -> Self {
        self.application_name = name.into();
        self
    }

    /// Read configuration from `PGHOST`/`PGPORT`/`PGUSER`/`PGPASSWORD`/
    /// `PGDATABASE`/`PGSSLMODE`, falling back to libpq-like defaults.
    ///
    /// The credential variant is inferred from whether a password is
    /// present; callers that need `md5` or `scram-sha-256` specifically
    /// (rather than "whatever the server asks for cleartext/md5/scram with
    /// this password") should build a [`Config`] directly instead.
    pub fn from_env() -> Self {
        let host = var("PGHOST").unwrap_or_else(|_| "localhost".into());
        let user = var("PGUSER").unwrap_or_else(|_| "postgres".into());
        let database = var("PGDATABASE").unwrap_or_else(|_| user.clone());
        let port = var("PGPORT").ok().and_then(|p| p.parse().ok()).unwrap_or(5432);
        let ssl = matches!(var("PGSSLMODE").as_deref(), Ok("require") | Ok("verify-ca") | Ok("verify-full"));

        let mut config = Self::new(host, user).port(port).database(database).ssl(ssl);

        if let Ok(password) = var("PGPASSWORD") {
            config = config.credential(Credential::Cleartext(password.into()));
        }

        config
    }
}
