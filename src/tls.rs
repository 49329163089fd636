//! Optional TLS upgrade of the raw TCP socket.
//!
//! Gated by sending the 8-byte `SSLRequest` and reading one ASCII byte of
//! server response, proceeding only on `'S'`.
use bytes::{BufMut, BytesMut};
use std::io::{self, Read, Write};
use std::net::TcpStream;

use crate::error::ErrorKind;
use crate::message::SSL_REQUEST_CODE;
use crate::Result;

/// Either a plain TCP socket, or one wrapped in a TLS session.
pub enum Socket {
    Plain(TcpStream),
    #[cfg(feature = "tls")]
    Tls(Box<native_tls::TlsStream<TcpStream>>),
}

impl Read for Socket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Socket::Plain(s) => s.read(buf),
            #[cfg(feature = "tls")]
            Socket::Tls(s) => s.read(buf),
        }
    }
}

impl Write for Socket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Socket::Plain(s) => s.write(buf),
            #[cfg(feature = "tls")]
            Socket::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Socket::Plain(s) => s.flush(),
            #[cfg(feature = "tls")]
            Socket::Tls(s) => s.flush(),
        }
    }
}

/// Perform the `SSLRequest` handshake and, if accepted, wrap `stream` in a
/// TLS session. Fails with [`ErrorKind::SslNotSupported`] if the server
/// declines.
pub fn negotiate(mut stream: TcpStream, host: &str) -> Result<Socket> {
    let mut body = BytesMut::with_capacity(8);
    body.put_u32(8);
    body.put_u32(SSL_REQUEST_CODE);
    stream.write_all(&body)?;

    let mut response = [0u8; 1];
    stream.read_exact(&mut response)?;
    if response[0] != b'S' {
        return Err(ErrorKind::SslNotSupported.into());
    }

    #[cfg(feature = "tls")]
    {
        let connector = native_tls::TlsConnector::new().map_err(|e| ErrorKind::Ssl(e.to_string()))?;
        let tls = connector
            .connect(host, stream)
            .map_err(|e| ErrorKind::Ssl(e.to_string()))?;
        Ok(Socket::Tls(Box::new(tls)))
    }

    #[cfg(not(feature = "tls"))]
    {
        let _ = host;
        Err(ErrorKind::Ssl("client built without the \"tls\" feature".into()).into())
    }
}
