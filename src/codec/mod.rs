//! Big-endian integer and null-terminated UTF-8 codec over a buffered,
//! blocking socket.
//!
//! All reads are synchronous: a short read refills the internal buffer with
//! exactly one `Read::read` call on the underlying socket. A zero-length
//! socket read is reported as [`ErrorKind::ServerError`][crate::error::ErrorKind::ServerError]
//! ("no data available from server"), matching the behavior of a server that
//! closed its end of the connection mid-message.
pub(crate) mod framing;

pub use framing::{Request, ResponseBody};

use bytes::{Buf, BytesMut};
use std::io::{Read, Write};

use crate::{common::ByteStr, error::ErrorKind, Result};

const DEFAULT_BUF_CAPACITY: usize = 8 * 1024;

/// Buffered reader/writer around a blocking socket.
///
/// The read buffer refills on demand; the write buffer is only flushed to
/// the socket with a single [`Write::write_all`] call in [`Codec::flush`].
pub struct Codec<S> {
    socket: S,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

impl<S: Read + Write> Codec<S> {
    pub fn new(socket: S) -> Self {
        Self {
            socket,
            read_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
            write_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.socket
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.socket
    }

    /// Ensure at least `n` bytes are available in the read buffer, refilling
    /// it from the socket (a single `read` at a time) as needed.
    fn fill(&mut self, n: usize) -> Result<()> {
        while self.read_buf.len() < n {
            let mut scratch = [0u8; DEFAULT_BUF_CAPACITY];
            let read = self.socket.read(&mut scratch)?;
            if read == 0 {
                return Err(ErrorKind::ServerError("no data available from server".into()).into());
            }
            self.read_buf.extend_from_slice(&scratch[..read]);
        }
        Ok(())
    }

    pub fn peek_u8(&mut self) -> Result<u8> {
        self.fill(1)?;
        Ok(self.read_buf[0])
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.fill(1)?;
        Ok(self.read_buf.get_u8())
    }

    pub fn read_ascii_char(&mut self) -> Result<char> {
        Ok(self.read_u8()? as char)
    }

    pub fn read_u16_be(&mut self) -> Result<u16> {
        self.fill(2)?;
        Ok(self.read_buf.get_u16())
    }

    pub fn read_u32_be(&mut self) -> Result<u32> {
        self.fill(4)?;
        Ok(self.read_buf.get_u32())
    }

    pub fn read_exact(&mut self, n: usize) -> Result<bytes::Bytes> {
        self.fill(n)?;
        Ok(self.read_buf.split_to(n).freeze())
    }

    pub fn read_utf8(&mut self, n: usize) -> Result<ByteStr> {
        let bytes = self.read_exact(n)?;
        ByteStr::from_utf8(bytes).map_err(|_| ErrorKind::ServerError("invalid utf8".into()).into())
    }

    /// Read up to and consuming a zero byte, returning everything before it.
    pub fn read_cstring_utf8(&mut self) -> Result<ByteStr> {
        let mut idx = 0;
        loop {
            self.fill(idx + 1)?;
            if self.read_buf[idx] == 0 {
                break;
            }
            idx += 1;
        }
        let bytes = self.read_buf.split_to(idx).freeze();
        self.read_buf.advance(1); // consume the nul
        ByteStr::from_utf8(bytes).map_err(|_| ErrorKind::ServerError("invalid utf8".into()).into())
    }

    /// Queue a [`Request`] into the write buffer. Call [`Codec::flush`] to
    /// actually write it to the socket.
    pub fn write_request(&mut self, request: Request<'_>) {
        request.encode(&mut self.write_buf);
    }

    /// Write the whole pending write buffer to the socket in a single call.
    pub fn flush(&mut self) -> Result<()> {
        self.socket.write_all(&self.write_buf)?;
        self.write_buf.clear();
        Ok(())
    }
}

impl<S> std::fmt::Debug for Codec<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec")
            .field("buffered", &self.read_buf.len())
            .field("pending_write", &self.write_buf.len())
            .finish()
    }
}
