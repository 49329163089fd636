//! Request/response message framing.
//!
//! A [`Request`] is `(tag: Option<ascii>, body: bytes)`. On the wire: the tag
//! byte (if any), then `u32_be(body.len() + 4)`, then the body — the length
//! field counts itself but not the tag.
//!
//! A response is framed `{tag: ascii, length: u32_be}` followed by
//! `length - 4` bytes. [`ResponseBody`] tracks bytes remaining and refuses
//! reads that would overrun; the codec requires every response body to be
//! fully consumed (no more, no less) before the next frame is read.
use bytes::{BufMut, BytesMut};
use std::io::{Read, Write};

use crate::{codec::Codec, common::ByteStr, error::ErrorKind, Result};

/// A typed request: an optional one-byte tag plus an already-encoded body.
pub struct Request<'a> {
    tag: Option<u8>,
    body: &'a [u8],
}

impl<'a> Request<'a> {
    pub fn new(tag: Option<u8>, body: &'a [u8]) -> Self {
        Self { tag, body }
    }

    pub(crate) fn encode(&self, out: &mut BytesMut) {
        if let Some(tag) = self.tag {
            out.put_u8(tag);
        }
        out.put_u32(self.body.len() as u32 + 4);
        out.put_slice(self.body);
    }
}

/// The header of a response frame: its ascii tag and declared length
/// (including the 4 bytes of the length field itself).
#[derive(Debug, Clone, Copy)]
pub struct ResponseHeader {
    pub tag: u8,
    pub len: u32,
}

pub(crate) fn read_response_header<S: Read + Write>(codec: &mut Codec<S>) -> Result<ResponseHeader> {
    let tag = codec.read_u8()?;
    let len = codec.read_u32_be()?;
    Ok(ResponseHeader { tag, len })
}

/// A handle over the bytes of one response body, refusing to read beyond
/// (or leave unread) the declared length.
pub struct ResponseBody<'c, S> {
    codec: &'c mut Codec<S>,
    remaining: usize,
}

impl<'c, S: Read + Write> ResponseBody<'c, S> {
    pub(crate) fn new(codec: &'c mut Codec<S>, header: ResponseHeader) -> Self {
        Self { codec, remaining: header.len as usize - 4 }
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    fn take(&mut self, n: usize) -> Result<()> {
        if n > self.remaining {
            return Err(ErrorKind::ServerError("response body too short".into()).into());
        }
        self.remaining -= n;
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.take(1)?;
        self.codec.read_u8()
    }

    pub fn read_ascii_char(&mut self) -> Result<char> {
        Ok(self.read_u8()? as char)
    }

    pub fn read_u16_be(&mut self) -> Result<u16> {
        self.take(2)?;
        self.codec.read_u16_be()
    }

    pub fn read_u32_be(&mut self) -> Result<u32> {
        self.take(4)?;
        self.codec.read_u32_be()
    }

    pub fn read_exact(&mut self, n: usize) -> Result<bytes::Bytes> {
        self.take(n)?;
        self.codec.read_exact(n)
    }

    pub fn read_utf8(&mut self, n: usize) -> Result<ByteStr> {
        self.take(n)?;
        self.codec.read_utf8(n)
    }

    pub fn read_cstring_utf8(&mut self) -> Result<ByteStr> {
        // the nul-terminated string's length is not known up front, so the
        // bound is enforced after the read instead of before it
        let s = self.codec.read_cstring_utf8()?;
        self.take(s.len() + 1)?;
        Ok(s)
    }

    /// Assert the whole declared body has been consumed, neither more nor
    /// less. Called by the receive loop after decoding a typed response.
    pub fn finish(self) -> Result<()> {
        if self.remaining != 0 {
            return Err(ErrorKind::ServerError("response body too long".into()).into());
        }
        Ok(())
    }
}
