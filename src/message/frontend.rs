//! Frontend (client-to-server) message bodies.
use bytes::{BufMut, BytesMut};

use super::{FrontendMessage, PROTOCOL_VERSION, SSL_REQUEST_CODE};

fn put_cstr(out: &mut BytesMut, s: &str) {
    out.put_slice(s.as_bytes());
    out.put_u8(0);
}

/// `SSLRequest`: untagged, fixed 8-byte body.
pub struct SslRequest;

impl FrontendMessage for SslRequest {
    const TAG: Option<u8> = None;

    fn body(&self, out: &mut BytesMut) {
        out.put_u32(SSL_REQUEST_CODE);
    }
}

/// `StartupMessage`: untagged, protocol version followed by nul-terminated
/// `key, value` parameter pairs and a terminal zero byte.
pub struct Startup<'a> {
    pub params: &'a [(&'a str, &'a str)],
}

impl FrontendMessage for Startup<'_> {
    const TAG: Option<u8> = None;

    fn body(&self, out: &mut BytesMut) {
        out.put_u32(PROTOCOL_VERSION);
        for (key, value) in self.params {
            put_cstr(out, key);
            put_cstr(out, value);
        }
        out.put_u8(0);
    }
}

pub struct PasswordMessage<'a> {
    pub password: &'a str,
}

impl FrontendMessage for PasswordMessage<'_> {
    const TAG: Option<u8> = Some(b'p');

    fn body(&self, out: &mut BytesMut) {
        put_cstr(out, self.password);
    }
}

pub struct SaslInitialResponse<'a> {
    pub mechanism: &'a str,
    pub data: &'a [u8],
}

impl FrontendMessage for SaslInitialResponse<'_> {
    const TAG: Option<u8> = Some(b'p');

    fn body(&self, out: &mut BytesMut) {
        put_cstr(out, self.mechanism);
        out.put_u32(self.data.len() as u32);
        out.put_slice(self.data);
    }
}

pub struct SaslResponse<'a> {
    pub data: &'a [u8],
}

impl FrontendMessage for SaslResponse<'_> {
    const TAG: Option<u8> = Some(b'p');

    fn body(&self, out: &mut BytesMut) {
        out.put_slice(self.data);
    }
}

pub struct Parse<'a> {
    pub name: &'a str,
    pub sql: &'a str,
}

impl FrontendMessage for Parse<'_> {
    const TAG: Option<u8> = Some(b'P');

    fn body(&self, out: &mut BytesMut) {
        put_cstr(out, self.name);
        put_cstr(out, self.sql);
        out.put_u16(0); // no parameter type hints
    }
}

/// One bound parameter value; `None` encodes SQL NULL (`u32(0xFFFFFFFF)`).
pub type BindParam<'a> = Option<&'a [u8]>;

pub struct Bind<'a> {
    pub portal: &'a str,
    pub statement: &'a str,
    pub params: &'a [BindParam<'a>],
}

impl FrontendMessage for Bind<'_> {
    const TAG: Option<u8> = Some(b'B');

    fn body(&self, out: &mut BytesMut) {
        put_cstr(out, self.portal);
        put_cstr(out, self.statement);
        out.put_u16(0); // parameter format codes: 0 means "all text"
        out.put_u16(self.params.len() as u16);
        for param in self.params {
            match param {
                None => out.put_u32(0xFFFF_FFFF),
                Some(value) => {
                    out.put_u32(value.len() as u32);
                    out.put_slice(value);
                }
            }
        }
        out.put_u16(0); // result format codes: 0 means "all text"
    }
}

pub struct DescribePortal<'a> {
    pub portal: &'a str,
}

impl FrontendMessage for DescribePortal<'_> {
    const TAG: Option<u8> = Some(b'D');

    fn body(&self, out: &mut BytesMut) {
        out.put_u8(b'P');
        put_cstr(out, self.portal);
    }
}

pub struct Execute<'a> {
    pub portal: &'a str,
    pub max_rows: i32,
}

impl FrontendMessage for Execute<'_> {
    const TAG: Option<u8> = Some(b'E');

    fn body(&self, out: &mut BytesMut) {
        put_cstr(out, self.portal);
        out.put_i32(self.max_rows);
    }
}

pub struct ClosePortal<'a> {
    pub portal: &'a str,
}

impl FrontendMessage for ClosePortal<'_> {
    const TAG: Option<u8> = Some(b'C');

    fn body(&self, out: &mut BytesMut) {
        out.put_u8(b'P');
        put_cstr(out, self.portal);
    }
}

pub struct CloseStatement<'a> {
    pub name: &'a str,
}

impl FrontendMessage for CloseStatement<'_> {
    const TAG: Option<u8> = Some(b'C');

    fn body(&self, out: &mut BytesMut) {
        out.put_u8(b'S');
        put_cstr(out, self.name);
    }
}

pub struct Flush;

impl FrontendMessage for Flush {
    const TAG: Option<u8> = Some(b'H');

    fn body(&self, _out: &mut BytesMut) {}
}

pub struct Sync;

impl FrontendMessage for Sync {
    const TAG: Option<u8> = Some(b'S');

    fn body(&self, _out: &mut BytesMut) {}
}

pub struct Terminate;

impl FrontendMessage for Terminate {
    const TAG: Option<u8> = Some(b'X');

    fn body(&self, _out: &mut BytesMut) {}
}
