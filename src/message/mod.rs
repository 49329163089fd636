//! Postgres frontend/backend wire message types (protocol v3, `u32(196608)`).
pub mod backend;
pub mod frontend;

use bytes::BytesMut;
use std::io::{Read, Write};

use crate::{
    codec::{framing::read_response_header, Codec, ResponseBody, Request},
    Result,
};

pub(crate) const SSL_REQUEST_CODE: u32 = 80877103;
pub(crate) const PROTOCOL_VERSION: u32 = 196608;

/// A frontend (client-to-server) message: one byte tag (if any) plus a body.
pub trait FrontendMessage {
    const TAG: Option<u8>;

    fn body(&self, out: &mut BytesMut);
}

impl<S: Read + Write> Codec<S> {
    pub fn send<M: FrontendMessage>(&mut self, message: &M) {
        let mut body = BytesMut::new();
        message.body(&mut body);
        self.write_request(Request::new(M::TAG, &body));
    }

    /// Decode one full response frame into the [`backend::Backend`] enum,
    /// asserting the declared body length was consumed exactly.
    pub fn recv(&mut self) -> Result<backend::Backend> {
        let header = read_response_header(self)?;
        let mut body = ResponseBody::new(self, header);
        let message = backend::decode(header.tag, &mut body)?;
        body.finish()?;
        Ok(message)
    }
}
