//! Backend (server-to-client) message bodies.
use bytes::Bytes;
use std::io::{Read, Write};

use crate::{
    codec::ResponseBody,
    common::ByteStr,
    error::ErrorKind,
    notice::Notice,
    row::ColumnMetadata,
    Result,
};

pub const AUTHENTICATION: u8 = b'R';
pub const BACKEND_KEY_DATA: u8 = b'K';
pub const PARAMETER_STATUS: u8 = b'S';
pub const READY_FOR_QUERY: u8 = b'Z';
pub const PARSE_COMPLETE: u8 = b'1';
pub const BIND_COMPLETE: u8 = b'2';
pub const NO_DATA: u8 = b'n';
pub const ROW_DESCRIPTION: u8 = b'T';
pub const DATA_ROW: u8 = b'D';
pub const EMPTY_QUERY: u8 = b'I';
pub const COMMAND_COMPLETE: u8 = b'C';
pub const CLOSE_COMPLETE: u8 = b'3';
pub const ERROR_RESPONSE: u8 = b'E';
pub const NOTICE_RESPONSE: u8 = b'N';
pub const NOTIFICATION_RESPONSE: u8 = b'A';

/// `AuthenticationX` family, distinguished by the leading `i32` code.
#[derive(Debug)]
pub enum Authentication {
    Ok,
    CleartextPassword,
    Md5Password { salt: [u8; 4] },
    Sasl { mechanisms: Vec<ByteStr> },
    SaslContinue { data: Bytes },
    SaslFinal { data: Bytes },
    Unknown(i32),
}

#[derive(Debug)]
pub struct BackendKeyData {
    pub process_id: i32,
    pub secret_key: i32,
}

#[derive(Debug)]
pub struct ParameterStatus {
    pub name: ByteStr,
    pub value: ByteStr,
}

/// Transaction status carried by `ReadyForQuery`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Idle,
    InTransaction,
    Failed,
}

#[derive(Debug)]
pub struct ReadyForQuery(pub TransactionStatus);

#[derive(Debug)]
pub struct RowDescription(pub Vec<ColumnMetadata>);

#[derive(Debug)]
pub struct DataRow(pub Vec<Option<Bytes>>);

#[derive(Debug)]
pub struct CommandComplete(pub ByteStr);

#[derive(Debug)]
pub struct NotificationResponse {
    pub process_id: i32,
    pub channel: ByteStr,
    pub payload: ByteStr,
}

/// Every backend message this client understands, tagged by the wire's
/// leading ascii byte.
#[derive(Debug)]
pub enum Backend {
    Authentication(Authentication),
    BackendKeyData(BackendKeyData),
    ParameterStatus(ParameterStatus),
    ReadyForQuery(ReadyForQuery),
    ParseComplete,
    BindComplete,
    NoData,
    RowDescription(RowDescription),
    DataRow(DataRow),
    EmptyQuery,
    CommandComplete(CommandComplete),
    CloseComplete,
    ErrorResponse(Notice),
    NoticeResponse(Notice),
    NotificationResponse(NotificationResponse),
}

pub(crate) fn decode<S: Read + Write>(tag: u8, body: &mut ResponseBody<'_, S>) -> Result<Backend> {
    Ok(match tag {
        AUTHENTICATION => Backend::Authentication(decode_authentication(body)?),
        BACKEND_KEY_DATA => Backend::BackendKeyData(BackendKeyData {
            process_id: body.read_u32_be()? as i32,
            secret_key: body.read_u32_be()? as i32,
        }),
        PARAMETER_STATUS => Backend::ParameterStatus(ParameterStatus {
            name: body.read_cstring_utf8()?,
            value: body.read_cstring_utf8()?,
        }),
        READY_FOR_QUERY => {
            let status = match body.read_ascii_char()? {
                'I' => TransactionStatus::Idle,
                'T' => TransactionStatus::InTransaction,
                'E' => TransactionStatus::Failed,
                other => return Err(ErrorKind::ServerError(format!("unknown transaction status {other:?}")).into()),
            };
            Backend::ReadyForQuery(ReadyForQuery(status))
        }
        PARSE_COMPLETE => Backend::ParseComplete,
        BIND_COMPLETE => Backend::BindComplete,
        NO_DATA => Backend::NoData,
        ROW_DESCRIPTION => Backend::RowDescription(decode_row_description(body)?),
        DATA_ROW => Backend::DataRow(decode_data_row(body)?),
        EMPTY_QUERY => Backend::EmptyQuery,
        COMMAND_COMPLETE => Backend::CommandComplete(CommandComplete(body.read_cstring_utf8()?)),
        CLOSE_COMPLETE => Backend::CloseComplete,
        ERROR_RESPONSE => Backend::ErrorResponse(decode_notice(body)?),
        NOTICE_RESPONSE => Backend::NoticeResponse(decode_notice(body)?),
        NOTIFICATION_RESPONSE => Backend::NotificationResponse(NotificationResponse {
            process_id: body.read_u32_be()? as i32,
            channel: body.read_cstring_utf8()?,
            payload: body.read_cstring_utf8()?,
        }),
        other => return Err(ErrorKind::ServerError(format!("unknown backend message tag {:?}", other as char)).into()),
    })
}

fn decode_authentication<S: Read + Write>(body: &mut ResponseBody<'_, S>) -> Result<Authentication> {
    Ok(match body.read_u32_be()? as i32 {
        0 => Authentication::Ok,
        3 => Authentication::CleartextPassword,
        5 => {
            let bytes = body.read_exact(4)?;
            let mut salt = [0u8; 4];
            salt.copy_from_slice(&bytes);
            Authentication::Md5Password { salt }
        }
        10 => {
            let mut mechanisms = Vec::new();
            loop {
                let name = body.read_cstring_utf8()?;
                if name.as_str().is_empty() {
                    break;
                }
                mechanisms.push(name);
            }
            Authentication::Sasl { mechanisms }
        }
        11 => Authentication::SaslContinue { data: body.read_exact(body.remaining())? },
        12 => Authentication::SaslFinal { data: body.read_exact(body.remaining())? },
        other => Authentication::Unknown(other),
    })
}

fn decode_row_description<S: Read + Write>(body: &mut ResponseBody<'_, S>) -> Result<RowDescription> {
    let count = body.read_u16_be()?;
    let mut columns = Vec::with_capacity(count as usize);
    for _ in 0..count {
        columns.push(ColumnMetadata {
            name: body.read_cstring_utf8()?,
            table_oid: body.read_u32_be()?,
            attr_number: body.read_u16_be()?,
            type_oid: body.read_u32_be()?,
            type_size: body.read_u16_be()? as i16,
            type_modifier: body.read_u32_be()? as i32,
        });
        let _format_code = body.read_u16_be()?; // always 0 (text) in this client
    }
    Ok(RowDescription(columns))
}

fn decode_data_row<S: Read + Write>(body: &mut ResponseBody<'_, S>) -> Result<DataRow> {
    let count = body.read_u16_be()?;
    let mut columns = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let len = body.read_u32_be()?;
        if len == 0xFFFF_FFFF {
            columns.push(None);
        } else {
            columns.push(Some(body.read_exact(len as usize)?));
        }
    }
    Ok(DataRow(columns))
}

fn decode_notice<S: Read + Write>(body: &mut ResponseBody<'_, S>) -> Result<Notice> {
    let mut fields = Vec::new();
    loop {
        let field_type = body.read_u8()?;
        if field_type == 0 {
            break;
        }
        let value = body.read_cstring_utf8()?;
        fields.push((field_type, value));
    }
    Ok(Notice::new(fields))
}
