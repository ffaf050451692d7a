//! Memcache responses: client-side parsing and server-side encoding.
//!
//! - `VALUE <key> <flags> <bytes> [<cas>]\r\n<data>\r\n ... END\r\n` - retrieval
//! - `STORED` / `NOT_STORED` / `EXISTS` / `NOT_FOUND` - storage outcomes
//! - `DELETED` / `TOUCHED` / `OK` - delete, touch, flush_all
//! - `<number>` - incr/decr result
//! - `VERSION <string>`
//! - `ERROR` / `CLIENT_ERROR <msg>` / `SERVER_ERROR <msg>`

use bytes::{BufMut, Bytes, BytesMut};

use crate::command::Limits;
use crate::error::ParseError;
use crate::find_crlf;
use crate::number::{parse_u32, parse_u64, parse_usize, put_decimal};

/// A single item from a retrieval response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    pub key: Bytes,
    pub flags: u32,
    pub data: Bytes,
    /// CAS unique token, present when the reply answers a `gets`.
    pub cas: Option<u64>,
}

/// A parsed Memcache response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Retrieval reply; empty on a miss.
    Values(Vec<Value>),
    Stored,
    NotStored,
    Exists,
    NotFound,
    Deleted,
    Touched,
    Ok,
    /// New counter value after incr/decr.
    Numeric(u64),
    Version(Bytes),
    Error,
    ClientError(Bytes),
    ServerError(Bytes),
}

impl Response {
    /// A single-value hit without a CAS token.
    pub fn hit(key: &[u8], flags: u32, data: &[u8]) -> Self {
        Response::Values(vec![Value {
            key: Bytes::copy_from_slice(key),
            flags,
            data: Bytes::copy_from_slice(data),
            cas: None,
        }])
    }

    /// An empty retrieval reply.
    #[inline]
    pub fn miss() -> Self {
        Response::Values(Vec::new())
    }

    /// Returns true for `ERROR`, `CLIENT_ERROR` and `SERVER_ERROR`.
    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Response::Error | Response::ClientError(_) | Response::ServerError(_)
        )
    }

    /// Returns true for an empty retrieval reply or `NOT_FOUND`.
    #[inline]
    pub fn is_miss(&self) -> bool {
        match self {
            Response::Values(values) => values.is_empty(),
            Response::NotFound => true,
            _ => false,
        }
    }

    /// Parse one response with the default limits.
    ///
    /// Returns the response and the number of bytes consumed.
    #[inline]
    pub fn parse(data: &[u8]) -> Result<(Self, usize), ParseError> {
        Self::parse_with_limits(data, &Limits::default())
    }

    /// Parse one response, rejecting values larger than `limits.max_value_len`.
    pub fn parse_with_limits(data: &[u8], limits: &Limits) -> Result<(Self, usize), ParseError> {
        let line_end = find_crlf(data).ok_or(ParseError::Incomplete)?;
        let line = &data[..line_end];
        let consumed = line_end + 2;

        let response = match line {
            b"STORED" => Response::Stored,
            b"NOT_STORED" => Response::NotStored,
            b"EXISTS" => Response::Exists,
            b"NOT_FOUND" => Response::NotFound,
            b"DELETED" => Response::Deleted,
            b"TOUCHED" => Response::Touched,
            b"OK" => Response::Ok,
            b"END" => Response::Values(Vec::new()),
            b"ERROR" => Response::Error,
            _ if line.starts_with(b"VALUE ") => return parse_values(data, limits),
            _ if line.starts_with(b"CLIENT_ERROR ") => {
                Response::ClientError(Bytes::copy_from_slice(&line[13..]))
            }
            _ if line.starts_with(b"SERVER_ERROR ") => {
                Response::ServerError(Bytes::copy_from_slice(&line[13..]))
            }
            _ if line.starts_with(b"VERSION ") => {
                Response::Version(Bytes::copy_from_slice(&line[8..]))
            }
            _ if !line.is_empty() && line.iter().all(u8::is_ascii_digit) => {
                Response::Numeric(parse_u64(line)?)
            }
            _ => return Err(ParseError::Protocol("unknown response")),
        };
        Ok((response, consumed))
    }

    /// Append the wire form of this response to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Response::Values(values) => {
                for value in values {
                    buf.put_slice(b"VALUE ");
                    buf.put_slice(&value.key);
                    buf.put_u8(b' ');
                    put_decimal(buf, u64::from(value.flags));
                    buf.put_u8(b' ');
                    put_decimal(buf, value.data.len() as u64);
                    if let Some(cas) = value.cas {
                        buf.put_u8(b' ');
                        put_decimal(buf, cas);
                    }
                    buf.put_slice(b"\r\n");
                    buf.put_slice(&value.data);
                    buf.put_slice(b"\r\n");
                }
                buf.put_slice(b"END\r\n");
            }
            Response::Stored => buf.put_slice(b"STORED\r\n"),
            Response::NotStored => buf.put_slice(b"NOT_STORED\r\n"),
            Response::Exists => buf.put_slice(b"EXISTS\r\n"),
            Response::NotFound => buf.put_slice(b"NOT_FOUND\r\n"),
            Response::Deleted => buf.put_slice(b"DELETED\r\n"),
            Response::Touched => buf.put_slice(b"TOUCHED\r\n"),
            Response::Ok => buf.put_slice(b"OK\r\n"),
            Response::Numeric(n) => {
                put_decimal(buf, *n);
                buf.put_slice(b"\r\n");
            }
            Response::Version(v) => put_line(buf, b"VERSION ", v),
            Response::Error => buf.put_slice(b"ERROR\r\n"),
            Response::ClientError(msg) => put_line(buf, b"CLIENT_ERROR ", msg),
            Response::ServerError(msg) => put_line(buf, b"SERVER_ERROR ", msg),
        }
    }
}

fn put_line(buf: &mut BytesMut, prefix: &[u8], body: &[u8]) {
    buf.put_slice(prefix);
    buf.put_slice(body);
    buf.put_slice(b"\r\n");
}

/// Parse `VALUE` blocks up to and including the closing `END`.
fn parse_values(data: &[u8], limits: &Limits) -> Result<(Response, usize), ParseError> {
    let mut values = Vec::new();
    let mut pos = 0;

    loop {
        let rest = &data[pos..];
        let line_end = find_crlf(rest).ok_or(ParseError::Incomplete)?;
        let line = &rest[..line_end];

        if line == b"END" {
            pos += line_end + 2;
            return Ok((Response::Values(values), pos));
        }

        let header = line
            .strip_prefix(b"VALUE ")
            .ok_or(ParseError::Protocol("expected VALUE or END"))?;
        let mut fields = header.split(|&b| b == b' ');
        let (Some(key), Some(flags), Some(len)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(ParseError::Protocol("invalid VALUE line"));
        };
        if key.is_empty() {
            return Err(ParseError::Protocol("invalid VALUE line"));
        }
        let flags = parse_u32(flags)?;
        let len = parse_usize(len)?;
        if len > limits.max_value_len {
            return Err(ParseError::TooLarge("value"));
        }
        let cas = fields.next().map(parse_u64).transpose()?;
        if fields.next().is_some() {
            return Err(ParseError::Protocol("invalid VALUE line"));
        }

        let start = pos + line_end + 2;
        let end = start + len;
        if data.len() < end + 2 {
            return Err(ParseError::Incomplete);
        }
        if &data[end..end + 2] != b"\r\n" {
            return Err(ParseError::Protocol("missing data terminator"));
        }

        values.push(Value {
            key: Bytes::copy_from_slice(key),
            flags,
            data: Bytes::copy_from_slice(&data[start..end]),
            cas,
        });
        pos = end + 2;
    }
}
