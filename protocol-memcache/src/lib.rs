//! Memcache ASCII protocol codec.
//!
//! Both directions of the text protocol are covered: clients encode a
//! [`Request`] and parse a [`Response`]; servers parse a [`Command`] and
//! encode a [`Response`]. Parsing is incremental: every `parse` returns the
//! decoded value together with the number of bytes consumed, or
//! [`ParseError::Incomplete`] when the buffer does not yet hold a full frame.
//!
//! # Example - Client Side
//!
//! ```
//! use bytes::BytesMut;
//! use protocol_memcache::{Request, Response};
//!
//! let mut buf = BytesMut::new();
//! Request::Get { key: b"mykey" }.encode(&mut buf);
//! assert_eq!(&buf[..], b"get mykey\r\n");
//!
//! let (response, consumed) = Response::parse(b"VALUE mykey 0 5\r\nhello\r\nEND\r\n").unwrap();
//! assert_eq!(consumed, 29);
//! assert!(!response.is_miss());
//! ```
//!
//! # Example - Server Side
//!
//! ```
//! use bytes::BytesMut;
//! use protocol_memcache::{Command, Response};
//!
//! let (cmd, consumed) = Command::parse(b"get mykey\r\n").unwrap();
//! assert_eq!(cmd.name(), "get");
//! assert_eq!(consumed, 11);
//!
//! let mut buf = BytesMut::new();
//! Response::Stored.encode(&mut buf);
//! assert_eq!(&buf[..], b"STORED\r\n");
//! ```

mod command;
mod error;
mod number;
mod request;
mod response;

pub use command::{Command, DEFAULT_MAX_KEY_LEN, DEFAULT_MAX_KEYS, DEFAULT_MAX_VALUE_LEN, Limits};
pub use error::ParseError;
pub use request::{Request, StoreVerb};
pub use response::{Response, Value};

/// Find the first `\r\n` in `data`, returning the position of `\r`.
#[inline]
pub(crate) fn find_crlf(data: &[u8]) -> Option<usize> {
    memchr::memmem::find(data, b"\r\n")
}
