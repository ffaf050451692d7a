//! Failure taxonomy shared by every role.
//!
//! Roles other than `exception` only raise these; the bound
//! [`ExceptionPolicy`](crate::exception::ExceptionPolicy) decides what the
//! caller finally sees.

use std::io;

use protocol_memcache::{ParseError, Response};

/// Errors surfaced by a policy-composed client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The endpoint could not be reached, refused the connection, or timed out.
    #[error("connection error: {0}")]
    Connection(#[source] io::Error),

    /// The caller supplied an operation that cannot be sent.
    #[error("invalid request: {0}")]
    Request(&'static str),

    /// The server reply violated the expected grammar or shape.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Transport failure in the middle of an exchange.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The server understood the request and refused it
    /// (`ERROR`, `CLIENT_ERROR`, `SERVER_ERROR`).
    #[error("server error: {0}")]
    Server(String),

    /// A batch flush failed partially or fully.
    #[error(transparent)]
    Commit(#[from] CommitError),

    /// Stored bytes do not match the type the caller asked for.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Error::Protocol(ProtocolError::Parse(e))
    }
}

impl Error {
    /// The category of this failure, used by exception policies to select
    /// which failures to suppress or translate.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connection(_) => ErrorKind::Connection,
            Error::Request(_) => ErrorKind::Request,
            Error::Protocol(_) => ErrorKind::Protocol,
            Error::Io(_) => ErrorKind::Io,
            Error::Server(_) => ErrorKind::Server,
            Error::Commit(_) => ErrorKind::Commit,
            Error::Decode(_) => ErrorKind::Decode,
        }
    }

    /// Convert a server error reply into an `Error::Server`.
    /// Returns `None` for non-error replies.
    pub(crate) fn from_reply(response: &Response) -> Option<Self> {
        let message = match response {
            Response::Error => "ERROR".to_string(),
            Response::ClientError(msg) => {
                format!("CLIENT_ERROR {}", String::from_utf8_lossy(msg))
            }
            Response::ServerError(msg) => {
                format!("SERVER_ERROR {}", String::from_utf8_lossy(msg))
            }
            _ => return None,
        };
        Some(Error::Server(message))
    }
}

/// Discriminant of [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Connection,
    Request,
    Protocol,
    Io,
    Server,
    Commit,
    Decode,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 7] = [
        ErrorKind::Connection,
        ErrorKind::Request,
        ErrorKind::Protocol,
        ErrorKind::Io,
        ErrorKind::Server,
        ErrorKind::Commit,
        ErrorKind::Decode,
    ];

    pub(crate) const fn bit(self) -> u8 {
        1 << self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Request => "request",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Io => "io",
            ErrorKind::Server => "server",
            ErrorKind::Commit => "commit",
            ErrorKind::Decode => "decode",
        }
    }
}

/// Reasons a reply is rejected as a protocol violation.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Parse(ParseError),

    /// The reply parsed but is not a valid answer to the command sent.
    #[error("unexpected reply to {command}")]
    UnexpectedReply { command: &'static str },

    /// The server sent bytes after the complete reply.
    #[error("{0} unsolicited bytes after reply")]
    TrailingBytes(usize),

    /// The reply grew past the configured bound before it completed.
    #[error("reply exceeds {limit} bytes")]
    ReplyTooLarge { limit: usize },
}

/// Reasons a stored value cannot be materialized as the requested type.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("value is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("value is not a decimal {0}")]
    Number(&'static str),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected flags {found:#x}, expected {expected:#x}")]
    Flags { expected: u32, found: u32 },
}

/// Result of a failed batch flush.
///
/// Indices refer to enqueue order within the flushed batch.
#[derive(Debug, thiserror::Error)]
#[error(
    "batch flush failed: {} failed, {} completed, {} skipped",
    .failed.len(),
    .completed.len(),
    .skipped
)]
pub struct CommitError {
    /// Operations that completed, with their replies.
    pub completed: Vec<(usize, Response)>,
    /// Operations that failed, with their errors.
    pub failed: Vec<(usize, Error)>,
    /// Operations discarded unsent after an aborting failure.
    pub skipped: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind() {
        assert_eq!(Error::Request("empty key").kind(), ErrorKind::Request);
        assert_eq!(
            Error::Connection(io::Error::from(io::ErrorKind::ConnectionRefused)).kind(),
            ErrorKind::Connection
        );
        assert_eq!(
            Error::from(io::Error::from(io::ErrorKind::UnexpectedEof)).kind(),
            ErrorKind::Io
        );
        assert_eq!(
            Error::from(ParseError::Protocol("unknown response")).kind(),
            ErrorKind::Protocol
        );
        assert_eq!(
            Error::from(DecodeError::Number("u64")).kind(),
            ErrorKind::Decode
        );
    }

    #[test]
    fn test_kind_bits_are_distinct() {
        let mut seen = 0u8;
        for kind in ErrorKind::ALL {
            assert_eq!(seen & kind.bit(), 0);
            seen |= kind.bit();
        }
    }

    #[test]
    fn test_from_reply() {
        assert!(Error::from_reply(&Response::Stored).is_none());
        let err = Error::from_reply(&Response::ServerError("out of memory".into())).unwrap();
        assert_eq!(err.to_string(), "server error: SERVER_ERROR out of memory");
    }

    #[test]
    fn test_commit_error_display() {
        let err = CommitError {
            completed: vec![(0, Response::Stored)],
            failed: vec![(1, Error::Request("empty key"))],
            skipped: 2,
        };
        assert_eq!(
            err.to_string(),
            "batch flush failed: 1 failed, 1 completed, 2 skipped"
        );
    }
}
