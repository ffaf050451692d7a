//! The `request` role: one operation on the wire and back.

use std::io::{self, Read, Write};

use bytes::BytesMut;
use protocol_memcache::{DEFAULT_MAX_VALUE_LEN, Limits, Response};
use tracing::trace;

use crate::connect::{ConnectPolicy, Lease};
use crate::error::ProtocolError;
use crate::metrics;
use crate::{Error, Operation};

/// Behavior bound to the [`Request`](crate::tags::Request) tag.
///
/// Generic over the endpoint type so a profile can only pair a request policy
/// with a connect policy whose endpoints it knows how to drive.
pub trait RequestPolicy<E: Read + Write> {
    /// Encode `op`, send it over the leased endpoint, and read its reply.
    ///
    /// Implementations must not retry. A reply is returned only if it is a
    /// valid, non-error answer to `op`.
    fn send<C>(&self, lease: &mut Lease<'_, C>, op: &Operation) -> Result<Response, Error>
    where
        C: ConnectPolicy<Endpoint = E>;
}

/// Header room allowed on top of the largest value a reply may carry.
const REPLY_SLACK: usize = 64 * 1024;

const READ_CHUNK: usize = 16 * 1024;

/// The memcache ASCII protocol over any byte stream.
#[derive(Debug, Clone)]
pub struct TextRequest {
    max_response_len: usize,
    limits: Limits,
}

impl Default for TextRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl TextRequest {
    pub fn new() -> Self {
        Self {
            max_response_len: DEFAULT_MAX_VALUE_LEN + REPLY_SLACK,
            limits: Limits::new(),
        }
    }

    /// Reject replies that grow past `len` bytes before completing.
    pub fn with_max_response_len(mut self, len: usize) -> Self {
        self.max_response_len = len;
        self.limits = self.limits.max_value_len(len);
        self
    }

    pub fn max_response_len(&self) -> usize {
        self.max_response_len
    }

    fn exchange<E: Read + Write>(&self, endpoint: &mut E, out: &[u8]) -> Result<Response, Error> {
        endpoint.write_all(out)?;
        endpoint.flush()?;
        self.read_reply(endpoint)
    }

    fn read_reply<E: Read>(&self, endpoint: &mut E) -> Result<Response, Error> {
        let mut buf = BytesMut::with_capacity(READ_CHUNK);
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match Response::parse_with_limits(&buf, &self.limits) {
                Ok((response, consumed)) => {
                    if consumed < buf.len() {
                        return Err(ProtocolError::TrailingBytes(buf.len() - consumed).into());
                    }
                    return Ok(response);
                }
                Err(e) if e.is_incomplete() => {}
                Err(e) => return Err(e.into()),
            }
            if buf.len() >= self.max_response_len {
                return Err(ProtocolError::ReplyTooLarge {
                    limit: self.max_response_len,
                }
                .into());
            }
            let want = (self.max_response_len - buf.len()).min(READ_CHUNK);
            let n = match endpoint.read(&mut chunk[..want]) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            };
            if n == 0 {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed mid-reply",
                )));
            }
            buf.extend_from_slice(&chunk[..n]);
        }
    }
}

impl<E: Read + Write> RequestPolicy<E> for TextRequest {
    fn send<C>(&self, lease: &mut Lease<'_, C>, op: &Operation) -> Result<Response, Error>
    where
        C: ConnectPolicy<Endpoint = E>,
    {
        op.validate()?;

        let request = op.as_request();
        let mut out = BytesMut::with_capacity(request.encoded_len());
        request.encode(&mut out);

        trace!(role = "request", op = op.name(), len = out.len(), "send");
        metrics::REQUESTS_SENT.increment();

        lease.poison();
        let response = match self.exchange(lease.endpoint(), &out) {
            Ok(response) => response,
            Err(e) => {
                metrics::REQUEST_ERRORS.increment();
                return Err(e);
            }
        };
        // The reply is complete; anything below is about its content only.
        lease.settle();

        if let Some(err) = Error::from_reply(&response) {
            metrics::REQUEST_ERRORS.increment();
            return Err(err);
        }
        if !answers(op, &response) {
            metrics::REQUEST_ERRORS.increment();
            return Err(ProtocolError::UnexpectedReply { command: op.name() }.into());
        }
        Ok(response)
    }
}

/// Whether `response` is a well-formed answer to `op`.
fn answers(op: &Operation, response: &Response) -> bool {
    match (op, response) {
        (Operation::Get { key }, Response::Values(values)) => {
            values.len() <= 1 && values.iter().all(|v| v.key == *key)
        }
        (Operation::GetMany { keys }, Response::Values(values)) => {
            values.iter().all(|v| keys.contains(&v.key))
        }
        (Operation::Store { .. }, r) => matches!(r, Response::Stored | Response::NotStored),
        (Operation::Cas { .. }, r) => {
            matches!(r, Response::Stored | Response::Exists | Response::NotFound)
        }
        (Operation::Delete { .. }, r) => matches!(r, Response::Deleted | Response::NotFound),
        (Operation::Incr { .. } | Operation::Decr { .. }, r) => {
            matches!(r, Response::Numeric(_) | Response::NotFound)
        }
        (Operation::Touch { .. }, r) => matches!(r, Response::Touched | Response::NotFound),
        (Operation::FlushAll, Response::Ok) => true,
        (Operation::Version, Response::Version(_)) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::connect::{Dedicated, EndpointState, Fault, MemoryServer};

    fn send(server: &MemoryServer, op: &Operation) -> (Result<Response, Error>, EndpointState) {
        let policy = Dedicated::new(server.clone());
        let mut lease = policy.acquire().unwrap();
        let result = TextRequest::new().send(&mut lease, op);
        (result, lease.state())
    }

    #[test]
    fn test_round_trip() {
        let server = MemoryServer::new();
        let (result, state) = send(&server, &Operation::set("k", "v"));
        assert_eq!(result.unwrap(), Response::Stored);
        assert_eq!(state, EndpointState::Clean);

        let (result, _) = send(&server, &Operation::get("k"));
        assert_eq!(result.unwrap(), Response::hit(b"k", 0, b"v"));
    }

    #[test]
    fn test_invalid_operation_never_touches_endpoint() {
        let server = MemoryServer::new();
        let (result, state) = send(&server, &Operation::get("bad key"));
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Request);
        assert_eq!(state, EndpointState::Clean);
        assert_eq!(server.command_count(), 0);
    }

    #[test]
    fn test_failures_leave_endpoint_poisoned() {
        let server = MemoryServer::new();
        server.inject("junk", Fault::Garbage);
        server.inject("gone", Fault::Hangup);

        let (result, state) = send(&server, &Operation::get("junk"));
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Protocol);
        assert_eq!(state, EndpointState::Poisoned);

        let (result, state) = send(&server, &Operation::get("gone"));
        let err = result.unwrap_err();
        assert!(matches!(&err, Error::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof));
        assert_eq!(state, EndpointState::Poisoned);
    }

    #[test]
    fn test_server_error_reply() {
        let server = MemoryServer::new();
        server.inject("bad", Fault::ServerError);
        let (result, state) = send(&server, &Operation::delete("bad"));
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Server);
        assert_eq!(err.to_string(), "server error: SERVER_ERROR injected fault");
        // The reply itself was complete, so the endpoint is reusable.
        assert_eq!(state, EndpointState::Clean);
    }

    #[test]
    fn test_reply_too_large() {
        let server = MemoryServer::new();
        let (result, _) = send(&server, &Operation::set("big", vec![b'x'; 4096]));
        result.unwrap();

        let policy = Dedicated::new(server);
        let mut lease = policy.acquire().unwrap();
        let err = TextRequest::new()
            .with_max_response_len(1024)
            .send(&mut lease, &Operation::get("big"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn test_reply_read_stops_at_limit() {
        let mut endpoint = io::Cursor::new(vec![b'x'; 3 * READ_CHUNK]);
        let policy = TextRequest::new().with_max_response_len(100);
        let err = policy.read_reply(&mut endpoint).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(endpoint.position() <= 100, "read {} bytes", endpoint.position());
    }

    #[test]
    fn test_answers_shape() {
        assert!(answers(&Operation::get("k"), &Response::miss()));
        assert!(!answers(&Operation::get("k"), &Response::Stored));
        assert!(!answers(&Operation::get("k"), &Response::hit(b"other", 0, b"v")));
        assert!(answers(&Operation::delete("k"), &Response::NotFound));
        assert!(!answers(&Operation::Version, &Response::Ok));
        assert!(answers(&Operation::FlushAll, &Response::Ok));
    }
}
