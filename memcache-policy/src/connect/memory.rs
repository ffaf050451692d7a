//! An in-process memcache reachable through the text protocol.
//!
//! [`MemoryServer`] keeps items in a map and answers commands parsed with
//! `protocol-memcache`'s server-side parser, so a client wired to it exercises
//! the same encode/parse path as one talking to a real server. It records every
//! command it receives and can inject faults per key, which makes it the
//! backing for end-to-end tests and local demos.
//!
//! Expiry times are accepted and ignored.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use parking_lot::Mutex;
use protocol_memcache::{Command, ParseError, Response, StoreVerb, Value};

use super::Dial;
use crate::Error;
use crate::metrics;

/// Failure to inject for commands touching a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Reply `SERVER_ERROR injected fault`.
    ServerError,
    /// Reply with a line that is not valid protocol.
    Garbage,
    /// Send half a reply, then close the stream.
    Hangup,
}

#[derive(Debug, Clone)]
struct Item {
    data: Bytes,
    flags: u32,
    cas: u64,
}

#[derive(Debug, Default)]
struct Store {
    items: HashMap<Bytes, Item>,
    next_cas: u64,
    log: Vec<String>,
    faults: HashMap<Bytes, Fault>,
    refuse: bool,
    dials: u64,
}

impl Store {
    fn put(&mut self, key: &[u8], data: Bytes, flags: u32) {
        self.next_cas += 1;
        self.items.insert(
            Bytes::copy_from_slice(key),
            Item {
                data,
                flags,
                cas: self.next_cas,
            },
        );
    }

    fn apply(&mut self, command: &Command<'_>) -> Response {
        match command {
            Command::Retrieve { keys, with_cas } => Response::Values(
                keys.iter()
                    .filter_map(|key| {
                        self.items.get(*key).map(|item| Value {
                            key: Bytes::copy_from_slice(key),
                            flags: item.flags,
                            data: item.data.clone(),
                            cas: with_cas.then_some(item.cas),
                        })
                    })
                    .collect(),
            ),
            Command::Store {
                verb,
                key,
                flags,
                data,
                ..
            } => {
                let existing = self.items.get(*key).cloned();
                let (data, flags) = match (verb, existing) {
                    (StoreVerb::Set, _) => (Bytes::copy_from_slice(data), *flags),
                    (StoreVerb::Add, None) => (Bytes::copy_from_slice(data), *flags),
                    (StoreVerb::Replace, Some(_)) => (Bytes::copy_from_slice(data), *flags),
                    (StoreVerb::Append, Some(item)) => ([&item.data[..], *data].concat().into(), item.flags),
                    (StoreVerb::Prepend, Some(item)) => ([*data, &item.data[..]].concat().into(), item.flags),
                    _ => return Response::NotStored,
                };
                self.put(key, data, flags);
                Response::Stored
            }
            Command::Cas {
                key,
                flags,
                data,
                cas_unique,
                ..
            } => match self.items.get(*key) {
                None => Response::NotFound,
                Some(item) if item.cas != *cas_unique => Response::Exists,
                Some(_) => {
                    self.put(key, Bytes::copy_from_slice(data), *flags);
                    Response::Stored
                }
            },
            Command::Delete { key } => match self.items.remove(*key) {
                Some(_) => Response::Deleted,
                None => Response::NotFound,
            },
            Command::Incr { key, delta } | Command::Decr { key, delta } => {
                let Some(item) = self.items.get(*key) else {
                    return Response::NotFound;
                };
                let Some(current) = std::str::from_utf8(&item.data)
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                else {
                    return Response::ClientError(Bytes::from_static(
                        b"cannot increment or decrement non-numeric value",
                    ));
                };
                let next = match command {
                    Command::Incr { .. } => current.wrapping_add(*delta),
                    _ => current.saturating_sub(*delta),
                };
                let flags = item.flags;
                self.put(key, Bytes::from(next.to_string()), flags);
                Response::Numeric(next)
            }
            Command::Touch { key, .. } => {
                if self.items.contains_key(*key) {
                    Response::Touched
                } else {
                    Response::NotFound
                }
            }
            Command::FlushAll => {
                self.items.clear();
                Response::Ok
            }
            Command::Version => Response::Version(Bytes::from_static(b"memory")),
            Command::Quit => Response::Ok,
        }
    }

    fn fault_for(&self, command: &Command<'_>) -> Option<Fault> {
        if self.faults.is_empty() {
            return None;
        }
        command_keys(command)
            .iter()
            .find_map(|key| self.faults.get(*key).copied())
    }
}

fn command_keys<'a>(command: &Command<'a>) -> Vec<&'a [u8]> {
    match command {
        Command::Retrieve { keys, .. } => keys.clone(),
        Command::Store { key, .. }
        | Command::Cas { key, .. }
        | Command::Delete { key }
        | Command::Incr { key, .. }
        | Command::Decr { key, .. }
        | Command::Touch { key, .. } => vec![*key],
        Command::FlushAll | Command::Version | Command::Quit => Vec::new(),
    }
}

/// Shared handle to an in-process memcache. Clones share one store.
#[derive(Debug, Clone, Default)]
pub struct MemoryServer {
    store: Arc<Mutex<Store>>,
}

impl MemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every command received so far, as `"<verb> <key>..."`, in arrival order.
    pub fn log(&self) -> Vec<String> {
        self.store.lock().log.clone()
    }

    /// Number of commands received so far.
    pub fn command_count(&self) -> usize {
        self.store.lock().log.len()
    }

    pub fn clear_log(&self) {
        self.store.lock().log.clear();
    }

    /// Number of endpoints dialed so far.
    pub fn dials(&self) -> u64 {
        self.store.lock().dials
    }

    /// Answer commands touching `key` with `fault` until cleared.
    pub fn inject(&self, key: impl AsRef<[u8]>, fault: Fault) {
        self.store
            .lock()
            .faults
            .insert(Bytes::copy_from_slice(key.as_ref()), fault);
    }

    pub fn clear_faults(&self) {
        self.store.lock().faults.clear();
    }

    /// Make subsequent dials fail with `ConnectionRefused`.
    pub fn refuse_connections(&self, refuse: bool) {
        self.store.lock().refuse = refuse;
    }

    /// Stored bytes for `key`, bypassing the protocol.
    pub fn peek(&self, key: impl AsRef<[u8]>) -> Option<Bytes> {
        self.store
            .lock()
            .items
            .get(key.as_ref())
            .map(|item| item.data.clone())
    }

    /// Number of stored items.
    pub fn len(&self) -> usize {
        self.store.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Open a stream to this server without going through a connect policy.
    pub fn stream(&self) -> MemoryStream {
        MemoryStream {
            server: self.clone(),
            inbound: BytesMut::new(),
            outbound: BytesMut::new(),
            closed: false,
        }
    }
}

impl Dial for MemoryServer {
    type Endpoint = MemoryStream;

    fn dial(&self) -> Result<MemoryStream, Error> {
        {
            let mut store = self.store.lock();
            if store.refuse {
                return Err(Error::Connection(io::Error::from(
                    io::ErrorKind::ConnectionRefused,
                )));
            }
            store.dials += 1;
        }
        metrics::ENDPOINTS_OPENED.increment();
        Ok(self.stream())
    }

    fn peer(&self) -> &str {
        "memory"
    }
}

/// A byte stream to a [`MemoryServer`].
///
/// Commands are executed as soon as a complete one has been written; replies
/// are buffered until read. Reading with nothing buffered returns end of
/// stream.
#[derive(Debug)]
pub struct MemoryStream {
    server: MemoryServer,
    inbound: BytesMut,
    outbound: BytesMut,
    closed: bool,
}

impl MemoryStream {
    fn process(&mut self) {
        while !self.closed && !self.inbound.is_empty() {
            let (fault, response, consumed) = match Command::parse(&self.inbound) {
                Ok((command, consumed)) => {
                    let mut store = self.server.store.lock();
                    let mut entry = command.name().to_string();
                    for key in command_keys(&command) {
                        entry.push(' ');
                        entry.push_str(&String::from_utf8_lossy(key));
                    }
                    store.log.push(entry);
                    if command == Command::Quit {
                        self.closed = true;
                        return;
                    }
                    match store.fault_for(&command) {
                        Some(fault) => (Some(fault), None, consumed),
                        None => (None, Some(store.apply(&command)), consumed),
                    }
                }
                Err(e) if e.is_incomplete() => return,
                Err(ParseError::UnknownCommand) => (None, Some(Response::Error), self.inbound.len()),
                Err(e) => {
                    let msg = Bytes::from(e.to_string());
                    (None, Some(Response::ClientError(msg)), self.inbound.len())
                }
            };
            self.inbound.advance(consumed);

            match (fault, response) {
                (_, Some(response)) => response.encode(&mut self.outbound),
                (Some(Fault::ServerError), None) => {
                    Response::ServerError(Bytes::from_static(b"injected fault"))
                        .encode(&mut self.outbound)
                }
                (Some(Fault::Garbage), None) => self.outbound.extend_from_slice(b"HELLO?\r\n"),
                (Some(Fault::Hangup), None) => {
                    self.outbound.extend_from_slice(b"VALUE ");
                    self.closed = true;
                }
                (None, None) => {}
            }
        }
    }
}

impl Write for MemoryStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        self.inbound.extend_from_slice(buf);
        self.process();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for MemoryStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.outbound.len());
        buf[..n].copy_from_slice(&self.outbound[..n]);
        self.outbound.advance(n);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(stream: &mut MemoryStream, wire: &[u8]) -> Vec<u8> {
        stream.write_all(wire).unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_storage_semantics() {
        let server = MemoryServer::new();
        let mut s = server.stream();
        assert_eq!(exchange(&mut s, b"add k 0 0 1\r\na\r\n"), b"STORED\r\n");
        assert_eq!(exchange(&mut s, b"add k 0 0 1\r\nb\r\n"), b"NOT_STORED\r\n");
        assert_eq!(exchange(&mut s, b"append k 0 0 2\r\nbc\r\n"), b"STORED\r\n");
        assert_eq!(exchange(&mut s, b"prepend k 0 0 1\r\n_\r\n"), b"STORED\r\n");
        assert_eq!(exchange(&mut s, b"get k\r\n"), b"VALUE k 0 4\r\n_abc\r\nEND\r\n");
        assert_eq!(exchange(&mut s, b"replace nope 0 0 1\r\nx\r\n"), b"NOT_STORED\r\n");
        assert_eq!(exchange(&mut s, b"delete k\r\n"), b"DELETED\r\n");
        assert_eq!(exchange(&mut s, b"delete k\r\n"), b"NOT_FOUND\r\n");
        assert!(server.is_empty());
    }

    #[test]
    fn test_cas_and_counters() {
        let server = MemoryServer::new();
        let mut s = server.stream();
        exchange(&mut s, b"set n 0 0 2\r\n10\r\n");
        assert_eq!(exchange(&mut s, b"gets n\r\n"), b"VALUE n 0 2 1\r\n10\r\nEND\r\n");
        assert_eq!(exchange(&mut s, b"cas n 0 0 2 9\r\n11\r\n"), b"EXISTS\r\n");
        assert_eq!(exchange(&mut s, b"cas n 0 0 2 1\r\n11\r\n"), b"STORED\r\n");
        assert_eq!(exchange(&mut s, b"incr n 4\r\n"), b"15\r\n");
        assert_eq!(exchange(&mut s, b"decr n 100\r\n"), b"0\r\n");
        assert_eq!(exchange(&mut s, b"incr missing 1\r\n"), b"NOT_FOUND\r\n");
        assert_eq!(exchange(&mut s, b"touch n 10\r\n"), b"TOUCHED\r\n");
        assert_eq!(server.peek("n").as_deref(), Some(&b"0"[..]));
    }

    #[test]
    fn test_log_and_pipelining() {
        let server = MemoryServer::new();
        let mut s = server.stream();
        let out = exchange(&mut s, b"set a 0 0 1\r\n1\r\nget a b\r\nversion\r\n");
        assert_eq!(out, b"STORED\r\nVALUE a 0 1\r\n1\r\nEND\r\nVERSION memory\r\n");
        assert_eq!(server.log(), ["set a", "get a b", "version"]);
    }

    #[test]
    fn test_partial_writes_wait_for_full_command() {
        let server = MemoryServer::new();
        let mut s = server.stream();
        assert!(exchange(&mut s, b"set a 0 0 5\r\nhel").is_empty());
        assert_eq!(exchange(&mut s, b"lo\r\n"), b"STORED\r\n");
    }

    #[test]
    fn test_faults() {
        let server = MemoryServer::new();
        server.inject("bad", Fault::ServerError);
        server.inject("junk", Fault::Garbage);
        server.inject("gone", Fault::Hangup);
        let mut s = server.stream();
        assert_eq!(exchange(&mut s, b"get bad\r\n"), b"SERVER_ERROR injected fault\r\n");
        assert_eq!(exchange(&mut s, b"get junk\r\n"), b"HELLO?\r\n");
        assert_eq!(exchange(&mut s, b"get gone\r\n"), b"VALUE ");
        assert!(s.write_all(b"get ok\r\n").is_err());

        assert!(server.dial().is_ok());
        server.refuse_connections(true);
        assert!(server.dial().is_err());
        assert_eq!(server.dials(), 1);
    }
}
