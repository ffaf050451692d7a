//! Typed memcache commands over a [`Context`].
//!
//! Every method builds an [`Operation`], runs it through the context's commit,
//! connect and request policies, hands any failure to the exception policy,
//! and converts values with the container policy.

use std::fmt;

use bytes::Bytes;
use protocol_memcache::{Response, StoreVerb};
use tracing::trace;

use crate::container::{Materialize, RawValue};
use crate::context::Context;
use crate::error::ProtocolError;
use crate::exception::ExceptionPolicy;
use crate::resolve::Profile;
use crate::tags;
use crate::{Error, Operation};

/// Result of a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Stored,
    /// `add` found the key, or `replace`/`append`/`prepend` did not.
    NotStored,
    /// `cas` lost the race: the item changed since it was read.
    Exists,
    NotFound,
    Deleted,
    Touched,
    Ok,
    /// Queued by the commit policy; the server has not seen it yet.
    Queued,
    /// Failed, and the exception policy suppressed the failure.
    Suppressed,
}

impl Status {
    fn from_response(command: &'static str, response: &Response) -> Result<Self, Error> {
        Ok(match response {
            Response::Stored => Status::Stored,
            Response::NotStored => Status::NotStored,
            Response::Exists => Status::Exists,
            Response::NotFound => Status::NotFound,
            Response::Deleted => Status::Deleted,
            Response::Touched => Status::Touched,
            Response::Ok => Status::Ok,
            _ => return Err(ProtocolError::UnexpectedReply { command }.into()),
        })
    }

    /// The mutation took effect, or will when flushed.
    pub fn is_success(self) -> bool {
        matches!(
            self,
            Status::Stored | Status::Deleted | Status::Touched | Status::Ok | Status::Queued
        )
    }
}

/// One hit from [`Client::get_many`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit<T> {
    pub key: Bytes,
    pub value: T,
    /// Token for a later [`Client::cas`].
    pub cas: Option<u64>,
}

/// A memcache client assembled from the policies `P` binds.
///
/// ```
/// use memcache_policy::Client;
/// use memcache_policy::connect::{MemoryServer, Pooled};
/// use memcache_policy::profile::InMemory;
///
/// let server = MemoryServer::new();
/// let client = Client::<InMemory>::with_connect(Pooled::new(server, 4));
///
/// client.set("greeting", &"hello".to_string())?;
/// let value: Option<String> = client.get("greeting")?;
/// assert_eq!(value.as_deref(), Some("hello"));
/// assert_eq!(client.get::<String>("missing")?, None);
/// # Ok::<(), memcache_policy::Error>(())
/// ```
pub struct Client<P: Profile> {
    ctx: Context<P>,
}

impl<P: Profile> fmt::Debug for Client<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client").field("ctx", &self.ctx).finish()
    }
}

impl<P: Profile> From<Context<P>> for Client<P> {
    fn from(ctx: Context<P>) -> Self {
        Self { ctx }
    }
}

impl<P: Profile> Client<P> {
    pub fn new(ctx: Context<P>) -> Self {
        Self { ctx }
    }

    /// A client around `connect` with every other policy defaulted.
    pub fn with_connect(connect: P::Connect) -> Self
    where
        P::Request: Default,
        P::Exception: Default,
        P::Commit: Default,
        P::Container: Default,
    {
        Self::new(Context::with_connect(connect))
    }

    pub fn context(&self) -> &Context<P> {
        &self.ctx
    }

    /// Route a failure through the exception policy. `fallback` is what the
    /// caller receives if it is suppressed.
    fn fail<T>(&self, failure: Error, fallback: T) -> Result<T, Error> {
        match self.ctx.resolve::<tags::Exception>().handle(failure).into_error() {
            Some(e) => Err(e),
            None => Ok(fallback),
        }
    }

    fn guard<T>(&self, result: Result<T, Error>, fallback: T) -> Result<T, Error> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => self.fail(e, fallback),
        }
    }

    fn materialize<T>(&self, raw: RawValue) -> Result<T, Error>
    where
        P::Container: Materialize<T>,
    {
        self.ctx.resolve::<tags::Container>().materialize(raw)
    }

    fn encode<T>(&self, value: &T) -> Result<RawValue, Error>
    where
        P::Container: Materialize<T>,
    {
        self.ctx.resolve::<tags::Container>().encode(value)
    }

    /// Run a retrieval or counter now, bypassing the commit queue.
    fn read(&self, op: &Operation) -> Result<Response, Error> {
        trace!(op = op.name(), "read");
        self.ctx.execute(op)
    }

    fn mutate(&self, op: Result<Operation, Error>) -> Result<Status, Error> {
        let result = op.and_then(|op| {
            let command = op.name();
            match self.ctx.submit(op)? {
                Some(response) => Status::from_response(command, &response),
                None => Ok(Status::Queued),
            }
        });
        self.guard(result, Status::Suppressed)
    }

    fn store<T>(&self, verb: StoreVerb, key: &[u8], value: &T, exptime: u32) -> Result<Status, Error>
    where
        P::Container: Materialize<T>,
    {
        let op = self
            .encode(value)
            .map(|raw| Operation::store(verb, key, raw.data, raw.flags, exptime));
        self.mutate(op)
    }

    /// Fetch one item. A miss is `Ok(None)`.
    pub fn get<T>(&self, key: impl AsRef<[u8]>) -> Result<Option<T>, Error>
    where
        P::Container: Materialize<T>,
    {
        let op = Operation::get(key);
        let result: Result<Option<T>, Error> = self.read(&op).and_then(|response| match response {
            Response::Values(values) => values
                .into_iter()
                .next()
                .map(|value| self.materialize::<T>(RawValue::from(value)))
                .transpose(),
            _ => Err(ProtocolError::UnexpectedReply { command: op.name() }.into()),
        });
        self.guard(result, None)
    }

    /// Fetch several items in one round trip. Returns hits only, in server
    /// order, each with its CAS token.
    pub fn get_many<T, K: AsRef<[u8]>>(&self, keys: &[K]) -> Result<Vec<Hit<T>>, Error>
    where
        P::Container: Materialize<T>,
    {
        let op = Operation::GetMany {
            keys: keys
                .iter()
                .map(|k| Bytes::copy_from_slice(k.as_ref()))
                .collect(),
        };
        let result: Result<Vec<Hit<T>>, Error> = self.read(&op).and_then(|response| match response {
            Response::Values(values) => values
                .into_iter()
                .map(|value| {
                    let key = value.key.clone();
                    let raw = RawValue::from(value);
                    let cas = raw.cas;
                    Ok::<_, Error>(Hit {
                        key,
                        value: self.materialize::<T>(raw)?,
                        cas,
                    })
                })
                .collect(),
            _ => Err(ProtocolError::UnexpectedReply { command: op.name() }.into()),
        });
        self.guard(result, Vec::new())
    }

    /// Store unconditionally, without expiry.
    pub fn set<T>(&self, key: impl AsRef<[u8]>, value: &T) -> Result<Status, Error>
    where
        P::Container: Materialize<T>,
    {
        self.store(StoreVerb::Set, key.as_ref(), value, 0)
    }

    /// Store unconditionally, expiring after `exptime` (seconds, or a Unix
    /// time; 0 means never).
    pub fn set_with<T>(&self, key: impl AsRef<[u8]>, value: &T, exptime: u32) -> Result<Status, Error>
    where
        P::Container: Materialize<T>,
    {
        self.store(StoreVerb::Set, key.as_ref(), value, exptime)
    }

    /// Store only if the key is absent.
    pub fn add<T>(&self, key: impl AsRef<[u8]>, value: &T) -> Result<Status, Error>
    where
        P::Container: Materialize<T>,
    {
        self.store(StoreVerb::Add, key.as_ref(), value, 0)
    }

    /// Store only if the key is present.
    pub fn replace<T>(&self, key: impl AsRef<[u8]>, value: &T) -> Result<Status, Error>
    where
        P::Container: Materialize<T>,
    {
        self.store(StoreVerb::Replace, key.as_ref(), value, 0)
    }

    /// Append raw bytes to an existing item.
    pub fn append(&self, key: impl AsRef<[u8]>, data: impl AsRef<[u8]>) -> Result<Status, Error> {
        let data = Bytes::copy_from_slice(data.as_ref());
        self.mutate(Ok(Operation::store(StoreVerb::Append, key, data, 0, 0)))
    }

    /// Prepend raw bytes to an existing item.
    pub fn prepend(&self, key: impl AsRef<[u8]>, data: impl AsRef<[u8]>) -> Result<Status, Error> {
        let data = Bytes::copy_from_slice(data.as_ref());
        self.mutate(Ok(Operation::store(StoreVerb::Prepend, key, data, 0, 0)))
    }

    /// Store only if the item is unchanged since `cas_unique` was read.
    pub fn cas<T>(&self, key: impl AsRef<[u8]>, value: &T, cas_unique: u64) -> Result<Status, Error>
    where
        P::Container: Materialize<T>,
    {
        let op = self.encode(value).map(|raw| Operation::Cas {
            key: Bytes::copy_from_slice(key.as_ref()),
            data: raw.data,
            flags: raw.flags,
            exptime: 0,
            cas_unique,
        });
        self.mutate(op)
    }

    pub fn delete(&self, key: impl AsRef<[u8]>) -> Result<Status, Error> {
        self.mutate(Ok(Operation::delete(key)))
    }

    /// Reset an item's expiry.
    pub fn touch(&self, key: impl AsRef<[u8]>, exptime: u32) -> Result<Status, Error> {
        self.mutate(Ok(Operation::Touch {
            key: Bytes::copy_from_slice(key.as_ref()),
            exptime,
        }))
    }

    /// Add `delta` to a decimal item. Returns the new value, or `None` if the
    /// key is absent. Never queued.
    pub fn incr(&self, key: impl AsRef<[u8]>, delta: u64) -> Result<Option<u64>, Error> {
        self.counter(Operation::Incr {
            key: Bytes::copy_from_slice(key.as_ref()),
            delta,
        })
    }

    /// Subtract `delta` from a decimal item, stopping at zero.
    pub fn decr(&self, key: impl AsRef<[u8]>, delta: u64) -> Result<Option<u64>, Error> {
        self.counter(Operation::Decr {
            key: Bytes::copy_from_slice(key.as_ref()),
            delta,
        })
    }

    fn counter(&self, op: Operation) -> Result<Option<u64>, Error> {
        let result = self.read(&op).and_then(|response| match response {
            Response::Numeric(n) => Ok(Some(n)),
            Response::NotFound => Ok(None),
            _ => Err(ProtocolError::UnexpectedReply { command: op.name() }.into()),
        });
        self.guard(result, None)
    }

    /// Invalidate every item on the server.
    pub fn flush_all(&self) -> Result<Status, Error> {
        self.mutate(Ok(Operation::FlushAll))
    }

    /// Server version string.
    pub fn version(&self) -> Result<Option<String>, Error> {
        let op = Operation::Version;
        let result = self.read(&op).and_then(|response| match response {
            Response::Version(v) => Ok(Some(String::from_utf8_lossy(&v).into_owned())),
            _ => Err(ProtocolError::UnexpectedReply { command: op.name() }.into()),
        });
        self.guard(result, None)
    }

    /// Send queued mutations. Returns their replies in enqueue order.
    ///
    /// If the flush fails and the failure is suppressed, the replies of the
    /// operations that did complete are returned.
    pub fn flush(&self) -> Result<Vec<Response>, Error> {
        match self.ctx.flush() {
            Ok(responses) => Ok(responses),
            Err(e) => {
                let completed = match &e {
                    Error::Commit(commit) => commit
                        .completed
                        .iter()
                        .map(|(_, response)| response.clone())
                        .collect(),
                    _ => Vec::new(),
                };
                self.fail(e, completed)
            }
        }
    }

    /// Number of queued mutations.
    pub fn pending(&self) -> usize {
        self.ctx.pending()
    }

    /// Flush and drop the client, returning the flush result.
    pub fn close(self) -> Result<Vec<Response>, Error> {
        self.flush()
    }
}
