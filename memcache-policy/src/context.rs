//! A context owns one instance of each policy its profile binds.

use std::fmt;

use protocol_memcache::Response;
use tracing::{debug, warn};

use crate::commit::{CommitPolicy, Teardown};
use crate::connect::ConnectPolicy;
use crate::exception::ExceptionPolicy;
use crate::metrics;
use crate::request::RequestPolicy;
use crate::resolve::{Profile, Resolve};
use crate::tags::{self, Tag};
use crate::{Error, Operation};

/// The runtime half of a client configuration.
///
/// Owns the bound policies and their state: pooled endpoints, queued
/// mutations, the suppression journal. Policies are reached only through
/// [`resolve`](Context::resolve).
///
/// Operations executed here bypass the exception policy; that is applied by
/// [`Client`](crate::Client).
///
/// Dropping a context whose commit policy tears down with
/// [`Teardown::Flush`] sends the pending mutations first. A failure at that
/// point goes to the exception policy; whatever it does not suppress is
/// logged, since `drop` cannot return it.
pub struct Context<P: Profile> {
    pub(crate) connect: P::Connect,
    pub(crate) request: P::Request,
    pub(crate) exception: P::Exception,
    pub(crate) commit: P::Commit,
    pub(crate) container: P::Container,
}

impl<P: Profile> Context<P> {
    pub fn new(
        connect: P::Connect,
        request: P::Request,
        exception: P::Exception,
        commit: P::Commit,
        container: P::Container,
    ) -> Self {
        Self {
            connect,
            request,
            exception,
            commit,
            container,
        }
    }

    /// Build a context around `connect`, with every other policy in its
    /// default state.
    pub fn with_connect(connect: P::Connect) -> Self
    where
        P::Request: Default,
        P::Exception: Default,
        P::Commit: Default,
        P::Container: Default,
    {
        Self::new(
            connect,
            P::Request::default(),
            P::Exception::default(),
            P::Commit::default(),
            P::Container::default(),
        )
    }

    /// The policy bound for tag `T`.
    #[inline]
    pub fn resolve<T: Tag>(&self) -> &<Self as Resolve<T>>::Policy
    where
        Self: Resolve<T>,
    {
        Resolve::<T>::resolve(self)
    }

    /// Run one operation now: acquire an endpoint, send, release.
    pub fn execute(&self, op: &Operation) -> Result<Response, Error> {
        let mut lease = self.resolve::<tags::Connect>().acquire()?;
        let result = self.resolve::<tags::Request>().send(&mut lease, op);
        if let Err(e) = &result {
            debug!(op = op.name(), error = %e, "operation failed");
        }
        result
    }

    /// Offer an operation to the commit policy and run it if it is not
    /// queued. `Ok(None)` means queued.
    pub fn submit(&self, op: Operation) -> Result<Option<Response>, Error> {
        match self.resolve::<tags::Commit>().enqueue(op)? {
            Some(op) => self.execute(&op).map(Some),
            None => Ok(None),
        }
    }

    /// Send every queued mutation, in order.
    pub fn flush(&self) -> Result<Vec<Response>, Error> {
        self.resolve::<tags::Commit>().flush(|op| self.execute(op))
    }

    /// Number of queued mutations.
    pub fn pending(&self) -> usize {
        self.resolve::<tags::Commit>().pending()
    }
}

impl<P: Profile> Drop for Context<P> {
    fn drop(&mut self) {
        let pending = self.commit.pending();
        if pending == 0 {
            return;
        }
        match self.commit.teardown() {
            Teardown::Flush => {
                debug!(role = tags::Commit::NAME, pending, "flushing on teardown");
                if let Err(e) = self.flush()
                    && let Some(e) = self.exception.handle(e).into_error()
                {
                    warn!(role = tags::Commit::NAME, error = %e, "teardown flush failed");
                }
            }
            Teardown::Discard => {
                debug!(role = tags::Commit::NAME, pending, "discarding on teardown");
                metrics::OPERATIONS_DISCARDED.add(pending as u64);
            }
        }
    }
}

impl<P: Profile> fmt::Debug for Context<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("profile", &std::any::type_name::<P>())
            .field("pending", &self.commit.pending())
            .finish_non_exhaustive()
    }
}
