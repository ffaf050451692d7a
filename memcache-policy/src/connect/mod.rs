//! The `connect` role: acquiring and releasing endpoints.
//!
//! A [`ConnectPolicy`] hands out endpoints wrapped in a [`Lease`]. The lease
//! gives one operation exclusive use of the endpoint and returns it to the
//! policy exactly once when dropped, whatever path the operation exits by.
//!
//! Transport and lifetime discipline are separate seams: a [`Dial`]
//! implementation opens endpoints ([`TcpDialer`] for real servers,
//! [`MemoryServer`] in-process), while [`Dedicated`] and [`Pooled`] decide
//! whether an endpoint lives for one operation or is reused.

mod dedicated;
mod memory;
mod pooled;
mod tcp;

pub use dedicated::Dedicated;
pub use memory::{Fault, MemoryServer, MemoryStream};
pub use pooled::Pooled;
pub use tcp::TcpDialer;

use std::io::{Read, Write};
use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::Error;

/// Behavior bound to the [`Connect`](crate::tags::Connect) tag.
pub trait ConnectPolicy: Sized {
    /// The exclusive byte stream an operation talks over.
    type Endpoint: Read + Write;

    /// Acquire an endpoint for one operation.
    ///
    /// Fails with [`Error::Connection`] when the server is unreachable,
    /// refuses, or the dial times out.
    fn acquire(&self) -> Result<Lease<'_, Self>, Error>;

    /// Take an endpoint back. Called once per successful `acquire`, from
    /// [`Lease`]'s destructor.
    ///
    /// A [`EndpointState::Poisoned`] endpoint was abandoned mid-exchange and
    /// must not be reused.
    fn release(&self, endpoint: Self::Endpoint, state: EndpointState);
}

/// Protocol state of an endpoint at release time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    /// No request in flight; safe to reuse.
    Clean,
    /// A request was started but its reply was not fully read.
    Poisoned,
}

/// Exclusive use of one endpoint for the duration of an operation.
pub struct Lease<'a, C: ConnectPolicy> {
    policy: &'a C,
    endpoint: ManuallyDrop<C::Endpoint>,
    state: EndpointState,
}

impl<'a, C: ConnectPolicy> Lease<'a, C> {
    /// Wrap a freshly acquired endpoint. Dropping the lease releases it to
    /// `policy`.
    pub fn new(policy: &'a C, endpoint: C::Endpoint) -> Self {
        Self {
            policy,
            endpoint: ManuallyDrop::new(endpoint),
            state: EndpointState::Clean,
        }
    }

    #[inline]
    pub fn endpoint(&mut self) -> &mut C::Endpoint {
        &mut self.endpoint
    }

    #[inline]
    pub fn state(&self) -> EndpointState {
        self.state
    }

    /// Mark the endpoint as mid-exchange. Call before the first byte is written.
    #[inline]
    pub fn poison(&mut self) {
        self.state = EndpointState::Poisoned;
    }

    /// Mark the endpoint reusable again. Call once the reply is fully read.
    #[inline]
    pub fn settle(&mut self) {
        self.state = EndpointState::Clean;
    }
}

impl<C: ConnectPolicy> Drop for Lease<'_, C> {
    fn drop(&mut self) {
        // Safety: `endpoint` is only taken here, and `drop` runs once.
        let endpoint = unsafe { ManuallyDrop::take(&mut self.endpoint) };
        self.policy.release(endpoint, self.state);
    }
}

/// Opens endpoints for a connect policy.
pub trait Dial {
    type Endpoint: Read + Write;

    /// Open a new endpoint. Failures are [`Error::Connection`].
    fn dial(&self) -> Result<Self::Endpoint, Error>;

    /// Human-readable peer name for logs.
    fn peer(&self) -> &str;
}

/// Per-policy lease accounting.
#[derive(Debug, Default)]
pub(crate) struct LeaseStats {
    acquired: AtomicU64,
    released: AtomicU64,
    poisoned: AtomicU64,
    dialed: AtomicU64,
    reused: AtomicU64,
}

/// Snapshot of a connect policy's lease accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeaseCounts {
    /// Successful acquires.
    pub acquired: u64,
    /// Releases, clean or poisoned.
    pub released: u64,
    /// Releases of endpoints abandoned mid-exchange.
    pub poisoned: u64,
    /// Endpoints opened through the dialer.
    pub dialed: u64,
    /// Acquires served from an idle pooled endpoint.
    pub reused: u64,
}

impl LeaseCounts {
    /// Leases currently outstanding.
    pub fn outstanding(&self) -> u64 {
        self.acquired - self.released
    }
}

impl LeaseStats {
    pub(crate) fn on_dial(&self) {
        self.dialed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn on_reuse(&self) {
        self.reused.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn on_acquire(&self) {
        self.acquired.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn on_release(&self, state: EndpointState) {
        if state == EndpointState::Poisoned {
            self.poisoned.fetch_add(1, Ordering::Relaxed);
        }
        self.released.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> LeaseCounts {
        LeaseCounts {
            acquired: self.acquired.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            poisoned: self.poisoned.load(Ordering::Relaxed),
            dialed: self.dialed.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_releases_once_with_state() {
        let policy = Dedicated::new(MemoryServer::new());
        {
            let lease = policy.acquire().unwrap();
            assert_eq!(lease.state(), EndpointState::Clean);
        }
        {
            let mut lease = policy.acquire().unwrap();
            lease.poison();
        }
        {
            let mut lease = policy.acquire().unwrap();
            lease.poison();
            lease.settle();
        }
        let counts = policy.stats();
        assert_eq!(counts.acquired, 3);
        assert_eq!(counts.released, 3);
        assert_eq!(counts.poisoned, 1);
        assert_eq!(counts.outstanding(), 0);
    }

    #[test]
    fn test_lease_released_on_unwind() {
        let policy = Dedicated::new(MemoryServer::new());
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut lease = policy.acquire().unwrap();
            lease.poison();
            panic!("operation abandoned");
        }));
        assert!(result.is_err());
        let counts = policy.stats();
        assert_eq!(counts.released, 1);
        assert_eq!(counts.poisoned, 1);
    }
}
