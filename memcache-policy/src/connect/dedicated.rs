use tracing::{debug, trace};

use super::{ConnectPolicy, Dial, EndpointState, Lease, LeaseCounts, LeaseStats, TcpDialer};
use crate::Error;
use crate::config::EndpointConfig;
use crate::metrics;

/// One endpoint per operation.
///
/// Every acquire dials a new endpoint and every release closes it. Because an
/// endpoint never outlives its operation, an abandoned exchange needs no
/// cleanup beyond the close.
pub struct Dedicated<D = TcpDialer> {
    dialer: D,
    stats: LeaseStats,
}

impl<D: Dial> Dedicated<D> {
    pub fn new(dialer: D) -> Self {
        Self {
            dialer,
            stats: LeaseStats::default(),
        }
    }

    pub fn dialer(&self) -> &D {
        &self.dialer
    }

    pub fn stats(&self) -> LeaseCounts {
        self.stats.snapshot()
    }
}

impl Dedicated<TcpDialer> {
    /// Dial `config.server` over TCP for every operation.
    pub fn tcp(config: EndpointConfig) -> Self {
        Self::new(TcpDialer::new(config))
    }
}

impl<D: Dial> ConnectPolicy for Dedicated<D> {
    type Endpoint = D::Endpoint;

    fn acquire(&self) -> Result<Lease<'_, Self>, Error> {
        let endpoint = self.dialer.dial().inspect_err(|_| {
            metrics::CONNECT_ERRORS.increment();
        })?;
        self.stats.on_dial();
        self.stats.on_acquire();
        trace!(role = "connect", peer = self.dialer.peer(), "dialed dedicated endpoint");
        Ok(Lease::new(self, endpoint))
    }

    fn release(&self, endpoint: Self::Endpoint, state: EndpointState) {
        self.stats.on_release(state);
        if state == EndpointState::Poisoned {
            metrics::ENDPOINTS_DISCARDED.increment();
            debug!(role = "connect", peer = self.dialer.peer(), "closing endpoint released mid-exchange");
        }
        metrics::ENDPOINTS_CLOSED.increment();
        drop(endpoint);
    }
}
