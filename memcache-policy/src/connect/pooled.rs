use parking_lot::Mutex;
use tracing::{debug, trace};

use super::{ConnectPolicy, Dial, EndpointState, Lease, LeaseCounts, LeaseStats, TcpDialer};
use crate::Error;
use crate::config::PoolConfig;
use crate::metrics;

/// Reuses endpoints across operations.
///
/// Idle endpoints sit behind a mutex; acquire pops one or dials a new one when
/// none is idle, so concurrent operations never share an endpoint. Clean
/// releases go back to the idle list until it holds `max_idle` endpoints;
/// further releases are closed. Poisoned releases are always closed: an
/// endpoint with a half-finished exchange is never handed out again.
///
/// A pooled endpoint the server has since closed is not detected on acquire;
/// the next operation on it fails with an I/O error and the endpoint is
/// discarded. The pool does not retry.
pub struct Pooled<D: Dial = TcpDialer> {
    dialer: D,
    idle: Mutex<Vec<D::Endpoint>>,
    max_idle: usize,
    stats: LeaseStats,
}

impl<D: Dial> Pooled<D> {
    pub fn new(dialer: D, max_idle: usize) -> Self {
        Self {
            dialer,
            idle: Mutex::new(Vec::with_capacity(max_idle)),
            max_idle,
            stats: LeaseStats::default(),
        }
    }

    pub fn dialer(&self) -> &D {
        &self.dialer
    }

    /// Number of idle endpoints held for reuse.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    pub fn max_idle(&self) -> usize {
        self.max_idle
    }

    /// Close every idle endpoint. Leased endpoints are unaffected.
    pub fn close_all(&self) {
        let drained: Vec<_> = self.idle.lock().drain(..).collect();
        for _ in &drained {
            metrics::ENDPOINTS_CLOSED.increment();
        }
        debug!(role = "connect", peer = self.dialer.peer(), closed = drained.len(), "closed idle endpoints");
    }

    pub fn stats(&self) -> LeaseCounts {
        self.stats.snapshot()
    }
}

impl Pooled<TcpDialer> {
    pub fn tcp(config: PoolConfig) -> Self {
        Self::new(TcpDialer::new(config.endpoint), config.max_idle)
    }
}

impl<D: Dial> ConnectPolicy for Pooled<D> {
    type Endpoint = D::Endpoint;

    fn acquire(&self) -> Result<Lease<'_, Self>, Error> {
        let reused = self.idle.lock().pop();
        let endpoint = match reused {
            Some(endpoint) => {
                self.stats.on_reuse();
                metrics::ENDPOINTS_REUSED.increment();
                trace!(role = "connect", peer = self.dialer.peer(), "reusing pooled endpoint");
                endpoint
            }
            None => {
                let endpoint = self.dialer.dial().inspect_err(|_| {
                    metrics::CONNECT_ERRORS.increment();
                })?;
                self.stats.on_dial();
                trace!(role = "connect", peer = self.dialer.peer(), "dialed pooled endpoint");
                endpoint
            }
        };
        self.stats.on_acquire();
        Ok(Lease::new(self, endpoint))
    }

    fn release(&self, endpoint: Self::Endpoint, state: EndpointState) {
        self.stats.on_release(state);
        if state == EndpointState::Poisoned {
            metrics::ENDPOINTS_DISCARDED.increment();
            metrics::ENDPOINTS_CLOSED.increment();
            debug!(role = "connect", peer = self.dialer.peer(), "discarding endpoint released mid-exchange");
            return;
        }

        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(endpoint);
        } else {
            drop(idle);
            metrics::ENDPOINTS_CLOSED.increment();
            trace!(role = "connect", peer = self.dialer.peer(), "pool full, closing endpoint");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connect::MemoryServer;

    #[test]
    fn test_reuses_clean_endpoints() {
        let pool = Pooled::new(MemoryServer::new(), 2);
        drop(pool.acquire().unwrap());
        drop(pool.acquire().unwrap());
        let counts = pool.stats();
        assert_eq!(counts.dialed, 1);
        assert_eq!(counts.reused, 1);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn test_concurrent_leases_get_distinct_endpoints() {
        let pool = Pooled::new(MemoryServer::new(), 2);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        let c = pool.acquire().unwrap();
        assert_eq!(pool.stats().dialed, 3);
        drop((a, b, c));
        // Only max_idle survive.
        assert_eq!(pool.idle_count(), 2);
        assert_eq!(pool.stats().outstanding(), 0);
    }

    #[test]
    fn test_discards_poisoned_endpoints() {
        let pool = Pooled::new(MemoryServer::new(), 2);
        {
            let mut lease = pool.acquire().unwrap();
            lease.poison();
        }
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(pool.stats().poisoned, 1);

        drop(pool.acquire().unwrap());
        assert_eq!(pool.stats().dialed, 2);
        assert_eq!(pool.stats().reused, 0);
    }

    #[test]
    fn test_close_all() {
        let pool = Pooled::new(MemoryServer::new(), 4);
        let leases: Vec<_> = (0..3).map(|_| pool.acquire().unwrap()).collect();
        drop(leases);
        assert_eq!(pool.idle_count(), 3);
        pool.close_all();
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn test_threads_share_pool() {
        let pool = Pooled::new(MemoryServer::new(), 4);
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..50 {
                        drop(pool.acquire().unwrap());
                    }
                });
            }
        });
        let counts = pool.stats();
        assert_eq!(counts.acquired, 400);
        assert_eq!(counts.released, 400);
        assert_eq!(counts.dialed + counts.reused, 400);
        assert!(pool.idle_count() <= 4);
    }
}
