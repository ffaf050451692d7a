//! Ready-made profiles.
//!
//! Custom ones are a few lines: an empty enum and an `impl Profile` naming a
//! policy per role.

use crate::Client;
use crate::commit::{Autocommit, Batched};
use crate::config::{ConfigError, PoolConfig};
use crate::connect::{MemoryServer, Pooled, TcpDialer};
use crate::container::Plain;
use crate::exception::Propagate;
use crate::request::TextRequest;
use crate::resolve::Profile;

/// Pooled TCP, immediate execution, failures propagated, plain values.
#[derive(Debug)]
pub enum Standard {}

impl Profile for Standard {
    type Connect = Pooled<TcpDialer>;
    type Request = TextRequest;
    type Exception = Propagate;
    type Commit = Autocommit;
    type Container = Plain;
}

/// [`Standard`], with mutations queued until flushed.
#[derive(Debug)]
pub enum Batching {}

impl Profile for Batching {
    type Connect = Pooled<TcpDialer>;
    type Request = TextRequest;
    type Exception = Propagate;
    type Commit = Batched;
    type Container = Plain;
}

/// [`Standard`] against an in-process [`MemoryServer`].
#[derive(Debug)]
pub enum InMemory {}

impl Profile for InMemory {
    type Connect = Pooled<MemoryServer>;
    type Request = TextRequest;
    type Exception = Propagate;
    type Commit = Autocommit;
    type Container = Plain;
}

impl Client<Standard> {
    /// Client for the server in `config`. No connection is made until the
    /// first operation.
    pub fn connect(config: PoolConfig) -> Result<Self, ConfigError> {
        config.endpoint.validate()?;
        Ok(Self::with_connect(Pooled::tcp(config)))
    }
}

impl Client<Batching> {
    /// Batching client for the server in `config`; queued mutations that
    /// fail abort the rest of their batch.
    pub fn connect_batched(config: PoolConfig) -> Result<Self, ConfigError> {
        config.endpoint.validate()?;
        Ok(Self::with_connect(Pooled::tcp(config)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndpointConfig;

    #[test]
    fn test_connect_is_lazy() {
        // Nothing listens here; building the client must still succeed.
        let config = PoolConfig {
            endpoint: EndpointConfig::new("127.0.0.1:1"),
            max_idle: 1,
        };
        let client = Client::<Standard>::connect(config).unwrap();
        assert_eq!(client.pending(), 0);
        let err = client.version().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Connection);
    }

    #[test]
    fn test_connect_rejects_empty_server() {
        let config = PoolConfig {
            endpoint: EndpointConfig::new(""),
            max_idle: 1,
        };
        assert!(Client::<Batching>::connect_batched(config).is_err());
    }

    #[test]
    fn test_in_memory() {
        let server = MemoryServer::new();
        let client = Client::<InMemory>::with_connect(Pooled::new(server.clone(), 2));
        client.set("n", &5u64).unwrap();
        assert_eq!(client.incr("n", 2).unwrap(), Some(7));
        assert_eq!(client.get::<u64>("n").unwrap(), Some(7));
        assert_eq!(client.context().resolve::<crate::tags::Connect>().stats().dialed, 1);
    }
}
