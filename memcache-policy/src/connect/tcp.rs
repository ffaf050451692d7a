use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};

use tracing::debug;

use super::Dial;
use crate::Error;
use crate::config::EndpointConfig;
use crate::metrics;

/// Dials plain TCP connections to one memcache server.
#[derive(Debug, Clone)]
pub struct TcpDialer {
    config: EndpointConfig,
}

impl TcpDialer {
    pub fn new(config: EndpointConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    fn connect_addr(&self, addr: &SocketAddr) -> io::Result<TcpStream> {
        let stream = match self.config.connect_timeout() {
            Some(timeout) => TcpStream::connect_timeout(addr, timeout)?,
            None => TcpStream::connect(addr)?,
        };
        stream.set_nodelay(self.config.tcp_nodelay)?;
        stream.set_read_timeout(self.config.io_timeout())?;
        stream.set_write_timeout(self.config.io_timeout())?;
        Ok(stream)
    }
}

impl Dial for TcpDialer {
    type Endpoint = TcpStream;

    fn dial(&self) -> Result<TcpStream, Error> {
        let addrs = self
            .config
            .server
            .to_socket_addrs()
            .map_err(Error::Connection)?;

        let mut last_err = None;
        for addr in addrs {
            match self.connect_addr(&addr) {
                Ok(stream) => {
                    metrics::ENDPOINTS_OPENED.increment();
                    return Ok(stream);
                }
                Err(e) => {
                    debug!(role = "connect", %addr, error = %e, "dial failed");
                    last_err = Some(e);
                }
            }
        }
        Err(Error::Connection(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "server address resolved to nothing")
        })))
    }

    fn peer(&self) -> &str {
        &self.config.server
    }
}
