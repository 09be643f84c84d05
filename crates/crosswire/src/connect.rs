//! Establishing duplex streams for pooled connections.
//!
//! Transport establishment is deliberately thin: a [`Connect`]
//! implementation produces a live [`Connection`] for an [`Address`] or
//! fails with a connection error. Everything above it (pooling, channels)
//! is transport-agnostic.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use crosswire_core::{Connection, ConnectionError, Limits, RpcError};

/// Address of a peer, the transport-facing half of a connection key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    /// Host:port, e.g. `127.0.0.1:9000`.
    Tcp(String),
    /// Path to a Unix domain socket.
    Unix(PathBuf),
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "tcp:{addr}"),
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// Produce a duplex byte stream for an address, or fail.
pub trait Connect: Send + Sync + 'static {
    fn connect<'a>(
        &'a self,
        address: &'a Address,
    ) -> Pin<Box<dyn Future<Output = Result<Connection, RpcError>> + Send + 'a>>;
}

/// Default connector: TCP and Unix domain sockets via tokio.
#[derive(Debug, Clone, Default)]
pub struct SocketConnector {
    limits: Limits,
}

impl SocketConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: Limits) -> Self {
        Self { limits }
    }
}

impl Connect for SocketConnector {
    fn connect<'a>(
        &'a self,
        address: &'a Address,
    ) -> Pin<Box<dyn Future<Output = Result<Connection, RpcError>> + Send + 'a>> {
        Box::pin(async move {
            tracing::debug!(address = %address, "connecting");
            match address {
                Address::Tcp(addr) => {
                    let stream = tokio::net::TcpStream::connect(addr.as_str()).await.map_err(|e| {
                        ConnectionError::Connect {
                            address: address.to_string(),
                            source: e,
                        }
                    })?;
                    Ok(Connection::with_limits(stream, self.limits))
                }
                #[cfg(unix)]
                Address::Unix(path) => {
                    let stream = tokio::net::UnixStream::connect(path).await.map_err(|e| {
                        ConnectionError::Connect {
                            address: address.to_string(),
                            source: e,
                        }
                    })?;
                    Ok(Connection::with_limits(stream, self.limits))
                }
                #[cfg(not(unix))]
                Address::Unix(_) => Err(ConnectionError::Connect {
                    address: address.to_string(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::Unsupported,
                        "unix sockets are not available on this platform",
                    ),
                }
                .into()),
            }
        })
    }
}
