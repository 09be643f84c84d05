//! crosswire: cross-process duplex RPC.
//!
//! Clients invoke interface methods that are turned into requests over a
//! persistent duplex stream; servers may symmetrically call back into
//! clients over the same physical connection.
//!
//! # Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use crosswire::prelude::*;
//!
//! // Serving side: a method table bound to every accepted connection.
//! let router = Arc::new(
//!     CallbackRouter::builder()
//!         .endpoint("Calc", |e| {
//!             e.method("Add", |(a, b): (i32, i32)| async move { Ok(a + b) })
//!         })
//!         .build(),
//! );
//! tokio::spawn(crosswire::server::serve_listener(listener, router));
//!
//! // Calling side: a pooled client per (endpoint, address).
//! let pool = ConnectionPool::new(Arc::new(SocketConnector::new()));
//! let calc = ServiceClient::builder("Calc", Address::Tcp("127.0.0.1:9000".into()))
//!     .default_timeout(std::time::Duration::from_secs(5))
//!     .build(&pool);
//!
//! let sum: i32 = calc.call("Add").arg(2).arg(3).send().await?;
//! assert_eq!(sum, 5);
//! ```
//!
//! # Reverse RPC
//!
//! A client that registers callbacks advertises them over its own
//! connection; the server reaches them through the channel handle returned
//! by [`server::serve_connection`]:
//!
//! ```ignore
//! let progress = Arc::new(
//!     CallbackRouter::builder()
//!         .endpoint("Progress", |e| {
//!             e.method("Report", |(pct,): (u32,)| async move { Ok(pct) })
//!         })
//!         .build(),
//! );
//! let client = ServiceClient::builder("Jobs", address)
//!     .callbacks(progress)
//!     .build(&pool);
//! ```
//!
//! # Error handling
//!
//! Every call resolves exactly once: a value, or one of
//! [`RpcError::Timeout`], [`RpcError::Canceled`], [`RpcError::Remote`],
//! [`RpcError::Connection`], [`RpcError::Serialization`]. Connection and
//! protocol faults fail all calls outstanding on the channel; the next call
//! reconnects through the pool.

pub mod client;
pub mod connect;
pub mod pool;
pub mod server;

pub use client::{CallBuilder, ServiceClient, ServiceClientBuilder};
pub use connect::{Address, Connect, SocketConnector};
pub use pool::{ConnectionKey, ConnectionPool};

// Core types, re-exported so most applications depend on this crate alone.
pub use crosswire_core::{
    CallOptions, CallbackRouter, CancellationToken, Connection, ConnectionError, EndpointBuilder,
    ErrorInfo, Limits, MethodError, ProtocolError, RemoteError, RouterBuilder, RpcChannel,
    RpcError,
};

/// Convenient imports for applications.
pub mod prelude {
    pub use crate::client::ServiceClient;
    pub use crate::connect::{Address, SocketConnector};
    pub use crate::pool::{ConnectionKey, ConnectionPool};
    pub use crosswire_core::{
        CallbackRouter, CancellationToken, MethodError, RemoteError, RpcError,
    };
}
