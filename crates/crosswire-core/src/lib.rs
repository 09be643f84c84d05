//! crosswire-core: channel, framing, and callback dispatch for the
//! crosswire RPC framework.
//!
//! This crate defines:
//! - Wire messages ([`Request`], [`Response`], [`CancellationRequest`],
//!   [`ErrorInfo`])
//! - The length-delimited frame codec ([`frame`])
//! - [`Connection`]: one duplex stream plus the codec
//! - [`RpcChannel`]: the multiplexing layer with the outstanding-call table
//! - [`CallbackRouter`]: dispatch of inbound (reverse-direction) requests
//! - The error taxonomy ([`RpcError`] and friends)
//!
//! Connection pooling and the per-interface client façade live in the
//! `crosswire` crate.

mod channel;
mod connection;
mod dispatch;
mod error;
pub mod frame;
mod limits;
mod wire;

pub use channel::{CallOptions, RpcChannel};
pub use connection::Connection;
pub use dispatch::{CallbackRouter, EndpointBuilder, FromParams, MethodError, RouterBuilder};
pub use error::{ConnectionError, ProtocolError, RemoteError, RpcError};
pub use limits::{Limits, MAX_FRAME_LEN};
pub use wire::{CancellationRequest, ErrorInfo, Message, Request, Response};

// Re-exported so downstream crates use the same cancellation type without
// depending on tokio-util directly.
pub use tokio_util::sync::CancellationToken;
