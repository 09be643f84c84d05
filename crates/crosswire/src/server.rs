//! Server helpers: accept loops that bind a router to each connection.
//!
//! A serving peer is just the other end of a channel: it answers requests
//! through its [`CallbackRouter`] and may issue calls of its own back over
//! the same channel (reverse RPC).

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;

use crosswire_core::{CallbackRouter, Connection, RpcChannel};

/// Wrap an accepted stream in a channel serving `router`, spawn its read
/// loop, and return the channel.
///
/// The returned handle can be used for reverse calls to the connecting
/// peer; drop it if the connection is serve-only.
pub fn serve_connection<S>(stream: S, router: Arc<CallbackRouter>) -> RpcChannel
where
    S: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static,
{
    let channel = RpcChannel::new(Connection::new(stream));
    channel.set_router(router);
    let runner = channel.clone();
    tokio::spawn(async move { runner.run().await });
    channel
}

/// Accept connections forever, serving `router` on each.
///
/// Each accepted connection gets its own channel and read loop. Returns
/// only when `accept` itself fails.
pub async fn serve_listener(
    listener: TcpListener,
    router: Arc<CallbackRouter>,
) -> std::io::Result<()> {
    loop {
        let (socket, peer_addr) = listener.accept().await?;
        tracing::debug!(%peer_addr, "accepted connection");

        let router = router.clone();
        tokio::spawn(async move {
            let channel = RpcChannel::new(Connection::new(socket));
            channel.set_router(router);
            channel.run().await;
            tracing::debug!(%peer_addr, "connection closed");
        });
    }
}
