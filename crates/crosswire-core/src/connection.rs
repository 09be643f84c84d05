//! One duplex byte stream plus the frame codec.
//!
//! A `Connection` owns the split halves of a stream. Sends from concurrent
//! tasks are serialized by the writer lock and each frame is emitted with a
//! single write, so two messages never interleave on the wire. Receiving is
//! single-consumer by construction: only a channel's read loop calls
//! [`Connection::recv`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex as AsyncMutex;

use crate::error::{ConnectionError, RpcError};
use crate::frame;
use crate::limits::Limits;
use crate::wire::Message;

#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnInner>,
}

struct ConnInner {
    reader: AsyncMutex<Box<dyn AsyncRead + Unpin + Send + Sync>>,
    writer: AsyncMutex<Box<dyn AsyncWrite + Unpin + Send + Sync>>,
    closed: AtomicBool,
    limits: Limits,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Wrap an established duplex stream (TCP, Unix socket, in-memory).
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static,
    {
        Self::with_limits(stream, Limits::default())
    }

    pub fn with_limits<S>(stream: S, limits: Limits) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            inner: Arc::new(ConnInner {
                reader: AsyncMutex::new(Box::new(reader)),
                writer: AsyncMutex::new(Box::new(writer)),
                closed: AtomicBool::new(false),
                limits,
            }),
        }
    }

    /// Create a connected in-memory pair for tests.
    pub fn pair() -> (Self, Self) {
        let (a, b) = tokio::io::duplex(65536);
        (Self::new(a), Self::new(b))
    }

    /// Serialize and write one message as a single frame.
    pub async fn send(&self, message: &Message) -> Result<(), RpcError> {
        if self.is_closed() {
            return Err(ConnectionError::Closed.into());
        }

        // Serialize before taking the lock; only the write itself is held.
        let encoded = frame::encode_frame(message)?;

        let mut writer = self.inner.writer.lock().await;
        writer
            .write_all(&encoded)
            .await
            .map_err(write_error)?;
        writer.flush().await.map_err(write_error)?;
        Ok(())
    }

    /// Read the next inbound message.
    ///
    /// Returns `Ok(None)` when the peer closed the stream cleanly. Exactly
    /// one logical consumer may drive this; concurrent readers would race
    /// for frames.
    pub async fn recv(&self) -> Result<Option<Message>, RpcError> {
        if self.is_closed() {
            return Err(ConnectionError::Closed.into());
        }

        let mut reader = self.inner.reader.lock().await;
        frame::read_message(&mut *reader, self.inner.limits.max_frame_len).await
    }

    /// Mark the connection closed. Subsequent sends and receives fail.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }

    /// Close and shut down the write half so the peer observes end-of-stream.
    pub async fn shutdown(&self) {
        self.close();
        let mut writer = self.inner.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            tracing::debug!(error = %e, "write-half shutdown failed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

fn write_error(e: std::io::Error) -> RpcError {
    if e.kind() == std::io::ErrorKind::BrokenPipe
        || e.kind() == std::io::ErrorKind::ConnectionReset
    {
        ConnectionError::Closed.into()
    } else {
        ConnectionError::Io(e).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{Request, Response};

    fn request(id: &str) -> Message {
        Message::Request(Request {
            id: id.into(),
            endpoint: "Echo".into(),
            method_name: "Ping".into(),
            parameters: vec![],
            timeout_seconds: 0.0,
        })
    }

    #[tokio::test]
    async fn send_and_recv() {
        let (a, b) = Connection::pair();
        a.send(&request("1")).await.unwrap();

        let got = b.recv().await.unwrap().unwrap();
        assert_eq!(got, request("1"));
    }

    #[tokio::test]
    async fn bidirectional() {
        let (a, b) = Connection::pair();
        a.send(&request("from-a")).await.unwrap();
        b.send(&request("from-b")).await.unwrap();

        assert_eq!(b.recv().await.unwrap().unwrap(), request("from-a"));
        assert_eq!(a.recv().await.unwrap().unwrap(), request("from-b"));
    }

    #[tokio::test]
    async fn concurrent_senders_do_not_tear_frames() {
        let (a, b) = Connection::pair();

        let mut senders = Vec::new();
        for i in 0..16u32 {
            let a = a.clone();
            senders.push(tokio::spawn(async move {
                let message = Message::Response(Response::success(
                    i.to_string(),
                    // Large enough that a torn frame would corrupt the stream.
                    format!("\"{}\"", "x".repeat(2048)),
                ));
                a.send(&message).await.unwrap();
            }));
        }

        let mut seen = std::collections::HashSet::new();
        for _ in 0..16 {
            match b.recv().await.unwrap().unwrap() {
                Message::Response(resp) => {
                    assert!(seen.insert(resp.request_id));
                }
                other => panic!("unexpected message: {other:?}"),
            }
        }
        for handle in senders {
            handle.await.unwrap();
        }
        assert_eq!(seen.len(), 16);
    }

    #[tokio::test]
    async fn send_on_closed_connection_fails() {
        let (a, _b) = Connection::pair();
        a.close();
        assert!(matches!(
            a.send(&request("1")).await,
            Err(RpcError::Connection(ConnectionError::Closed))
        ));
    }

    #[tokio::test]
    async fn peer_shutdown_ends_the_inbound_sequence() {
        let (a, b) = Connection::pair();
        a.shutdown().await;
        assert!(b.recv().await.unwrap().is_none());
    }
}
