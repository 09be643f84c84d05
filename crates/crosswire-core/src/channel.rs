//! RpcChannel: multiplexes concurrent calls over one connection.
//!
//! The key invariant is that only [`RpcChannel::run`] calls
//! [`Connection::recv`]; all inbound routing happens through the single
//! read loop. Outbound calls register a waiter in the outstanding-call
//! table before writing their request, then suspend until one of four
//! resolutions wins:
//!
//! ```text
//!                    ┌──────────────────────────────────┐
//!                    │            RpcChannel            │
//!                    ├──────────────────────────────────┤
//!                    │  conn: Connection                │
//!                    │  pending: HashMap<request_id,    │
//!                    │           oneshot::Sender>       │
//!                    │  router: Option<CallbackRouter>  │
//!                    └────────────────┬─────────────────┘
//!                                     │
//!                                read loop
//!                                     │
//!        ┌────────────────────────────┼────────────────────────────┐
//!        │                            │                            │
//!   response? (pending)          request? (router)         cancel? (inflight)
//!        │                            │                            │
//!  ┌─────▼──────┐        ┌────────────▼────────────┐    ┌──────────▼─────────┐
//!  │ resolve +  │        │ spawn dispatch, write   │    │ cancel the matching│
//!  │ remove     │        │ response back           │    │ invocation's token │
//!  └────────────┘        └─────────────────────────┘    └────────────────────┘
//! ```
//!
//! A call resolves exactly once: matching response, timeout, caller
//! cancellation, or channel teardown. Whichever fires first wins and the
//! rest become no-ops. Teardown (disposal, peer close, protocol error)
//! fails every call outstanding at that moment.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::connection::Connection;
use crate::dispatch::CallbackRouter;
use crate::error::{ConnectionError, RpcError};
use crate::wire::{CancellationRequest, ErrorInfo, Message, Request, Response};

/// Internal resolution of a pending call.
///
/// Timeout and caller cancellation are decided at the call site; the table
/// side only ever delivers a completed response or a lost connection.
#[derive(Debug)]
enum CallOutcome {
    Completed(Response),
    ConnectionLost,
}

/// Per-call options: effective timeout and caller-supplied cancellation.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// `None` means no deadline.
    pub timeout: Option<Duration>,
    /// `None` means the call is not cancelable.
    pub cancel: Option<CancellationToken>,
}

/// Outstanding-call table. `closed` lives under the same lock so that no
/// new call can register once teardown has begun.
struct PendingTable {
    closed: bool,
    calls: HashMap<String, oneshot::Sender<CallOutcome>>,
}

struct ChannelInner {
    conn: Connection,
    pending: Mutex<PendingTable>,
    /// Callback implementations for inbound requests.
    router: Mutex<Option<Arc<CallbackRouter>>>,
    /// Inbound invocations currently running, by request id, so a peer
    /// `CancellationRequest` can abort them.
    inflight: Mutex<HashMap<String, CancellationToken>>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
}

#[derive(Clone)]
pub struct RpcChannel {
    inner: Arc<ChannelInner>,
}

impl std::fmt::Debug for RpcChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcChannel")
            .field("closed", &self.is_closed())
            .field("outstanding", &self.outstanding())
            .finish_non_exhaustive()
    }
}

/// Removes the pending entry when a call path unwinds without resolving
/// through the table (send failure, caller dropped the future).
struct PendingGuard<'a> {
    inner: &'a ChannelInner,
    id: &'a str,
    armed: bool,
}

impl PendingGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if self.inner.pending.lock().calls.remove(self.id).is_some() {
            tracing::debug!(request_id = %self.id, "call dropped; removed pending entry");
        }
    }
}

impl RpcChannel {
    pub fn new(conn: Connection) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                conn,
                pending: Mutex::new(PendingTable {
                    closed: false,
                    calls: HashMap::new(),
                }),
                router: Mutex::new(None),
                inflight: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Bind the callback implementations served over this channel.
    ///
    /// Inbound requests arriving while no router is bound are answered with
    /// an endpoint-not-found error so the peer never hangs.
    pub fn set_router(&self, router: Arc<CallbackRouter>) {
        *self.inner.router.lock() = Some(router);
    }

    /// True once teardown has begun or the connection has terminated.
    ///
    /// This is authoritative for pooling: the read loop flips it the moment
    /// the peer closes the stream.
    pub fn is_closed(&self) -> bool {
        self.inner.pending.lock().closed || self.inner.conn.is_closed()
    }

    /// Number of calls currently awaiting a response (for diagnostics).
    pub fn outstanding(&self) -> usize {
        self.inner.pending.lock().calls.len()
    }

    /// Request ids currently awaiting a response, sorted (for diagnostics).
    pub fn outstanding_ids(&self) -> Vec<String> {
        let table = self.inner.pending.lock();
        let mut ids: Vec<String> = table.calls.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Perform one logical call and await its resolution.
    pub async fn call(
        &self,
        endpoint: &str,
        method_name: &str,
        parameters: Vec<String>,
        options: CallOptions,
    ) -> Result<Response, RpcError> {
        let id = self.inner.next_request_id();
        let rx = self.inner.register(&id)?;
        let mut guard = PendingGuard {
            inner: self.inner.as_ref(),
            id: id.as_str(),
            armed: true,
        };

        let request = Request {
            id: id.clone(),
            endpoint: endpoint.to_string(),
            method_name: method_name.to_string(),
            parameters,
            timeout_seconds: options.timeout.map(|d| d.as_secs_f64()).unwrap_or(0.0),
        };
        self.inner.conn.send(&Message::Request(request)).await?;

        tracing::debug!(
            request_id = %id,
            endpoint,
            method = method_name,
            timeout = ?options.timeout,
            "request sent"
        );

        let deadline = async {
            match options.timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };
        let canceled = async {
            match options.cancel.as_ref() {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };

        let outcome = tokio::select! {
            resolved = rx => match resolved {
                Ok(outcome) => outcome,
                // The sender can only disappear mid-teardown.
                Err(_) => CallOutcome::ConnectionLost,
            },
            _ = deadline => {
                tracing::debug!(request_id = %id, timeout = ?options.timeout, "call timed out");
                self.inner.abandon(&id);
                guard.disarm();
                return Err(RpcError::Timeout);
            }
            _ = canceled => {
                tracing::debug!(request_id = %id, "call canceled by caller");
                self.inner.abandon(&id);
                guard.disarm();
                return Err(RpcError::Canceled);
            }
        };
        guard.disarm();

        match outcome {
            CallOutcome::Completed(response) => Ok(response),
            CallOutcome::ConnectionLost => Err(ConnectionError::Closed.into()),
        }
    }

    /// Fire-and-forget: send the request and resolve on successful write.
    ///
    /// Any response the peer writes for this id is dropped by the read loop
    /// as unmatched, which is not an error.
    pub async fn notify(
        &self,
        endpoint: &str,
        method_name: &str,
        parameters: Vec<String>,
    ) -> Result<(), RpcError> {
        if self.is_closed() {
            return Err(ConnectionError::Closed.into());
        }
        let id = self.inner.next_request_id();
        let request = Request {
            id: id.clone(),
            endpoint: endpoint.to_string(),
            method_name: method_name.to_string(),
            parameters,
            timeout_seconds: 0.0,
        };
        self.inner.conn.send(&Message::Request(request)).await?;
        tracing::debug!(request_id = %id, endpoint, method = method_name, "one-way request sent");
        Ok(())
    }

    /// Run the read loop until the connection terminates or the channel is
    /// disposed. Exactly one task may run this per channel.
    pub async fn run(&self) {
        tracing::debug!("read loop starting");
        loop {
            let message = tokio::select! {
                _ = self.inner.shutdown.cancelled() => break,
                received = self.inner.conn.recv() => match received {
                    Ok(Some(message)) => message,
                    Ok(None) => {
                        tracing::debug!("peer closed the stream");
                        break;
                    }
                    Err(e) => {
                        if e.is_fatal() {
                            tracing::error!(error = %e, "read loop terminating");
                        } else {
                            tracing::debug!(error = %e, "read loop terminating");
                        }
                        break;
                    }
                },
            };

            match message {
                Message::Response(response) => self.inner.resolve(response),
                Message::Request(request) => self.handle_request(request),
                Message::Cancel(cancel) => self.inner.cancel_inflight(&cancel.request_id),
            }
        }
        self.inner.teardown().await;
    }

    /// Tear the channel down: stop the read loop, close the connection, and
    /// fail every outstanding call. Idempotent and safe to call
    /// concurrently.
    pub async fn dispose(&self) {
        self.inner.teardown().await;
    }

    fn handle_request(&self, request: Request) {
        let router = self.inner.router.lock().clone();
        let id = request.id.clone();
        let endpoint = request.endpoint.clone();

        let cancel = CancellationToken::new();
        self.inner.inflight.lock().insert(id.clone(), cancel.clone());

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let response = match router {
                Some(router) => {
                    // A panicking handler must not take the channel down;
                    // the peer still gets a response for this id.
                    match AssertUnwindSafe(router.dispatch(request, cancel))
                        .catch_unwind()
                        .await
                    {
                        Ok(response) => response,
                        Err(panic) => {
                            let message = if let Some(s) = panic.downcast_ref::<&str>() {
                                format!("panic in callback handler: {s}")
                            } else if let Some(s) = panic.downcast_ref::<String>() {
                                format!("panic in callback handler: {s}")
                            } else {
                                "panic in callback handler".to_string()
                            };
                            tracing::error!(request_id = %id, message = %message, "callback panicked");
                            Response::failure(id.clone(), ErrorInfo::panic(message))
                        }
                    }
                }
                None => {
                    tracing::warn!(request_id = %id, endpoint = %endpoint, "no router bound; rejecting request");
                    Response::failure(id.clone(), ErrorInfo::endpoint_not_found(&endpoint))
                }
            };

            inner.inflight.lock().remove(&id);
            if let Err(e) = inner.conn.send(&Message::Response(response)).await {
                tracing::warn!(request_id = %id, error = %e, "failed to write callback response");
            }
        });
    }
}

impl ChannelInner {
    fn next_request_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    /// Register a pending call. Refused once teardown has begun.
    fn register(&self, id: &str) -> Result<oneshot::Receiver<CallOutcome>, RpcError> {
        let mut table = self.pending.lock();
        if table.closed || self.conn.is_closed() {
            return Err(ConnectionError::Closed.into());
        }
        let (tx, rx) = oneshot::channel();
        let previous = table.calls.insert(id.to_string(), tx);
        debug_assert!(previous.is_none(), "request id reused while outstanding");
        Ok(rx)
    }

    /// Deliver a response to its waiter. Unmatched ids are dropped silently.
    fn resolve(&self, response: Response) {
        let waiter = self.pending.lock().calls.remove(&response.request_id);
        match waiter {
            Some(tx) => {
                tracing::debug!(request_id = %response.request_id, "delivering response");
                let _ = tx.send(CallOutcome::Completed(response));
            }
            None => {
                tracing::debug!(
                    request_id = %response.request_id,
                    "no pending call for response; dropping"
                );
            }
        }
    }

    /// Locally abandon a call (timeout or cancellation) and best-effort
    /// notify the peer. The notification is never awaited by the caller
    /// path and its failure is never fatal.
    fn abandon(&self, id: &str) {
        if self.pending.lock().calls.remove(id).is_none() {
            return;
        }
        let conn = self.conn.clone();
        let notice = CancellationRequest {
            request_id: id.to_string(),
        };
        tokio::spawn(async move {
            if let Err(e) = conn.send(&Message::Cancel(notice)).await {
                tracing::debug!(error = %e, "failed to send cancellation notice");
            }
        });
    }

    /// Signal the in-flight invocation for `request_id`, if any.
    fn cancel_inflight(&self, request_id: &str) {
        match self.inflight.lock().get(request_id) {
            Some(token) => {
                tracing::debug!(request_id, "canceling in-flight callback");
                token.cancel();
            }
            None => {
                tracing::debug!(request_id, "cancellation for unknown invocation; ignoring");
            }
        }
    }

    async fn teardown(&self) {
        let drained: Vec<(String, oneshot::Sender<CallOutcome>)> = {
            let mut table = self.pending.lock();
            if table.closed {
                return;
            }
            table.closed = true;
            table.calls.drain().collect()
        };

        self.shutdown.cancel();
        self.conn.close();
        // Shut the write half down off-path: a write stuck against a dead
        // peer must not be able to stall disposal.
        let conn = self.conn.clone();
        tokio::spawn(async move { conn.shutdown().await });

        if !drained.is_empty() {
            tracing::warn!(count = drained.len(), "failing outstanding calls on teardown");
        }
        for (id, tx) in drained {
            tracing::debug!(request_id = %id, "failing call: connection lost");
            let _ = tx.send(CallOutcome::ConnectionLost);
        }

        for (_, token) in self.inflight.lock().drain() {
            token.cancel();
        }
    }
}
