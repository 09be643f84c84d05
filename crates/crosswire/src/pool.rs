//! Connection pool: one physical connection per connection key.
//!
//! The pool owns a slot per [`ConnectionKey`]. Each slot is guarded by its
//! own async mutex, so two callers racing to connect under the same key
//! serialize on that slot (exactly one physical connect happens) while
//! unrelated keys connect concurrently. Liveness is authoritative: a
//! pooled channel whose connection has terminated is replaced, never
//! returned.
//!
//! The pool is an explicit object with an explicit lifecycle: created by
//! the application, passed by handle to its service clients, disposed with
//! them. There is no process-wide registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;

use crosswire_core::{CallbackRouter, RpcChannel, RpcError};

use crate::connect::{Address, Connect};

/// Identity under which a physical connection is pooled.
///
/// Two keys are equal iff every identity field matches; equal keys resolve
/// to the same pooled connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub address: Address,
    /// Security principal the connection is established as, if any.
    pub identity: Option<String>,
    /// Whether the client advertises callback endpoints over this
    /// connection. A callback-serving connection is never shared with a
    /// callback-free one.
    pub accepts_callbacks: bool,
}

impl ConnectionKey {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            identity: None,
            accepts_callbacks: false,
        }
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn with_callbacks(mut self) -> Self {
        self.accepts_callbacks = true;
        self
    }
}

#[derive(Default)]
struct Slot {
    channel: Option<RpcChannel>,
}

struct PoolInner {
    connector: Arc<dyn Connect>,
    slots: Mutex<HashMap<ConnectionKey, Arc<AsyncMutex<Slot>>>>,
}

/// Pool handle; cheap to clone and share between service clients.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    pub fn new(connector: Arc<dyn Connect>) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                connector,
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Return the live channel for `key`, establishing a new physical
    /// connection if none exists or the existing one is dead.
    ///
    /// `callbacks` is bound to a newly created channel before its read loop
    /// starts, so the peer can invoke them from the first frame on.
    pub async fn get_or_create(
        &self,
        key: &ConnectionKey,
        callbacks: Option<Arc<CallbackRouter>>,
    ) -> Result<RpcChannel, RpcError> {
        let slot = {
            let mut slots = self.inner.slots.lock();
            slots.entry(key.clone()).or_default().clone()
        };

        // Per-key exclusive section: concurrent callers for the same key
        // wait here instead of opening redundant connections.
        let mut slot = slot.lock().await;

        if let Some(channel) = slot.channel.as_ref() {
            if !channel.is_closed() {
                tracing::debug!(key = %key.address, "reusing pooled channel");
                return Ok(channel.clone());
            }
            tracing::debug!(key = %key.address, "pooled channel is dead; reconnecting");
        }

        let conn = self.inner.connector.connect(&key.address).await?;
        let channel = RpcChannel::new(conn);
        if let Some(router) = callbacks {
            channel.set_router(router);
        }

        let runner = channel.clone();
        tokio::spawn(async move { runner.run().await });

        tracing::debug!(key = %key.address, "established new pooled channel");
        slot.channel = Some(channel.clone());
        Ok(channel)
    }

    /// Number of keys with a pooled (live or dead) channel.
    pub fn len(&self) -> usize {
        self.inner.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.slots.lock().is_empty()
    }

    /// Dispose every pooled channel and forget all keys.
    pub async fn dispose(&self) {
        let slots: Vec<Arc<AsyncMutex<Slot>>> = {
            let mut map = self.inner.slots.lock();
            map.drain().map(|(_, slot)| slot).collect()
        };
        for slot in slots {
            let guard = slot.lock().await;
            if let Some(channel) = guard.channel.as_ref() {
                channel.dispose().await;
            }
        }
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("keys", &self.len())
            .finish_non_exhaustive()
    }
}
