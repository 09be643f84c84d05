//! ServiceClient: the per-interface façade.
//!
//! A `ServiceClient` binds one logical endpoint (contract name) to one
//! connection key. Calls are built fluently:
//!
//! ```ignore
//! let pool = ConnectionPool::new(Arc::new(SocketConnector::new()));
//! let calc = ServiceClient::builder("Calc", Address::Tcp("127.0.0.1:9000".into()))
//!     .default_timeout(Duration::from_secs(5))
//!     .build(&pool);
//!
//! let sum: i32 = calc.call("Add").arg(2).arg(3).send().await?;
//! ```
//!
//! The effective timeout of a call is the first of: the builder's explicit
//! `.timeout(..)`, the client's configured default, or none (infinite). A
//! wire-level error on the response is rehydrated into a typed
//! [`RemoteError`]; the caller never sees a raw protocol object.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crosswire_core::{CallOptions, CallbackRouter, RpcChannel, RpcError};

use crate::connect::Address;
use crate::pool::{ConnectionKey, ConnectionPool};

pub struct ServiceClient {
    pool: ConnectionPool,
    key: ConnectionKey,
    endpoint: String,
    default_timeout: Option<Duration>,
    callbacks: Option<Arc<CallbackRouter>>,
}

impl ServiceClient {
    pub fn builder(endpoint: impl Into<String>, address: Address) -> ServiceClientBuilder {
        ServiceClientBuilder {
            endpoint: endpoint.into(),
            address,
            identity: None,
            default_timeout: None,
            callbacks: None,
        }
    }

    /// The connection key this client pools under.
    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    /// Begin building one logical call.
    pub fn call(&self, method_name: impl Into<String>) -> CallBuilder<'_> {
        CallBuilder {
            client: self,
            method_name: method_name.into(),
            parameters: Vec::new(),
            arg_error: None,
            timeout: None,
            cancel: None,
        }
    }

    async fn channel(&self) -> Result<RpcChannel, RpcError> {
        self.pool
            .get_or_create(&self.key, self.callbacks.clone())
            .await
    }
}

impl std::fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClient")
            .field("endpoint", &self.endpoint)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

pub struct ServiceClientBuilder {
    endpoint: String,
    address: Address,
    identity: Option<String>,
    default_timeout: Option<Duration>,
    callbacks: Option<Arc<CallbackRouter>>,
}

impl ServiceClientBuilder {
    /// Security principal recorded in the connection key.
    pub fn identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Default request timeout applied when a call sets none.
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Callback implementations this client serves over its connection.
    /// Registering callbacks changes the connection key: the connection is
    /// advertised as callback-capable and never shared with callback-free
    /// clients.
    pub fn callbacks(mut self, router: Arc<CallbackRouter>) -> Self {
        self.callbacks = Some(router);
        self
    }

    pub fn build(self, pool: &ConnectionPool) -> ServiceClient {
        let mut key = ConnectionKey::new(self.address);
        key.identity = self.identity;
        key.accepts_callbacks = self.callbacks.is_some();
        ServiceClient {
            pool: pool.clone(),
            key,
            endpoint: self.endpoint,
            default_timeout: self.default_timeout,
            callbacks: self.callbacks,
        }
    }
}

/// One logical call under construction.
pub struct CallBuilder<'a> {
    client: &'a ServiceClient,
    method_name: String,
    parameters: Vec<String>,
    /// First argument that failed to serialize; surfaced on send so a bad
    /// argument never reaches the wire.
    arg_error: Option<serde_json::Error>,
    timeout: Option<Duration>,
    cancel: Option<CancellationToken>,
}

impl CallBuilder<'_> {
    /// Append one argument, serialized immediately.
    pub fn arg<T: Serialize>(mut self, value: T) -> Self {
        match serde_json::to_string(&value) {
            Ok(serialized) => self.parameters.push(serialized),
            Err(e) => {
                if self.arg_error.is_none() {
                    self.arg_error = Some(e);
                }
            }
        }
        self
    }

    /// Explicit per-call timeout; takes precedence over the client default.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Bind a caller-supplied cancellation token to the call.
    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn effective_timeout(&self) -> Option<Duration> {
        self.timeout.or(self.client.default_timeout)
    }

    /// Perform the call and deserialize the result.
    pub async fn send<R: DeserializeOwned>(self) -> Result<R, RpcError> {
        let CallBuilder {
            client,
            method_name,
            parameters,
            arg_error,
            timeout,
            cancel,
        } = self;
        if let Some(e) = arg_error {
            return Err(RpcError::Serialization(e));
        }

        let options = CallOptions {
            timeout: timeout.or(client.default_timeout),
            cancel,
        };
        let channel = client.channel().await?;
        let response = channel
            .call(&client.endpoint, &method_name, parameters, options)
            .await?;

        if let Some(error) = response.error {
            return Err(RpcError::Remote(error.into()));
        }
        let data = response.data.unwrap_or_else(|| "null".to_string());
        serde_json::from_str(&data).map_err(RpcError::Serialization)
    }

    /// Fire-and-forget: resolve on successful write, await no response.
    pub async fn notify(self) -> Result<(), RpcError> {
        let CallBuilder {
            client,
            method_name,
            parameters,
            arg_error,
            ..
        } = self;
        if let Some(e) = arg_error {
            return Err(RpcError::Serialization(e));
        }

        let channel = client.channel().await?;
        channel
            .notify(&client.endpoint, &method_name, parameters)
            .await
    }
}
