//! Callback dispatch: the server-style component inside a client process.
//!
//! A [`CallbackRouter`] is an explicit method table (endpoint name to
//! method name to a typed invoker closure) built once through
//! [`RouterBuilder`] and immutable afterwards. There is no reflection: each
//! registered method captures its own deserialize-invoke-serialize glue.
//!
//! `dispatch` never fails. Unknown endpoints, unknown methods, bad
//! parameters, handler errors, and peer-initiated cancellation all produce
//! a [`Response`] carrying the matching [`ErrorInfo`], so the caller on the
//! other side of the wire always observes a resolution.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::wire::{ErrorInfo, Request, Response};

/// Boxed future produced by a method invoker: serialized result or error.
type MethodFuture = Pin<Box<dyn Future<Output = Result<String, ErrorInfo>> + Send>>;

/// A registered method: raw parameters + cancellation in, future out.
type MethodHandler = Box<dyn Fn(Vec<String>, CancellationToken) -> MethodFuture + Send + Sync>;

/// Extraction of a typed argument tuple from individually serialized
/// parameters. Implemented for tuples of arity 0 through 4.
pub trait FromParams: Sized {
    const ARITY: usize;

    fn from_params(params: &[String]) -> Result<Self, ErrorInfo>;
}

macro_rules! impl_from_params {
    ($count:expr $(, $ty:ident : $idx:tt)*) => {
        impl<$($ty: DeserializeOwned),*> FromParams for ($($ty,)*) {
            const ARITY: usize = $count;

            fn from_params(params: &[String]) -> Result<Self, ErrorInfo> {
                if params.len() != $count {
                    return Err(ErrorInfo::bad_arity($count, params.len()));
                }
                Ok(($(
                    serde_json::from_str::<$ty>(&params[$idx])
                        .map_err(|e| ErrorInfo::bad_parameter($idx, &e))?,
                )*))
            }
        }
    };
}

impl_from_params!(0);
impl_from_params!(1, A: 0);
impl_from_params!(2, A: 0, B: 1);
impl_from_params!(3, A: 0, B: 1, C: 2);
impl_from_params!(4, A: 0, B: 1, C: 2, D: 3);

/// Error returned by a registered method implementation.
///
/// Projected into an [`ErrorInfo`] on the wire; the remote caller observes
/// it as a `RemoteError` with the same type name and message.
#[derive(Debug, Clone)]
pub struct MethodError {
    pub type_name: String,
    pub message: String,
}

impl MethodError {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
        }
    }
}

impl From<String> for MethodError {
    fn from(message: String) -> Self {
        Self::new("CallbackError", message)
    }
}

impl From<&str> for MethodError {
    fn from(message: &str) -> Self {
        Self::new("CallbackError", message)
    }
}

impl From<MethodError> for ErrorInfo {
    fn from(e: MethodError) -> Self {
        ErrorInfo::new(e.type_name, e.message)
    }
}

/// Builder for one endpoint's method table.
pub struct EndpointBuilder {
    methods: HashMap<String, MethodHandler>,
}

impl EndpointBuilder {
    fn new() -> Self {
        Self {
            methods: HashMap::new(),
        }
    }

    /// Register a method that ignores cancellation.
    pub fn method<P, R, F, Fut>(self, name: &str, f: F) -> Self
    where
        P: FromParams + Send + 'static,
        R: Serialize,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, MethodError>> + Send + 'static,
    {
        self.method_with_cancel(name, move |params: P, _cancel| f(params))
    }

    /// Register a method that also receives the invocation's cancellation
    /// token (canceled when the peer sends a `CancellationRequest`).
    pub fn method_with_cancel<P, R, F, Fut>(mut self, name: &str, f: F) -> Self
    where
        P: FromParams + Send + 'static,
        R: Serialize,
        F: Fn(P, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, MethodError>> + Send + 'static,
    {
        let handler: MethodHandler = Box::new(move |raw, cancel| {
            let parsed = P::from_params(&raw).map(|params| f(params, cancel));
            Box::pin(async move {
                match parsed?.await {
                    Ok(value) => {
                        serde_json::to_string(&value).map_err(|e| ErrorInfo::serialization(&e))
                    }
                    Err(e) => Err(e.into()),
                }
            })
        });
        self.methods.insert(name.to_string(), handler);
        self
    }
}

/// Builder for a [`CallbackRouter`].
pub struct RouterBuilder {
    endpoints: HashMap<String, HashMap<String, MethodHandler>>,
}

impl RouterBuilder {
    pub fn endpoint(
        mut self,
        name: &str,
        build: impl FnOnce(EndpointBuilder) -> EndpointBuilder,
    ) -> Self {
        let builder = build(EndpointBuilder::new());
        self.endpoints.insert(name.to_string(), builder.methods);
        self
    }

    pub fn build(self) -> CallbackRouter {
        CallbackRouter {
            endpoints: self.endpoints,
        }
    }
}

/// Routes inbound requests to locally registered implementations.
pub struct CallbackRouter {
    endpoints: HashMap<String, HashMap<String, MethodHandler>>,
}

impl CallbackRouter {
    pub fn builder() -> RouterBuilder {
        RouterBuilder {
            endpoints: HashMap::new(),
        }
    }

    /// Endpoint names with at least one registered method.
    pub fn endpoint_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.endpoints.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Invoke the implementation selected by the request's endpoint and
    /// method name, answering with `request_id` equal to the incoming id.
    pub async fn dispatch(&self, request: Request, cancel: CancellationToken) -> Response {
        let Request {
            id,
            endpoint,
            method_name,
            parameters,
            ..
        } = request;

        let handler = match self.endpoints.get(&endpoint) {
            None => {
                tracing::warn!(endpoint = %endpoint, "request for unregistered endpoint");
                return Response::failure(id, ErrorInfo::endpoint_not_found(&endpoint));
            }
            Some(methods) => match methods.get(&method_name) {
                None => {
                    tracing::warn!(endpoint = %endpoint, method = %method_name, "request for unknown method");
                    return Response::failure(id, ErrorInfo::missing_method(&endpoint, &method_name));
                }
                Some(handler) => handler,
            },
        };

        tracing::debug!(
            request_id = %id,
            endpoint = %endpoint,
            method = %method_name,
            params = parameters.len(),
            "dispatching callback"
        );

        let invocation = handler(parameters, cancel.clone());
        tokio::select! {
            result = invocation => match result {
                Ok(data) => Response::success(id, data),
                Err(info) => Response::failure(id, info),
            },
            _ = cancel.cancelled() => {
                tracing::debug!(request_id = %id, "callback invocation canceled by peer");
                Response::failure(id, ErrorInfo::canceled())
            }
        }
    }
}

impl std::fmt::Debug for CallbackRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRouter")
            .field("endpoints", &self.endpoint_names())
            .finish()
    }
}
