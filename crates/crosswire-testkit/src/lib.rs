//! crosswire-testkit: shared test scenarios for channels and clients.
//!
//! The scenarios in [`properties`] and [`bidirectional`] exercise the
//! channel contract (correlation, timeout, cancellation, disposal,
//! reverse-direction dispatch) against in-memory connection pairs. Crates
//! invoke them from their integration tests so every layer runs the same
//! conformance suite.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crosswire_core::{CallbackRouter, Connection, MethodError, Response, RpcChannel, RpcError};

pub mod bidirectional;
pub mod properties;

/// Failure of a test scenario.
#[derive(Debug)]
pub enum TestError {
    Rpc(RpcError),
    Assertion(String),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rpc(e) => write!(f, "rpc error: {e}"),
            Self::Assertion(msg) => write!(f, "assertion failed: {msg}"),
        }
    }
}

impl std::error::Error for TestError {}

impl From<RpcError> for TestError {
    fn from(e: RpcError) -> Self {
        Self::Rpc(e)
    }
}

/// Build two channels over a connected in-memory pair.
///
/// Read loops are NOT spawned: bind routers first (so no early frame can
/// slip past an unbound router), then call [`spawn`] on each side.
pub fn linked_channels() -> (RpcChannel, RpcChannel) {
    let (a, b) = Connection::pair();
    (RpcChannel::new(a), RpcChannel::new(b))
}

/// Spawn a channel's read loop.
pub fn spawn(channel: &RpcChannel) {
    let runner = channel.clone();
    tokio::spawn(async move { runner.run().await });
}

/// Serialize one argument the way a call builder would.
pub fn arg<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).expect("test argument serializes")
}

/// Deserialize a successful response's data.
pub fn parse<T: DeserializeOwned>(response: &Response) -> Result<T, TestError> {
    if let Some(error) = response.error.as_ref() {
        return Err(TestError::Assertion(format!(
            "expected data, got error {}: {}",
            error.type_name, error.message
        )));
    }
    let data = response.data.as_deref().unwrap_or("null");
    serde_json::from_str(data)
        .map_err(|e| TestError::Assertion(format!("undeserializable data {data:?}: {e}")))
}

/// The reference service used by most scenarios.
///
/// Endpoint `Calc`: `Add(i32, i32) -> i32`, `Echo(String) -> String`,
/// `Fail() -> MathError`, `Hang()` (never answers; watches its
/// cancellation token).
pub fn calc_router() -> CallbackRouter {
    CallbackRouter::builder()
        .endpoint("Calc", |e| {
            e.method("Add", |(a, b): (i32, i32)| async move { Ok(a + b) })
                .method("Echo", |(s,): (String,)| async move { Ok(s) })
                .method("Fail", |(): ()| async move {
                    Err::<i32, _>(MethodError::new("MathError", "division by zero"))
                })
                .method_with_cancel("Hang", |(): (), cancel| async move {
                    cancel.cancelled().await;
                    Err::<(), _>(MethodError::new("CallbackError", "hang aborted"))
                })
        })
        .build()
}
