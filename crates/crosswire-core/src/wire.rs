//! Logical wire messages exchanged over a connection.
//!
//! Three message kinds travel on the wire: [`Request`], [`Response`], and
//! [`CancellationRequest`]. Field names are PascalCase in the serialized
//! form so that peers written in other languages see the same contract.
//!
//! Argument values and results are serialized *individually*: a `Request`
//! carries one JSON document per parameter, a `Response` carries one JSON
//! document for its result. The envelope never interprets them.

use serde::{Deserialize, Serialize};

/// A logical message: the tagged record carried by one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(Request),
    Response(Response),
    Cancel(CancellationRequest),
}

impl Message {
    /// Short name for log lines.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Message::Request(_) => "request",
            Message::Response(_) => "response",
            Message::Cancel(_) => "cancel",
        }
    }
}

/// An invocation of `endpoint.method_name` on the peer.
///
/// `id` is assigned by the sending channel and is unique among that
/// channel's outstanding calls. `timeout_seconds == 0.0` means the caller
/// imposed no deadline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Request {
    pub id: String,
    pub endpoint: String,
    pub method_name: String,
    /// One JSON document per argument, in declared order.
    pub parameters: Vec<String>,
    pub timeout_seconds: f64,
}

/// The answer to one [`Request`], paired by `request_id`.
///
/// Exactly one of `data` / `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Response {
    pub request_id: String,
    pub data: Option<String>,
    pub error: Option<ErrorInfo>,
}

impl Response {
    /// A successful response carrying a serialized result.
    pub fn success(request_id: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            data: Some(data.into()),
            error: None,
        }
    }

    /// A failed response carrying a remote error description.
    pub fn failure(request_id: impl Into<String>, error: ErrorInfo) -> Self {
        Self {
            request_id: request_id.into(),
            data: None,
            error: Some(error),
        }
    }
}

/// Best-effort notice that the caller no longer needs the result of
/// `request_id`. The peer may ignore it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CancellationRequest {
    pub request_id: String,
}

/// Serializable projection of a remote failure.
///
/// Reconstructed on the caller as a `RemoteError`. `inner_error` preserves
/// the cause chain of the original exception.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorInfo {
    #[serde(rename = "Type")]
    pub type_name: String,
    pub message: String,
    pub stack_trace: String,
    pub inner_error: Option<Box<ErrorInfo>>,
}

impl ErrorInfo {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
            stack_trace: String::new(),
            inner_error: None,
        }
    }

    /// No implementation is registered under the requested endpoint.
    pub fn endpoint_not_found(endpoint: &str) -> Self {
        Self::new(
            "EndpointNotFoundError",
            format!("no callback registered for endpoint {endpoint}"),
        )
    }

    /// The endpoint exists but has no method by that name.
    pub fn missing_method(endpoint: &str, method_name: &str) -> Self {
        Self::new(
            "MissingMethodError",
            format!("endpoint {endpoint} has no method {method_name}"),
        )
    }

    /// A parameter count mismatch between caller and implementation.
    pub fn bad_arity(expected: usize, actual: usize) -> Self {
        Self::new(
            "SerializationError",
            format!("expected {expected} parameters, got {actual}"),
        )
    }

    /// A parameter failed to deserialize.
    pub fn bad_parameter(index: usize, source: &serde_json::Error) -> Self {
        Self::new(
            "SerializationError",
            format!("parameter {index} could not be deserialized: {source}"),
        )
    }

    /// A result failed to serialize.
    pub fn serialization(source: &serde_json::Error) -> Self {
        Self::new(
            "SerializationError",
            format!("result could not be serialized: {source}"),
        )
    }

    /// The invocation was aborted by a peer cancellation notice.
    pub fn canceled() -> Self {
        Self::new("OperationCanceledError", "the invocation was canceled")
    }

    /// The handler panicked.
    pub fn panic(message: impl Into<String>) -> Self {
        Self::new("PanicError", message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_pascal_case_wire_names() {
        let request = Request {
            id: "1".into(),
            endpoint: "Calc".into(),
            method_name: "Add".into(),
            parameters: vec!["2".into(), "3".into()],
            timeout_seconds: 5.0,
        };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&request).unwrap()).unwrap();
        assert_eq!(json["Id"], "1");
        assert_eq!(json["Endpoint"], "Calc");
        assert_eq!(json["MethodName"], "Add");
        assert_eq!(json["Parameters"][1], "3");
        assert_eq!(json["TimeoutSeconds"], 5.0);
    }

    #[test]
    fn error_info_round_trips_with_nested_cause() {
        let info = ErrorInfo {
            type_name: "IoError".into(),
            message: "pipe broke".into(),
            stack_trace: "at read()".into(),
            inner_error: Some(Box::new(ErrorInfo::new("OsError", "EPIPE"))),
        };
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"Type\":\"IoError\""));
        assert!(json.contains("\"InnerError\""));
        let back: ErrorInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, info);
        assert_eq!(back.inner_error.unwrap().message, "EPIPE");
    }

    #[test]
    fn response_constructors_set_exactly_one_side() {
        let ok = Response::success("7", "42");
        assert!(ok.data.is_some() && ok.error.is_none());

        let err = Response::failure("7", ErrorInfo::missing_method("Calc", "Sub"));
        assert!(err.data.is_none());
        let info = err.error.unwrap();
        assert_eq!(info.type_name, "MissingMethodError");
        assert!(info.message.contains("Sub"));
    }
}
