//! Error taxonomy.
//!
//! Channel-fatal errors (`Connection`, `Protocol`) fail every call that is
//! outstanding on the channel when they occur. Per-call errors (`Timeout`,
//! `Canceled`, `Remote`, `Serialization`) affect only the call that
//! produced them.

use core::fmt;

use crate::wire::ErrorInfo;

/// Transport-level failure: connect failed, stream closed, or a raw write
/// failed. Never retried by the core; the next call reconnects through the
/// pool.
#[derive(Debug)]
pub enum ConnectionError {
    /// The stream was closed, locally or by the peer.
    Closed,
    /// An I/O error on an established stream.
    Io(std::io::Error),
    /// Establishing the stream failed.
    Connect {
        address: String,
        source: std::io::Error,
    },
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "connection closed"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Connect { address, source } => {
                write!(f, "failed to connect to {address}: {source}")
            }
        }
    }
}

impl std::error::Error for ConnectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Connect { source, .. } => Some(source),
            Self::Closed => None,
        }
    }
}

/// A frame that cannot be understood. Fatal to the channel.
#[derive(Debug)]
pub enum ProtocolError {
    /// The frame's kind tag is not one of the known message kinds.
    UnknownKind(u8),
    /// The declared frame length exceeds the configured limit.
    FrameTooLarge { len: usize, max: usize },
    /// The frame body is not a valid encoding of the tagged kind.
    Malformed { kind: u8, source: serde_json::Error },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownKind(kind) => write!(f, "unknown frame kind {kind}"),
            Self::FrameTooLarge { len, max } => {
                write!(f, "frame of {len} bytes exceeds limit of {max}")
            }
            Self::Malformed { kind, source } => {
                write!(f, "malformed frame body for kind {kind}: {source}")
            }
        }
    }
}

impl std::error::Error for ProtocolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Malformed { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// The peer's method implementation failed.
///
/// Carries the remote exception's type name, message, and stack text;
/// `inner` preserves the remote cause chain. Never fatal to the channel.
#[derive(Debug, Clone)]
pub struct RemoteError {
    pub type_name: String,
    pub message: String,
    pub stack_trace: String,
    pub inner: Option<Box<RemoteError>>,
}

impl From<ErrorInfo> for RemoteError {
    fn from(info: ErrorInfo) -> Self {
        Self {
            type_name: info.type_name,
            message: info.message,
            stack_trace: info.stack_trace,
            inner: info.inner_error.map(|e| Box::new((*e).into())),
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.message)
    }
}

impl std::error::Error for RemoteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Top-level error returned by calls into crosswire.
#[derive(Debug)]
pub enum RpcError {
    /// Transport failure; fails all calls outstanding on the channel.
    Connection(ConnectionError),
    /// Malformed or unexpected frame; fails the channel.
    Protocol(ProtocolError),
    /// The call's effective deadline elapsed before a response arrived.
    Timeout,
    /// The caller-supplied cancellation fired.
    Canceled,
    /// The peer's implementation failed; only this call is affected.
    Remote(RemoteError),
    /// An argument or result could not be (de)serialized.
    Serialization(serde_json::Error),
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "connection error: {e}"),
            Self::Protocol(e) => write!(f, "protocol error: {e}"),
            Self::Timeout => write!(f, "the call timed out"),
            Self::Canceled => write!(f, "the call was canceled"),
            Self::Remote(e) => write!(f, "remote error: {e}"),
            Self::Serialization(e) => write!(f, "serialization error: {e}"),
        }
    }
}

impl std::error::Error for RpcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Connection(e) => Some(e),
            Self::Protocol(e) => Some(e),
            Self::Remote(e) => Some(e),
            Self::Serialization(e) => Some(e),
            Self::Timeout | Self::Canceled => None,
        }
    }
}

impl From<ConnectionError> for RpcError {
    fn from(e: ConnectionError) -> Self {
        Self::Connection(e)
    }
}

impl From<ProtocolError> for RpcError {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

impl From<RemoteError> for RpcError {
    fn from(e: RemoteError) -> Self {
        Self::Remote(e)
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e)
    }
}

impl RpcError {
    /// True for errors that terminate the whole channel rather than one call.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Protocol(_))
    }
}
