//! Error types for the SDK.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Result type alias for SDK operations.
pub type Result<T> = std::result::Result<T, Error>;

/// JSON-RPC 2.0 error payload (§3, §7.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Implementation-defined: `tool.call`/`user.input.request` for an unknown session (§4.E).
    pub const SESSION_NOT_FOUND: i32 = -32001;
    /// Implementation-defined: `user.input.request` with no registered handler (§4.E, §7.5).
    pub const NO_HANDLER: i32 = -32002;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(Self::METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Self::INTERNAL_ERROR, message.into())
    }
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

/// SDK error taxonomy (§7).
#[derive(Error, Debug)]
pub enum Error {
    /// §7.1 transport errors: header parse failure, truncated body, pipe/socket error.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// §7.2 a well-formed JSON-RPC error response from the CLI, surfaced unchanged.
    #[error("{0}")]
    Protocol(JsonRpcError),

    /// §7.3 handshake errors: missing/mismatched protocolVersion.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// §7.4 validation errors: preflight failures raised before any frame is sent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("client is not connected")]
    NotConnected,

    #[error("client is already connected")]
    AlreadyConnected,

    #[error("subprocess error: {0}")]
    Process(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// §7.6: only at the send-and-wait layer and subprocess readiness layer.
    #[error("timeout: {0}")]
    Timeout(String),

    /// §7.7: outstanding outbound requests fail with this on shutdown; never retried.
    #[error("client stopped")]
    ClientStopped,

    #[error("{0}")]
    Other(String),
}

impl From<JsonRpcError> for Error {
    fn from(e: JsonRpcError) -> Self {
        Error::Protocol(e)
    }
}
