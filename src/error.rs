//! Error types for the galley bridge
//!
//! Domain errors use thiserror; conversions happen at the layer
//! boundaries (gateway -> session -> envelope). Encoding problems are
//! deliberately absent here: the defensive encoder degrades to
//! placeholder text instead of returning errors.

use std::io;

use serde_json::Value;
use thiserror::Error;

/// A host-side failure raised while reading a single property or
/// capability of a value (the host binding can fault on plain reads).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct AccessFault {
    /// Human-readable description reported by the host binding.
    pub message: String,
}

impl AccessFault {
    /// Create a fault with the given description.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Structured fault carried in a gateway error envelope.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProtocolFault {
    /// Gateway-defined error code (e.g. `script_fault`, `no_document`).
    pub code: Option<String>,
    /// Human-readable error message.
    pub message: String,
    /// Arbitrary structured details attached by the gateway.
    pub details: Value,
}

impl ProtocolFault {
    /// Script line number reported in the fault details, if any.
    pub fn line(&self) -> Option<i64> {
        self.details.get("line").and_then(Value::as_i64)
    }
}

/// Wire-value decode errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WireError {
    /// An aggregate id was assigned twice in one dump.
    #[error("duplicate aggregate id {0} in wire value")]
    DuplicateId(u32),

    /// A backreference points at an id that was never assigned.
    #[error("unknown backreference id {0} in wire value")]
    UnknownRef(u32),

    /// The dump violates the wire grammar in some other way.
    #[error("malformed wire value: {0}")]
    Malformed(String),
}

/// Errors produced while talking NDJSON to the host gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// I/O error on the gateway stream.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// JSON (de)serialisation error for envelopes.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The gateway reported a structured fault.
    #[error("gateway fault: {0}")]
    Fault(ProtocolFault),

    /// The result value dump could not be reconstructed.
    #[error("wire value error: {0}")]
    Wire(#[from] WireError),

    /// The gateway returned an unexpected or malformed payload.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Attempted to spawn a bridge adapter without a command.
    #[error("bridge command is empty")]
    EmptyBridgeCommand,

    /// Spawned bridge adapter is missing a stdout pipe.
    #[error("spawned bridge adapter did not expose stdout")]
    MissingStdout,

    /// Spawned bridge adapter is missing a stdin pipe.
    #[error("spawned bridge adapter did not expose stdin")]
    MissingStdin,
}

/// Convenience result alias for gateway operations.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Errors surfaced by the host session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No gateway could be reached (after the single re-dial attempt).
    #[error("host gateway unreachable: {detail}")]
    Unreachable {
        /// Description of the dial target and underlying failure.
        detail: String,
    },

    /// The host is running but has no document open.
    #[error("no document open in the host application")]
    NoDocument,

    /// The submitted script raised inside the host.
    #[error("script error: {}", script_display(.message, .line))]
    Script {
        /// Fault message reported by the host engine.
        message: String,
        /// Script line number, when the host reports one.
        line: Option<i64>,
    },

    /// Any other gateway-level failure, passed through unchanged.
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

fn script_display(message: &str, line: &Option<i64>) -> String {
    match line {
        Some(line) => format!("{message} (line {line})"),
        None => message.to_string(),
    }
}

/// Convenience result alias for session operations.
pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Errors folded into a FAULT outcome by the execution envelope.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The request was rejected before any host contact.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The session failed while executing the request.
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error while reading or writing the config file.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The config file is not valid JSON for [`crate::BridgeConfig`].
    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),
}
