//! MCP error types.

use std::time::Duration;

use thiserror::Error;

use crate::protocol::JsonRpcError;
use crate::session::SessionState;

/// The server executable could not be started.
#[derive(Debug, Error)]
#[error("failed to spawn server `{path}`: {source}")]
pub struct SpawnError {
    pub path: String,
    #[source]
    pub source: std::io::Error,
}

/// The handshake with the server failed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConnectionError {
    /// The server closed its stdout before answering.
    #[error("server exited during handshake")]
    ProcessExited,

    /// The server sent something that is not a valid handshake answer.
    #[error("malformed handshake response: {0}")]
    Malformed(String),

    /// The server rejected the handshake.
    #[error("server rejected handshake: {0}")]
    Rejected(#[from] JsonRpcError),

    /// No answer arrived within the handshake budget.
    #[error("handshake timed out after {0:?}")]
    Timeout(Duration),

    /// Reading from or writing to the server failed.
    #[error("I/O error during handshake: {0}")]
    Io(#[from] std::io::Error),
}

/// A second call arrived while another one was in flight.
#[derive(Debug, Clone, Error)]
#[error("session busy: a call to `{in_flight}` is already in flight")]
pub struct SessionBusyError {
    pub in_flight: String,
}

/// Why a tool call failed.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum CallFailure {
    /// The server answered with an error payload.
    #[error("{message}")]
    Remote { message: String },

    /// No answer arrived in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The server process went away mid-call.
    #[error("server exited")]
    ProcessExited,

    /// The answer could not be decoded.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Reading from or writing to the server failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// The session is not in the `Ready` state.
    #[error("session is {0}, not ready")]
    NotReady(SessionState),
}

/// A remote tool call failed or timed out.
#[derive(Debug, Clone, Error)]
#[error("tool `{name}` failed: {cause}")]
pub struct ToolCallError {
    pub name: String,
    #[source]
    pub cause: CallFailure,
}

impl ToolCallError {
    pub fn new(name: impl Into<String>, cause: CallFailure) -> Self {
        Self {
            name: name.into(),
            cause,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.cause, CallFailure::Timeout(_))
    }
}

/// Errors surfaced by the MCP client.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Spawn(#[from] SpawnError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    SessionBusy(#[from] SessionBusyError),

    #[error(transparent)]
    ToolCall(#[from] ToolCallError),

    /// An operation that needs a `Ready` session was attempted too early or too late.
    #[error("session is {0}, not ready")]
    NotReady(SessionState),
}

pub type Result<T> = std::result::Result<T, Error>;
