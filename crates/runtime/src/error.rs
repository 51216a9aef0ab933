use thiserror::Error;

/// Errors surfaced by [`Client`](crate::Client).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("unknown server: {0}")]
    UnknownServer(String),

    #[error("not connected to a server")]
    NotConnected,

    #[error(transparent)]
    Mcp(#[from] mcp::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
