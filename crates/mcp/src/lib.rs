//! MCP (Model Context Protocol) client library.
//!
//! This crate owns the client side of a stdio MCP connection: a
//! [`Connector`] that spawns the server process and carries newline-framed
//! JSON-RPC, and a [`Session`] that runs the handshake, keeps the negotiated
//! [`ToolCatalog`] and serializes tool calls.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mcp::{ServerDescriptor, Session, SessionOptions};
//!
//! # async fn example() -> mcp::Result<()> {
//! let descriptor = ServerDescriptor::new("mcp-filesystem")
//!     .arg("--root")
//!     .arg("./workspace");
//!
//! let mut session = Session::new(SessionOptions::default());
//! session.connect(Arc::new(descriptor)).await?;
//!
//! for tool in session.list_tools()?.iter() {
//!     println!("Tool: {}", tool.name);
//! }
//!
//! let mut args = serde_json::Map::new();
//! args.insert("path".into(), "./README.md".into());
//! let result = session.call_tool("read_file", args).await?;
//! println!("{result}");
//!
//! session.disconnect().await;
//! # Ok(())
//! # }
//! ```

mod catalog;
mod connector;
mod error;
mod protocol;
mod session;

pub use catalog::{ParamSpec, ParamType, ToolCatalog, ToolSpec};
pub use connector::{Connector, Inbound, MAX_LINE_SIZE, ServerDescriptor};
pub use error::{
    CallFailure, ConnectionError, Error, Result, SessionBusyError, SpawnError, ToolCallError,
};
pub use protocol::{
    CallToolParams, EmbeddedResource, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcMessage, JsonRpcRequest, ListToolsResult, PROTOCOL_VERSION, RequestId, ServerInfo,
    Tool, ToolContent,
};
pub use session::{CallPolicy, DEFAULT_TIMEOUT, Session, SessionOptions, SessionState};
