//! Tool host trait.

use std::future::Future;
use std::sync::Arc;

use mcp::{Session, ToolCatalog};
use serde_json::{Map, Value};

/// Where tool calls go.
///
/// This is the boundary between the turn loop and side effects.
pub trait ToolHost: Send + Sync {
    /// The tools this host offers.
    fn tools(&self) -> mcp::Result<Arc<ToolCatalog>>;

    /// Execute one call and return the raw result payload.
    fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> impl Future<Output = mcp::Result<Value>> + Send;
}

impl ToolHost for Session {
    fn tools(&self) -> mcp::Result<Arc<ToolCatalog>> {
        self.list_tools()
    }

    fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> impl Future<Output = mcp::Result<Value>> + Send {
        Session::call_tool(self, name, arguments)
    }
}
