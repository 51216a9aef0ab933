//! Empty tool host implementation.

use std::sync::Arc;

use mcp::{CallFailure, SessionState, ToolCallError, ToolCatalog};
use serde_json::{Map, Value};

use crate::tools::ToolHost;

/// A host with no tools that refuses every call.
///
/// Useful for testing or when no server is connected.
#[derive(Debug, Default)]
pub struct EmptyToolHost {
    catalog: Arc<ToolCatalog>,
}

impl ToolHost for EmptyToolHost {
    fn tools(&self) -> mcp::Result<Arc<ToolCatalog>> {
        Ok(Arc::clone(&self.catalog))
    }

    async fn call_tool(&self, name: &str, _arguments: Map<String, Value>) -> mcp::Result<Value> {
        Err(ToolCallError::new(name, CallFailure::NotReady(SessionState::Disconnected)).into())
    }
}
