//! Validation plus dispatch: invocation in, outcome out.

use mcp::{SessionBusyError, ToolCatalog};

use super::format::format_payload;
use super::host::ToolHost;
use super::types::{ToolInvocation, ToolOutcome};
use super::validate::validate;

/// Runs invocations against one host and its catalog.
pub struct ToolExecutor<'a, H> {
    host: &'a H,
    catalog: &'a ToolCatalog,
}

impl<'a, H: ToolHost> ToolExecutor<'a, H> {
    pub fn new(host: &'a H, catalog: &'a ToolCatalog) -> Self {
        Self { host, catalog }
    }

    /// Validate and execute one invocation.
    ///
    /// Validation and call failures become failed outcomes; only a busy
    /// session is returned as an error.
    pub async fn execute(
        &self,
        invocation: &ToolInvocation,
    ) -> Result<ToolOutcome, SessionBusyError> {
        let (spec, arguments) = match validate(invocation, self.catalog) {
            Ok(validated) => validated,
            Err(e) => {
                tracing::debug!(tool = %invocation.name, "invocation rejected: {e}");
                return Ok(ToolOutcome::failure(
                    &invocation.name,
                    invocation.arguments.clone(),
                    e,
                ));
            }
        };

        match self.host.call_tool(&spec.name, arguments.clone()).await {
            Ok(payload) => Ok(ToolOutcome {
                tool: spec.name.clone(),
                display: format_payload(&payload),
                arguments,
                success: true,
                payload,
            }),
            Err(mcp::Error::SessionBusy(busy)) => Err(busy),
            Err(mcp::Error::ToolCall(e)) => {
                Ok(ToolOutcome::failure(&spec.name, arguments, e.cause))
            }
            Err(e) => Ok(ToolOutcome::failure(&spec.name, arguments, e)),
        }
    }
}
