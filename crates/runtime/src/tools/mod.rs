//! From model text to tool outcomes: extraction, validation, execution.

mod empty;
pub mod errors;
mod execute;
pub mod extract;
mod format;
mod host;
mod types;
mod validate;

pub use empty::EmptyToolHost;
pub use errors::ValidationError;
pub use execute::ToolExecutor;
pub use extract::{Extraction, ExtractionDiagnostic, extract};
pub use format::format_payload;
pub use host::ToolHost;
pub use types::{InvocationSource, ToolInvocation, ToolOutcome};
pub use validate::validate;
