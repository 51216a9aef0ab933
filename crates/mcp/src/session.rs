//! Handshaken connection to one MCP server.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::time::timeout;

use crate::catalog::ToolCatalog;
use crate::connector::{Connector, Inbound, MAX_LINE_SIZE, ServerDescriptor};
use crate::error::{
    CallFailure, ConnectionError, Error, Result, SessionBusyError, ToolCallError,
};
use crate::protocol::{
    CallToolParams, InitializeParams, InitializeResult, JsonRpcError, JsonRpcErrorResponse,
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, ListToolsResult, MessageKind,
    RequestId, ServerInfo, call_result_error,
};

/// Default timeout for the handshake and for each tool call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Lifecycle of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Ready,
    Closed,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What a call does when another call is already in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CallPolicy {
    /// Wait for the earlier calls to finish, in arrival order.
    #[default]
    Queue,
    /// Fail immediately with [`SessionBusyError`].
    Reject,
}

/// Tunables for a [`Session`].
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub handshake_timeout: Duration,
    pub call_timeout: Duration,
    pub policy: CallPolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_TIMEOUT,
            call_timeout: DEFAULT_TIMEOUT,
            policy: CallPolicy::default(),
        }
    }
}

impl SessionOptions {
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn policy(mut self, policy: CallPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// A live connection to one tool-providing server.
///
/// At most one `tools/call` is on the wire at a time; see [`CallPolicy`].
pub struct Session {
    options: SessionOptions,
    state: Mutex<SessionState>,
    descriptor: Option<Arc<ServerDescriptor>>,
    server_info: Option<ServerInfo>,
    catalog: Arc<ToolCatalog>,
    channel: tokio::sync::Mutex<Option<Connector>>,
    in_flight: Mutex<Option<String>>,
    next_id: AtomicI64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionOptions::default())
    }
}

impl Session {
    /// Create a disconnected session.
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            state: Mutex::new(SessionState::Disconnected),
            descriptor: None,
            server_info: None,
            catalog: Arc::new(ToolCatalog::default()),
            channel: tokio::sync::Mutex::new(None),
            in_flight: Mutex::new(None),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// The descriptor of the current (or last) connection.
    pub fn descriptor(&self) -> Option<&ServerDescriptor> {
        self.descriptor.as_deref()
    }

    /// Server identity reported during the handshake.
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Spawn the server, run the handshake and fetch the tool catalog.
    ///
    /// A session that is not `Disconnected` releases its previous
    /// connection first.
    pub async fn connect(&mut self, descriptor: Arc<ServerDescriptor>) -> Result<()> {
        if self.state() != SessionState::Disconnected {
            self.release().await;
        }

        self.set_state(SessionState::Connecting);
        self.descriptor = Some(Arc::clone(&descriptor));
        self.server_info = None;
        self.catalog = Arc::new(ToolCatalog::default());

        let mut connector = match Connector::open(&descriptor) {
            Ok(connector) => connector,
            Err(e) => {
                tracing::warn!(path = %descriptor.path, "spawn failed: {e}");
                self.set_state(SessionState::Failed);
                return Err(e.into());
            }
        };

        let budget = self.options.handshake_timeout;
        let outcome = match timeout(budget, handshake(&mut connector, &self.next_id)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ConnectionError::Timeout(budget)),
        };

        match outcome {
            Ok((info, catalog)) => {
                tracing::info!(
                    server = %info.server_info.name,
                    tools = catalog.len(),
                    "session ready"
                );
                self.server_info = Some(info.server_info);
                self.catalog = Arc::new(catalog);
                *self.channel.get_mut() = Some(connector);
                self.set_state(SessionState::Ready);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(path = %descriptor.path, "handshake failed: {e}");
                connector.close().await;
                self.set_state(SessionState::Failed);
                Err(e.into())
            }
        }
    }

    /// The catalog fetched at handshake time.
    pub fn list_tools(&self) -> Result<Arc<ToolCatalog>> {
        match self.state() {
            SessionState::Ready => Ok(Arc::clone(&self.catalog)),
            state => Err(Error::NotReady(state)),
        }
    }

    /// Call a tool and wait for its correlated response.
    pub async fn call_tool(&self, name: &str, arguments: Map<String, Value>) -> Result<Value> {
        let not_ready = |state| ToolCallError::new(name, CallFailure::NotReady(state));

        let state = self.state();
        if state != SessionState::Ready {
            return Err(not_ready(state).into());
        }

        let mut channel = match self.options.policy {
            CallPolicy::Queue => self.channel.lock().await,
            CallPolicy::Reject => self.channel.try_lock().map_err(|_| SessionBusyError {
                in_flight: self
                    .in_flight
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone()
                    .unwrap_or_default(),
            })?,
        };
        let _marker = InFlight::mark(&self.in_flight, name);

        // The session may have failed while this call was queued.
        let state = self.state();
        let connector = match channel.as_mut() {
            Some(connector) if state == SessionState::Ready => connector,
            _ => return Err(not_ready(state).into()),
        };

        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        let budget = self.options.call_timeout;
        let started = Instant::now();
        let outcome = timeout(
            budget,
            exchange(connector, &self.next_id, "tools/call", Some(params)),
        )
        .await;
        tracing::debug!(tool = name, elapsed = ?started.elapsed(), "tool call finished");

        let cause = match outcome {
            Err(_) => {
                tracing::warn!(tool = name, "tool call timed out after {budget:?}");
                CallFailure::Timeout(budget)
            }
            Ok(Ok(result)) => match call_result_error(&result) {
                None => return Ok(result),
                Some(message) => CallFailure::Remote { message },
            },
            Ok(Err(ExchangeError::Rpc(e))) => CallFailure::Remote { message: e.message },
            Ok(Err(ExchangeError::Malformed(m))) => CallFailure::Malformed(m),
            Ok(Err(ExchangeError::Closed)) => {
                self.set_state(SessionState::Failed);
                CallFailure::ProcessExited
            }
            Ok(Err(ExchangeError::Io(e))) => {
                self.set_state(SessionState::Failed);
                CallFailure::Io(e.to_string())
            }
        };

        Err(ToolCallError::new(name, cause).into())
    }

    /// Release the server process and move to `Closed`. Safe to call repeatedly.
    pub async fn disconnect(&mut self) {
        self.release().await;
        self.set_state(SessionState::Closed);
    }

    async fn release(&mut self) {
        if let Some(mut connector) = self.channel.get_mut().take() {
            connector.close().await;
            tracing::debug!("session released");
        }
    }
}

/// Records which tool currently holds the channel.
struct InFlight<'a>(&'a Mutex<Option<String>>);

impl<'a> InFlight<'a> {
    fn mark(slot: &'a Mutex<Option<String>>, name: &str) -> Self {
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(name.to_string());
        Self(slot)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

// --- Wire exchange ---

#[derive(Debug)]
enum ExchangeError {
    Closed,
    Malformed(String),
    Rpc(JsonRpcError),
    Io(std::io::Error),
}

impl From<std::io::Error> for ExchangeError {
    fn from(e: std::io::Error) -> Self {
        // A write into a dead child surfaces as a broken pipe.
        if e.kind() == std::io::ErrorKind::BrokenPipe {
            Self::Closed
        } else {
            Self::Io(e)
        }
    }
}

impl From<ExchangeError> for ConnectionError {
    fn from(e: ExchangeError) -> Self {
        match e {
            ExchangeError::Closed => Self::ProcessExited,
            ExchangeError::Malformed(m) => Self::Malformed(m),
            ExchangeError::Rpc(e) => Self::Rejected(e),
            ExchangeError::Io(e) => Self::Io(e),
        }
    }
}

async fn handshake(
    connector: &mut Connector,
    next_id: &AtomicI64,
) -> std::result::Result<(InitializeResult, ToolCatalog), ConnectionError> {
    let value = exchange(connector, next_id, "initialize", Some(InitializeParams::default())).await?;
    let info: InitializeResult = serde_json::from_value(value)
        .map_err(|e| ConnectionError::Malformed(format!("initialize result: {e}")))?;

    let notification = serde_json::to_string(&JsonRpcNotification::new("notifications/initialized"))
        .map_err(|e| ConnectionError::Malformed(e.to_string()))?;
    connector.send(&notification).await.map_err(ExchangeError::from)?;

    let value = exchange(connector, next_id, "tools/list", None::<()>).await?;
    let listed: ListToolsResult = serde_json::from_value(value)
        .map_err(|e| ConnectionError::Malformed(format!("tools/list result: {e}")))?;

    Ok((info, ToolCatalog::from(listed.tools)))
}

/// Send one request and read until its response arrives.
async fn exchange<P: Serialize>(
    connector: &mut Connector,
    next_id: &AtomicI64,
    method: &str,
    params: Option<P>,
) -> std::result::Result<Value, ExchangeError> {
    let id = RequestId::Number(next_id.fetch_add(1, Ordering::SeqCst));
    let mut request = JsonRpcRequest::new(id.clone(), method);
    if let Some(p) = params {
        request = request
            .with_params(p)
            .map_err(|e| ExchangeError::Malformed(e.to_string()))?;
    }
    let line = serde_json::to_string(&request).map_err(|e| ExchangeError::Malformed(e.to_string()))?;
    connector.send(&line).await?;

    loop {
        let line = match connector.recv().await? {
            Inbound::Line(line) => line,
            Inbound::Closed => return Err(ExchangeError::Closed),
            Inbound::Oversized => {
                return Err(ExchangeError::Malformed(format!(
                    "response exceeds {MAX_LINE_SIZE} bytes"
                )));
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        // Some servers print banners or logs to stdout.
        if !line.starts_with('{') {
            tracing::debug!(line, "skipping non-JSON output");
            continue;
        }

        let message: JsonRpcMessage =
            serde_json::from_str(line).map_err(|e| ExchangeError::Malformed(e.to_string()))?;

        match message.kind() {
            MessageKind::Response(got) if *got == id => {
                return message.into_result().map_err(ExchangeError::Rpc);
            }
            MessageKind::Response(got) => {
                tracing::debug!(%got, expected = %id, "discarding stale response");
            }
            MessageKind::Request { id: request_id, method } => {
                tracing::debug!(method, "declining server request");
                let reply = JsonRpcErrorResponse::method_not_found(request_id.clone(), method);
                let reply = serde_json::to_string(&reply)
                    .map_err(|e| ExchangeError::Malformed(e.to_string()))?;
                connector.send(&reply).await?;
            }
            MessageKind::Notification(method) => {
                tracing::trace!(method, "ignoring server notification");
            }
            MessageKind::Invalid => {
                return Err(ExchangeError::Malformed(
                    "message has neither id nor method".to_string(),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_disconnected() {
        let session = Session::default();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(matches!(
            session.list_tools(),
            Err(Error::NotReady(SessionState::Disconnected))
        ));
    }

    #[tokio::test]
    async fn call_before_connect_is_not_ready() {
        let session = Session::default();
        let err = session.call_tool("add", Map::new()).await.unwrap_err();
        match err {
            Error::ToolCall(e) => {
                assert_eq!(e.name, "add");
                assert!(matches!(e.cause, CallFailure::NotReady(SessionState::Disconnected)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn spawn_failure_leaves_session_failed() {
        let mut session = Session::default();
        let err = session
            .connect(Arc::new(ServerDescriptor::new("/no/such/server")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Spawn(_)));
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let mut session = Session::default();
        session.disconnect().await;
        session.disconnect().await;
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn options_builder() {
        let options = SessionOptions::default()
            .call_timeout(Duration::from_millis(250))
            .policy(CallPolicy::Reject);
        assert_eq!(options.call_timeout, Duration::from_millis(250));
        assert_eq!(options.handshake_timeout, DEFAULT_TIMEOUT);
        assert_eq!(options.policy, CallPolicy::Reject);
    }
}
