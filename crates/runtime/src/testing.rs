//! Scripted fakes of the model port and the tool host.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use mcp::{CallFailure, SessionBusyError, Tool, ToolCallError, ToolCatalog};
use serde_json::{Map, Value, json};
use tokio::sync::Notify;

use crate::model::{ConversationHistory, LanguageModel, Message, ModelError, ModelRequest};
use crate::tools::ToolHost;

pub(crate) fn args(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("arguments must be an object"),
    }
}

pub(crate) fn add_catalog() -> ToolCatalog {
    ToolCatalog::from(vec![Tool {
        name: "add".into(),
        description: Some("Add two integers".into()),
        input_schema: json!({
            "type": "object",
            "properties": {
                "a": {"type": "integer"},
                "b": {"type": "integer"}
            },
            "required": ["a", "b"]
        }),
    }])
}

enum Reply {
    Value(Value),
    /// Answer once `release` is notified.
    Held { release: Arc<Notify>, payload: Value },
    Fail(String),
    Busy,
}

pub(crate) struct ScriptedHost {
    catalog: Arc<ToolCatalog>,
    replies: HashMap<String, Reply>,
    calls: Mutex<Vec<(String, Map<String, Value>)>>,
}

impl ScriptedHost {
    pub(crate) fn new(catalog: ToolCatalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
            replies: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn reply(mut self, tool: &str, payload: Value) -> Self {
        self.replies.insert(tool.into(), Reply::Value(payload));
        self
    }

    pub(crate) fn fail(mut self, tool: &str, message: &str) -> Self {
        self.replies.insert(tool.into(), Reply::Fail(message.into()));
        self
    }

    pub(crate) fn held(mut self, tool: &str, release: Arc<Notify>, payload: Value) -> Self {
        self.replies
            .insert(tool.into(), Reply::Held { release, payload });
        self
    }

    pub(crate) fn busy(mut self, tool: &str) -> Self {
        self.replies.insert(tool.into(), Reply::Busy);
        self
    }

    pub(crate) fn catalog(&self) -> Arc<ToolCatalog> {
        Arc::clone(&self.catalog)
    }

    pub(crate) fn calls(&self) -> Vec<(String, Map<String, Value>)> {
        self.calls.lock().unwrap().clone()
    }
}

impl ToolHost for ScriptedHost {
    fn tools(&self) -> mcp::Result<Arc<ToolCatalog>> {
        Ok(self.catalog())
    }

    async fn call_tool(&self, name: &str, arguments: Map<String, Value>) -> mcp::Result<Value> {
        self.calls.lock().unwrap().push((name.to_string(), arguments));
        match self.replies.get(name) {
            Some(Reply::Value(payload)) => Ok(payload.clone()),
            Some(Reply::Held { release, payload }) => {
                release.notified().await;
                Ok(payload.clone())
            }
            Some(Reply::Fail(message)) => Err(ToolCallError::new(
                name,
                CallFailure::Remote {
                    message: message.clone(),
                },
            )
            .into()),
            Some(Reply::Busy) => Err(SessionBusyError {
                in_flight: "other".into(),
            }
            .into()),
            None => Ok(Value::String("ok".into())),
        }
    }
}

pub(crate) enum Turn {
    /// Stream these chunks, then end.
    Reply(Vec<String>),
    /// Fail before producing anything.
    Fail(ModelError),
    /// Stream these chunks, then never finish.
    Hang(Vec<String>),
}

impl Turn {
    pub(crate) fn text(chunks: &[&str]) -> Self {
        Self::Reply(chunks.iter().map(|c| c.to_string()).collect())
    }
}

pub(crate) struct ScriptedModel {
    turns: Mutex<VecDeque<Turn>>,
    repeat: Option<String>,
    seen: Mutex<Vec<ConversationHistory>>,
}

impl ScriptedModel {
    pub(crate) fn new(turns: impl IntoIterator<Item = Turn>) -> Self {
        Self {
            turns: Mutex::new(turns.into_iter().collect()),
            repeat: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// A model that answers every request with `text`.
    pub(crate) fn repeating(text: &str) -> Self {
        Self {
            repeat: Some(text.to_string()),
            ..Self::new([])
        }
    }

    /// Histories the model was called with, in order.
    pub(crate) fn seen(&self) -> Vec<ConversationHistory> {
        self.seen.lock().unwrap().clone()
    }

    fn next_turn(&self, request: ModelRequest<'_>) -> Turn {
        self.seen.lock().unwrap().push(request.history.clone());
        let scripted = self.turns.lock().unwrap().pop_front();
        match (scripted, &self.repeat) {
            (Some(turn), _) => turn,
            (None, Some(text)) => Turn::Reply(vec![text.clone()]),
            (None, None) => Turn::Fail(ModelError::Api("script exhausted".into())),
        }
    }
}

impl LanguageModel for ScriptedModel {
    async fn generate(&self, request: ModelRequest<'_>) -> Result<Message, ModelError> {
        match self.next_turn(request) {
            Turn::Reply(chunks) | Turn::Hang(chunks) => Ok(Message::assistant(chunks.concat())),
            Turn::Fail(e) => Err(e),
        }
    }

    fn generate_streaming<'s>(
        &'s self,
        request: ModelRequest<'_>,
    ) -> BoxStream<'s, Result<String, ModelError>> {
        match self.next_turn(request) {
            Turn::Reply(chunks) => stream::iter(chunks.into_iter().map(Ok)).boxed(),
            Turn::Fail(e) => stream::once(async move { Err(e) }).boxed(),
            Turn::Hang(chunks) => stream::iter(chunks.into_iter().map(Ok))
                .chain(stream::pending())
                .boxed(),
        }
    }
}
