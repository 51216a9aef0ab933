//! The bounded multi-turn loop for one user query.
//!
//! Each turn asks the model for a response, forwards its text as it
//! arrives, extracts tool calls from the full text and executes them in
//! order. The loop ends on a response without tool calls, on the turn
//! bound, on a model failure or on cancellation.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use futures::stream::{self, BoxStream, Stream, StreamExt};
use mcp::{SessionBusyError, ToolCatalog};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::model::{ConversationHistory, LanguageModel, Message, ModelError, ModelRequest};
use crate::tools::{ToolExecutor, ToolHost, ToolInvocation, ToolOutcome, extract};

pub const DEFAULT_MAX_TURNS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Model calls allowed per query.
    pub max_turns: usize,
    /// Use the model's streaming generation; otherwise one chunk per turn.
    pub streaming: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
            streaming: true,
        }
    }
}

/// Why a query stopped early.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QueryError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    SessionBusy(#[from] SessionBusyError),

    /// The tool catalog could not be read.
    #[error(transparent)]
    Session(#[from] mcp::Error),
}

/// One piece of query output.
#[derive(Debug)]
pub enum Chunk {
    /// Model text, as produced.
    Text(String),
    /// A tool finished, successfully or not.
    ToolStatus(ToolOutcome),
    /// The turn bound was reached without a final answer.
    TurnLimit { max_turns: usize },
    /// Terminal failure.
    Error(QueryError),
    /// Terminal; the query was cancelled.
    Cancelled,
}

impl Chunk {
    /// Whether nothing follows this chunk.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::TurnLimit { .. } | Self::Error(_) | Self::Cancelled
        )
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::ToolStatus(outcome) => {
                let arguments = serde_json::Value::Object(outcome.arguments.clone());
                write!(
                    f,
                    "\n\nUsing tool: {}\nParameters: {arguments}\n",
                    outcome.tool
                )?;
                if outcome.success {
                    write!(f, "Result:\n{}\n\n", outcome.display)
                } else {
                    write!(f, "{}\n\n", outcome.display)
                }
            }
            Self::TurnLimit { max_turns } => {
                write!(f, "\n\nReached maximum number of turns ({max_turns}).")
            }
            Self::Error(e) => write!(f, "\n\nError: {e}"),
            Self::Cancelled => f.write_str("\n\n[cancelled]"),
        }
    }
}

/// Drives one query against a model and a tool host.
pub struct Orchestrator<'a, M, H> {
    model: &'a M,
    host: &'a H,
    config: OrchestratorConfig,
}

impl<'a, M: LanguageModel, H: ToolHost> Orchestrator<'a, M, H> {
    pub fn new(model: &'a M, host: &'a H, config: OrchestratorConfig) -> Self {
        Self {
            model,
            host,
            config,
        }
    }

    /// Run the loop over `history`, which must hold the user's query.
    ///
    /// The history is extended in place. Cancelling `cancel` stops the
    /// stream at its next step; a tool call already dispatched completes
    /// first and its outcome is kept.
    pub fn run(
        self,
        history: &'a mut ConversationHistory,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Chunk> + Send + 'a {
        let turns = TurnLoop {
            model: self.model,
            host: self.host,
            config: self.config,
            history,
            catalog: Arc::default(),
            cancel,
            turn: 0,
            phase: Phase::Start,
        };

        stream::unfold(turns, |mut turns| async move {
            let chunk = turns.advance().await?;
            Some((chunk, turns))
        })
    }
}

enum Phase<'a> {
    Start,
    /// About to call the model.
    Begin,
    Streaming {
        stream: BoxStream<'a, Result<String, ModelError>>,
        text: String,
    },
    /// The model's full response is in.
    Respond(String),
    Executing(VecDeque<ToolInvocation>),
    Done,
}

struct TurnLoop<'a, M, H> {
    model: &'a M,
    host: &'a H,
    config: OrchestratorConfig,
    history: &'a mut ConversationHistory,
    catalog: Arc<ToolCatalog>,
    cancel: CancellationToken,
    turn: usize,
    phase: Phase<'a>,
}

impl<'a, M: LanguageModel, H: ToolHost> TurnLoop<'a, M, H> {
    async fn advance(&mut self) -> Option<Chunk> {
        loop {
            if matches!(self.phase, Phase::Done) {
                return None;
            }
            if self.cancel.is_cancelled() {
                return Some(self.cancelled());
            }

            match std::mem::replace(&mut self.phase, Phase::Done) {
                Phase::Start => match self.host.tools() {
                    Ok(catalog) => {
                        self.catalog = catalog;
                        self.phase = Phase::Begin;
                    }
                    Err(e) => return Some(Chunk::Error(e.into())),
                },

                Phase::Begin => {
                    if self.turn >= self.config.max_turns {
                        tracing::warn!(max_turns = self.config.max_turns, "turn limit reached");
                        return Some(Chunk::TurnLimit {
                            max_turns: self.config.max_turns,
                        });
                    }
                    self.turn += 1;
                    tracing::debug!(turn = self.turn, "model turn");

                    let model = self.model;
                    let request = ModelRequest::new(&*self.history, &self.catalog);
                    if self.config.streaming {
                        self.phase = Phase::Streaming {
                            stream: model.generate_streaming(request),
                            text: String::new(),
                        };
                        continue;
                    }

                    let generated = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => None,
                        generated = model.generate(request) => Some(generated),
                    };
                    let Some(generated) = generated else {
                        return Some(self.cancelled());
                    };
                    match generated {
                        Ok(message) => {
                            let text = message.text().unwrap_or_default().to_string();
                            self.phase = Phase::Respond(text.clone());
                            if !text.is_empty() {
                                return Some(Chunk::Text(text));
                            }
                        }
                        Err(e) => return Some(self.model_failed(e)),
                    }
                }

                Phase::Streaming { mut stream, mut text } => {
                    let next = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => None,
                        next = stream.next() => Some(next),
                    };
                    let Some(next) = next else {
                        return Some(self.cancelled());
                    };
                    match next {
                        Some(Ok(delta)) => {
                            text.push_str(&delta);
                            self.phase = Phase::Streaming { stream, text };
                            if !delta.is_empty() {
                                return Some(Chunk::Text(delta));
                            }
                        }
                        Some(Err(e)) => return Some(self.model_failed(e)),
                        None => self.phase = Phase::Respond(text),
                    }
                }

                Phase::Respond(text) => {
                    let invocations: VecDeque<ToolInvocation> =
                        extract(&text, &self.catalog).collect();
                    self.history.push(Message::assistant(text));
                    if invocations.is_empty() {
                        tracing::debug!(turn = self.turn, "final answer");
                        return None;
                    }
                    tracing::debug!(count = invocations.len(), "tool calls extracted");
                    self.phase = Phase::Executing(invocations);
                }

                Phase::Executing(mut pending) => {
                    let Some(invocation) = pending.pop_front() else {
                        self.phase = Phase::Begin;
                        continue;
                    };
                    if invocation.is_fallback() {
                        tracing::debug!(tool = %invocation.name, "executing loosely matched tool call");
                    }

                    // Not raced against cancellation: a dispatched call always completes.
                    let executor = ToolExecutor::new(self.host, &self.catalog);
                    match executor.execute(&invocation).await {
                        Ok(outcome) => {
                            self.history.push(Message::tool_result(outcome.clone()));
                            self.phase = Phase::Executing(pending);
                            return Some(Chunk::ToolStatus(outcome));
                        }
                        Err(busy) => return Some(Chunk::Error(busy.into())),
                    }
                }

                Phase::Done => return None,
            }
        }
    }

    fn cancelled(&mut self) -> Chunk {
        tracing::debug!(turn = self.turn, "query cancelled");
        self.phase = Phase::Done;
        Chunk::Cancelled
    }

    fn model_failed(&mut self, e: ModelError) -> Chunk {
        tracing::warn!(turn = self.turn, "model call failed: {e}");
        self.phase = Phase::Done;
        Chunk::Error(e.into())
    }
}
