//! Child-process transport: one server process and its stdio pipes.

use std::collections::BTreeMap;
use std::process::Stdio;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};

use crate::error::SpawnError;

/// Maximum size of one inbound line (1MB).
/// Sized for large tool outputs (file reads, search results).
pub const MAX_LINE_SIZE: usize = 1024 * 1024;

/// How to start one tool-providing server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    /// Executable to run.
    pub path: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Entries override same-named variables of the parent environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl ServerDescriptor {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// One inbound line read from the server.
#[derive(Debug, PartialEq, Eq)]
pub enum Inbound {
    Line(String),
    /// Line exceeded [`MAX_LINE_SIZE`]; the rest of it is discarded.
    Oversized,
    /// The server closed stdout.
    Closed,
}

/// Owns the server process and a newline-framed byte channel to it.
///
/// The connector never looks inside the lines it carries. Partial lines
/// stay buffered in the reader, so a dropped [`recv`](Self::recv) resumes
/// where it left off.
pub struct Connector {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: Option<FramedRead<ChildStdout, LinesCodec>>,
    /// The reader reports one end-of-stream after a decode error.
    after_error: bool,
}

impl Connector {
    /// Spawn the server described by `descriptor`.
    pub fn open(descriptor: &ServerDescriptor) -> Result<Self, SpawnError> {
        let spawn_error = |source| SpawnError {
            path: descriptor.path.clone(),
            source,
        };

        let mut child = Command::new(&descriptor.path)
            .args(&descriptor.args)
            .envs(&descriptor.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_error(std::io::Error::other("failed to capture stdin")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error(std::io::Error::other("failed to capture stdout")))?;

        tracing::debug!(path = %descriptor.path, pid = ?child.id(), "spawned server");

        Ok(Self {
            child: Some(child),
            stdin: Some(stdin),
            stdout: Some(FramedRead::new(
                stdout,
                LinesCodec::new_with_max_length(MAX_LINE_SIZE),
            )),
            after_error: false,
        })
    }

    /// Whether the channel is still open on our side.
    pub fn is_open(&self) -> bool {
        self.child.is_some()
    }

    /// Write one line (a trailing newline is added) and flush.
    pub async fn send(&mut self, line: &str) -> std::io::Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::BrokenPipe))?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await
    }

    /// Read the next line from the server. Cancel safe.
    pub async fn recv(&mut self) -> std::io::Result<Inbound> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(Inbound::Closed);
        };

        loop {
            return match stdout.next().await {
                None if std::mem::take(&mut self.after_error) => continue,
                None => Ok(Inbound::Closed),
                Some(Ok(line)) => Ok(Inbound::Line(line)),
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    self.after_error = true;
                    Ok(Inbound::Oversized)
                }
                Some(Err(LinesCodecError::Io(e))) => Err(e),
            };
        }
    }

    /// Terminate the process and close both pipes. Safe to call repeatedly.
    pub async fn close(&mut self) {
        // Closing stdin first lets well-behaved servers exit on EOF.
        self.stdin.take();
        self.stdout.take();

        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                tracing::debug!("kill server: {e}");
            }
            match child.wait().await {
                Ok(status) => tracing::debug!(%status, "server reaped"),
                Err(e) => tracing::debug!("wait for server: {e}"),
            }
        }
    }
}
