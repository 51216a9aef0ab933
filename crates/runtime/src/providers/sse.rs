//! Server-sent event decoding over a response body.

use std::collections::VecDeque;
use std::pin::Pin;

use futures::stream::{self, BoxStream, Stream, StreamExt};

use crate::model::ModelError;

/// Splits a byte stream into the `data` payloads of its events.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buf: Vec<u8>,
    data: Option<String>,
}

impl SseDecoder {
    /// Feed bytes and return every event completed by them.
    pub(crate) fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(newline) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=newline).collect();
            if let Some(event) = self.line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush whatever the stream ended with.
    pub(crate) fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        if let Some(event) = self.line(&rest) {
            return Some(event);
        }
        self.data.take()
    }

    fn line(&mut self, raw: &[u8]) -> Option<String> {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches(['\n', '\r']);
        if line.is_empty() {
            return self.data.take();
        }
        // Comments and the event/id/retry fields carry nothing we need.
        let value = line.strip_prefix("data:")?;
        let value = value.strip_prefix(' ').unwrap_or(value);
        match &mut self.data {
            Some(data) => {
                data.push('\n');
                data.push_str(value);
            }
            None => self.data = Some(value.to_string()),
        }
        None
    }
}

struct State<S> {
    body: Pin<Box<S>>,
    decoder: SseDecoder,
    ready: VecDeque<String>,
    done: bool,
}

/// Event payloads of a streaming response, in order.
pub(crate) fn data_events<S, B>(body: S) -> BoxStream<'static, Result<String, ModelError>>
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = State {
        body: Box::pin(body),
        decoder: SseDecoder::default(),
        ready: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.ready.pop_front() {
                return Some((Ok(event), state));
            }
            if state.done {
                return None;
            }
            match state.body.next().await {
                Some(Ok(bytes)) => state.ready.extend(state.decoder.feed(bytes.as_ref())),
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(ModelError::Network(e.to_string())), state));
                }
                None => {
                    state.done = true;
                    state.ready.extend(state.decoder.finish());
                }
            }
        }
    })
    .boxed()
}
