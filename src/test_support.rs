//! Shared fixtures for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::{stream, StreamExt};

use crate::inference::errors::InferenceError;
use crate::inference::generator::{ChunkStream, GenerationRequest, Generator};
use crate::inference::session::ChunkCallback;
use crate::inference::types::{StreamChunk, ToolCall};

/// One scripted generator reply.
pub(crate) enum Script {
    /// Stream these text chunks, then end.
    Text(Vec<String>),
    /// Emit these tool calls, then end.
    ToolCalls(Vec<ToolCall>),
    /// Stream these chunks, then never finish.
    Hang(Vec<String>),
    /// Fail before producing anything.
    Fail,
    /// Panic inside `stream`.
    Panic,
}

impl Script {
    pub(crate) fn text(text: &str) -> Self {
        Script::Text(vec![text.to_string()])
    }

    pub(crate) fn chunks(chunks: &[&str]) -> Self {
        Script::Text(chunks.iter().map(|c| c.to_string()).collect())
    }
}

/// Generator that replays scripts in order and records every request.
/// Once the scripts run out it behaves like an unreachable endpoint.
#[derive(Default)]
pub(crate) struct ScriptedGenerator {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub(crate) fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

fn token_stream(chunks: Vec<String>) -> impl futures::Stream<Item = Result<StreamChunk, InferenceError>> {
    stream::iter(chunks.into_iter().map(|c| Ok(StreamChunk::token(c))))
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn stream(&self, request: GenerationRequest) -> Result<ChunkStream, InferenceError> {
        self.requests.lock().unwrap().push(request);
        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(Script::Text(chunks)) => Ok(token_stream(chunks).boxed()),
            Some(Script::ToolCalls(calls)) => {
                Ok(stream::iter(vec![Ok(StreamChunk::tool_calls(calls))]).boxed())
            }
            Some(Script::Hang(chunks)) => Ok(token_stream(chunks).chain(stream::pending()).boxed()),
            Some(Script::Fail) => Err(InferenceError::ConnectionFailed {
                endpoint: "scripted".into(),
                reason: "connection refused".into(),
            }),
            Some(Script::Panic) => panic!("scripted generator panic"),
            None => Err(InferenceError::AllModelsUnavailable {
                attempted: vec!["scripted".into()],
            }),
        }
    }
}

/// A chunk callback that records what it receives.
pub(crate) fn recorder() -> (ChunkCallback, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback: ChunkCallback = Arc::new(move |text: &str| {
        sink.lock().unwrap().push(text.to_string());
    });
    (callback, seen)
}
