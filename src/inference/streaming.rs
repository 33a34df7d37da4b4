//! SSE streaming response parser for OpenAI-compatible chat completions.
//!
//! Reads the HTTP body as a byte stream, splits on SSE boundaries
//! (`data: …\n\n`), parses each event as JSON, and accumulates tool call
//! fragments across deltas. Text-format tool calls are parsed once, when the
//! stream finishes.

use std::fmt::Display;

use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;

use super::config::ToolCallFormat;
use super::errors::InferenceError;
use super::tool_call_parser::{
    parse_inline_json_tool_calls, parse_native_json_tool_call, parse_pythonic_tool_calls,
};
use super::types::{ChatCompletionChunk, StreamChunk, ToolCall};

// ─── SSE Parsing ────────────────────────────────────────────────────────────

/// Parse an HTTP response body as SSE `StreamChunk`s.
pub fn parse_sse_stream(
    response: reqwest::Response,
    tool_call_format: ToolCallFormat,
    tools_requested: bool,
) -> impl Stream<Item = Result<StreamChunk, InferenceError>> + Send {
    parse_sse_bytes(response.bytes_stream(), tool_call_format, tools_requested)
}

/// Parse any byte stream carrying SSE events.
///
/// Bytes are buffered until a full event (`\n\n`) is available, so multi-byte
/// characters split across network chunks decode correctly.
pub fn parse_sse_bytes<S, B, E>(
    byte_stream: S,
    tool_call_format: ToolCallFormat,
    tools_requested: bool,
) -> impl Stream<Item = Result<StreamChunk, InferenceError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
{
    let state = StreamState::new(tool_call_format, tools_requested);

    stream::unfold(
        (Box::pin(byte_stream), state, Vec::<u8>::new()),
        |(mut byte_stream, mut state, mut buffer)| async move {
            loop {
                if let Some(event_end) = find_event_end(&buffer) {
                    let event = String::from_utf8_lossy(&buffer[..event_end]).into_owned();
                    buffer.drain(..event_end + 2);

                    match state.process_event(&event) {
                        Ok(Some(chunk)) => return Some((Ok(chunk), (byte_stream, state, buffer))),
                        Ok(None) => continue,
                        Err(e) => return Some((Err(e), (byte_stream, state, buffer))),
                    }
                }

                if state.input_done {
                    return match state.finalize() {
                        Ok(Some(chunk)) => Some((Ok(chunk), (byte_stream, state, buffer))),
                        Ok(None) => None,
                        Err(e) => Some((Err(e), (byte_stream, state, buffer))),
                    };
                }

                match byte_stream.next().await {
                    Some(Ok(bytes)) => {
                        buffer.extend(bytes.as_ref().iter().filter(|&&b| b != b'\r'));
                    }
                    Some(Err(e)) => {
                        return Some((
                            Err(InferenceError::StreamError {
                                reason: format!("stream read error: {e}"),
                            }),
                            (byte_stream, state, buffer),
                        ));
                    }
                    None => {
                        // Trailing event without a blank line. Finalizing
                        // happens on the next pass, in case the server never
                        // sent [DONE].
                        state.input_done = true;
                        if !buffer.is_empty() {
                            let event = String::from_utf8_lossy(&buffer).into_owned();
                            buffer.clear();
                            match state.process_event(event.trim()) {
                                Ok(Some(chunk)) => {
                                    return Some((Ok(chunk), (byte_stream, state, buffer)))
                                }
                                Ok(None) => {}
                                Err(e) => return Some((Err(e), (byte_stream, state, buffer))),
                            }
                        }
                    }
                }
            }
        },
    )
}

fn find_event_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

// ─── Stream State ───────────────────────────────────────────────────────────

/// Mutable state for accumulating tool call fragments across SSE events.
struct StreamState {
    tool_call_format: ToolCallFormat,
    tools_requested: bool,
    /// Accumulated text, scanned for text-format tool calls at the end.
    accumulated_content: String,
    /// In-progress native tool calls: `(index, id, name, arguments_buffer)`.
    pending_tool_calls: Vec<(u32, Option<String>, String, String)>,
    /// The byte stream has ended; only finalization remains.
    input_done: bool,
    finished: bool,
}

impl StreamState {
    fn new(tool_call_format: ToolCallFormat, tools_requested: bool) -> Self {
        Self {
            tool_call_format,
            tools_requested,
            accumulated_content: String::new(),
            pending_tool_calls: Vec::new(),
            input_done: false,
            finished: false,
        }
    }

    /// Process a single SSE event (may contain multiple `data:` lines).
    fn process_event(&mut self, event: &str) -> Result<Option<StreamChunk>, InferenceError> {
        let mut data_content = String::new();

        for line in event.lines() {
            if let Some(data) = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")) {
                let data = data.trim();
                if data == "[DONE]" {
                    return self.finalize();
                }
                data_content.push_str(data);
            }
        }

        if data_content.is_empty() {
            return Ok(None); // keep-alive or comment
        }

        let chunk: ChatCompletionChunk =
            serde_json::from_str(&data_content).map_err(|e| InferenceError::StreamError {
                reason: format!("failed to parse SSE chunk: {e} (data: {data_content})"),
            })?;

        self.process_chunk(chunk)
    }

    fn process_chunk(
        &mut self,
        chunk: ChatCompletionChunk,
    ) -> Result<Option<StreamChunk>, InferenceError> {
        let Some(choice) = chunk.choices.into_iter().next() else {
            return Ok(None);
        };

        let mut result = StreamChunk {
            token: None,
            tool_calls: None,
            finish_reason: choice.finish_reason,
        };

        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
            self.accumulated_content.push_str(&content);
            result.token = Some(content);
        }

        for tc in choice.delta.tool_calls.unwrap_or_default() {
            let index = tc.index.unwrap_or(0);
            let name_part = tc.function.as_ref().and_then(|f| f.name.clone()).unwrap_or_default();
            let args_part = tc
                .function
                .as_ref()
                .and_then(|f| f.arguments.clone())
                .unwrap_or_default();

            match self.pending_tool_calls.iter_mut().find(|(idx, ..)| *idx == index) {
                Some((_, id, name, args)) => {
                    name.push_str(&name_part);
                    args.push_str(&args_part);
                    if tc.id.is_some() {
                        *id = tc.id;
                    }
                }
                None => self.pending_tool_calls.push((index, tc.id, name_part, args_part)),
            }
        }

        if result.finish_reason.as_deref() == Some("tool_calls") && !self.pending_tool_calls.is_empty() {
            result.tool_calls = Some(self.finalize_native_tool_calls()?);
        }

        if result.token.is_none() && result.tool_calls.is_none() && result.finish_reason.is_none() {
            return Ok(None);
        }
        Ok(Some(result))
    }

    fn finalize_native_tool_calls(&mut self) -> Result<Vec<ToolCall>, InferenceError> {
        std::mem::take(&mut self.pending_tool_calls)
            .into_iter()
            .map(|(_, id, name, args)| parse_native_json_tool_call(id.as_deref(), &name, &args))
            .collect()
    }

    /// Emit whatever tool calls remain. Runs at most once.
    fn finalize(&mut self) -> Result<Option<StreamChunk>, InferenceError> {
        if self.finished {
            return Ok(None);
        }
        self.finished = true;

        if !self.pending_tool_calls.is_empty() {
            let calls = self.finalize_native_tool_calls()?;
            return Ok(Some(StreamChunk::tool_calls(calls)));
        }

        let calls = text_tool_calls(
            &self.accumulated_content,
            self.tool_call_format,
            self.tools_requested,
        )?;
        Ok((!calls.is_empty()).then(|| StreamChunk::tool_calls(calls)))
    }
}

/// Tool calls written into the text content rather than structured deltas.
fn text_tool_calls(
    text: &str,
    format: ToolCallFormat,
    tools_requested: bool,
) -> Result<Vec<ToolCall>, InferenceError> {
    if !tools_requested || text.trim().is_empty() {
        return Ok(Vec::new());
    }
    match format {
        ToolCallFormat::Pythonic => parse_pythonic_tool_calls(text),
        ToolCallFormat::NativeJson => Ok(parse_inline_json_tool_calls(text)),
    }
}

// ─── Non-streaming Responses ────────────────────────────────────────────────

/// Parse a complete (non-SSE) chat completion body.
///
/// Some servers ignore `stream: true` and answer with a single JSON body;
/// the client routes those here.
pub fn parse_non_streaming_response(
    body: &str,
    format: ToolCallFormat,
    tools_requested: bool,
) -> Result<StreamChunk, InferenceError> {
    #[derive(Deserialize)]
    struct NonStreamResponse {
        choices: Vec<NonStreamChoice>,
    }

    #[derive(Deserialize)]
    struct NonStreamChoice {
        message: NonStreamMessage,
        finish_reason: Option<String>,
    }

    #[derive(Deserialize)]
    struct NonStreamMessage {
        content: Option<String>,
        tool_calls: Option<Vec<NonStreamToolCall>>,
    }

    #[derive(Deserialize)]
    struct NonStreamToolCall {
        id: Option<String>,
        function: NonStreamFunction,
    }

    #[derive(Deserialize)]
    struct NonStreamFunction {
        name: String,
        arguments: String,
    }

    let resp: NonStreamResponse =
        serde_json::from_str(body).map_err(|e| InferenceError::StreamError {
            reason: format!("failed to parse non-streaming response: {e}"),
        })?;

    let choice = resp.choices.into_iter().next().ok_or(InferenceError::StreamError {
        reason: "empty choices array".into(),
    })?;

    // An empty `content` (reasoning model ran out of tokens while thinking)
    // is treated as no content.
    let content = choice.message.content.filter(|c| !c.is_empty());

    let mut tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| parse_native_json_tool_call(tc.id.as_deref(), &tc.function.name, &tc.function.arguments))
        .collect::<Result<Vec<_>, _>>()?;

    if tool_calls.is_empty() {
        if let Some(text) = &content {
            tool_calls = text_tool_calls(text, format, tools_requested)?;
        }
    }

    let finish_reason = if tool_calls.is_empty() {
        choice.finish_reason
    } else {
        Some("tool_calls".into())
    };

    Ok(StreamChunk {
        token: content,
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        finish_reason,
    })
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect_sse(parts: &[&str], format: ToolCallFormat, tools: bool) -> Vec<StreamChunk> {
        let owned: Vec<Result<Vec<u8>, std::io::Error>> =
            parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        parse_sse_bytes(stream::iter(owned), format, tools)
            .map(|r| r.unwrap())
            .collect()
            .await
    }

    fn text_of(chunks: &[StreamChunk]) -> String {
        chunks.iter().filter_map(|c| c.token.clone()).collect()
    }

    #[tokio::test]
    async fn test_sse_tokens_across_split_events() {
        let chunks = collect_sse(
            &[
                "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"},\"finish_reason\":null}]}\n\n: keep-alive\n\nda",
                "ta: {\"choices\":[{\"delta\":{\"content\":\"lo\"},\"finish_reason\":\"stop\"}]}\n\ndata: [DONE]\n\n",
            ],
            ToolCallFormat::NativeJson,
            false,
        )
        .await;
        assert_eq!(text_of(&chunks), "Hello");
        assert_eq!(chunks.last().unwrap().finish_reason.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn test_sse_multibyte_split_across_reads() {
        let event = "data: {\"choices\":[{\"delta\":{\"content\":\"3×10\"},\"finish_reason\":null}]}\n\n";
        let bytes = event.as_bytes();
        let split = event.find('×').unwrap() + 1; // inside the two-byte char
        let owned: Vec<Result<Vec<u8>, std::io::Error>> =
            vec![Ok(bytes[..split].to_vec()), Ok(bytes[split..].to_vec())];
        let chunks: Vec<StreamChunk> = parse_sse_bytes(stream::iter(owned), ToolCallFormat::NativeJson, false)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(text_of(&chunks), "3×10");
    }

    #[tokio::test]
    async fn test_sse_native_tool_call_fragments() {
        let chunks = collect_sse(
            &[
                "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_9\",\"function\":{\"name\":\"get_workout_\",\"arguments\":\"{\\\"li\"}}]},\"finish_reason\":null}]}\n\n",
                "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"name\":\"history\",\"arguments\":\"mit\\\": 2}\"}}]},\"finish_reason\":null}]}\n\n",
                "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n\ndata: [DONE]\n\n",
            ],
            ToolCallFormat::NativeJson,
            true,
        )
        .await;
        let calls: Vec<ToolCall> = chunks.into_iter().filter_map(|c| c.tool_calls).flatten().collect();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_9");
        assert_eq!(calls[0].name, "get_workout_history");
        assert_eq!(calls[0].arguments["limit"], 2);
    }

    #[tokio::test]
    async fn test_sse_pythonic_calls_emitted_once_without_done() {
        let chunks = collect_sse(
            &[
                "data: {\"choices\":[{\"delta\":{\"content\":\"Tool: get_profile\\n\"},\"finish_reason\":null}]}\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"Arguments: {}\"},\"finish_reason\":\"stop\"}]}",
            ],
            ToolCallFormat::Pythonic,
            true,
        )
        .await;
        let calls: Vec<ToolCall> = chunks.into_iter().filter_map(|c| c.tool_calls).flatten().collect();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "get_profile");
    }

    #[tokio::test]
    async fn test_sse_text_calls_ignored_without_tools() {
        let chunks = collect_sse(
            &["data: {\"choices\":[{\"delta\":{\"content\":\"Tool: get_profile\"},\"finish_reason\":\"stop\"}]}\n\ndata: [DONE]\n\n"],
            ToolCallFormat::Pythonic,
            false,
        )
        .await;
        assert!(chunks.iter().all(|c| c.tool_calls.is_none()));
    }

    #[tokio::test]
    async fn test_sse_malformed_chunk_is_error() {
        let owned: Vec<Result<Vec<u8>, std::io::Error>> = vec![Ok(b"data: {not json}\n\n".to_vec())];
        let results: Vec<_> = parse_sse_bytes(stream::iter(owned), ToolCallFormat::NativeJson, false)
            .collect()
            .await;
        assert!(matches!(results[0], Err(InferenceError::StreamError { .. })));
    }

    #[test]
    fn test_parse_non_streaming_with_content() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": "Hello!", "reasoning": "hmm"}, "finish_reason": "stop"}]}"#;
        let chunk = parse_non_streaming_response(body, ToolCallFormat::NativeJson, false).unwrap();
        assert_eq!(chunk.token.as_deref(), Some("Hello!"));
        assert!(chunk.tool_calls.is_none());
        assert_eq!(chunk.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_parse_non_streaming_with_tool_calls() {
        let body = r#"{
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {"name": "navigate_to", "arguments": "{\"screen\": \"profile\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        }"#;
        let chunk = parse_non_streaming_response(body, ToolCallFormat::NativeJson, true).unwrap();
        let calls = chunk.tool_calls.unwrap();
        assert_eq!(calls[0].name, "navigate_to");
        assert_eq!(calls[0].arguments["screen"], "profile");
    }

    #[test]
    fn test_parse_non_streaming_empty_content_and_choices() {
        let body = r#"{"choices": [{"message": {"content": ""}, "finish_reason": "length"}]}"#;
        let chunk = parse_non_streaming_response(body, ToolCallFormat::NativeJson, false).unwrap();
        assert!(chunk.token.is_none());
        assert_eq!(chunk.finish_reason.as_deref(), Some("length"));

        assert!(parse_non_streaming_response(r#"{"choices": []}"#, ToolCallFormat::NativeJson, false).is_err());
    }
}
