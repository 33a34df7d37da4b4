//! Streaming session controller.
//!
//! A [`StreamSession`] owns delivery of one response to the caller: it
//! forwards text chunks to the caller's callback and watches a
//! [`CancellationToken`]. Once the token fires, no further chunk reaches the
//! callback and every pending read resolves to [`SessionError::Aborted`].

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use super::errors::SessionError;
use super::generator::{ChunkStream, Generation};

/// Receives response text as it is produced.
pub type ChunkCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Delivery state for one response.
pub struct StreamSession {
    on_chunk: Option<ChunkCallback>,
    cancel: CancellationToken,
    chunks_emitted: usize,
}

impl StreamSession {
    /// A session with an optional callback. Without a token the session can
    /// still be cancelled through [`cancel_token`](Self::cancel_token).
    pub fn new(on_chunk: Option<ChunkCallback>, cancel: Option<CancellationToken>) -> Self {
        Self {
            on_chunk,
            cancel: cancel.unwrap_or_default(),
            chunks_emitted: 0,
        }
    }

    /// A session with no callback, for internal generations.
    pub fn detached() -> Self {
        Self::new(None, None)
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_aborted(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn chunks_emitted(&self) -> usize {
        self.chunks_emitted
    }

    /// Forward text to the callback. Returns whether anything was delivered.
    pub fn emit(&mut self, text: &str) -> bool {
        if text.is_empty() || self.is_aborted() {
            return false;
        }
        let Some(on_chunk) = &self.on_chunk else {
            return false;
        };
        on_chunk(text);
        self.chunks_emitted += 1;
        true
    }

    /// Fail with `Aborted` once the session has been cancelled. Checked
    /// before anything with side effects.
    pub fn ensure_active(&self) -> Result<(), SessionError> {
        if self.is_aborted() {
            return Err(SessionError::Aborted);
        }
        Ok(())
    }

    /// Drain a chunk stream, racing every read against cancellation.
    ///
    /// Text tokens are forwarded to the callback when `deliver` is set.
    pub async fn collect(
        &mut self,
        mut stream: ChunkStream,
        deliver: bool,
    ) -> Result<Generation, SessionError> {
        self.ensure_active()?;
        let mut generation = Generation::default();

        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    tracing::info!(
                        chunks_emitted = self.chunks_emitted,
                        collected_chars = generation.text.len(),
                        "stream cancelled"
                    );
                    return Err(SessionError::Aborted);
                }
                item = stream.next() => item,
            };

            match next {
                Some(Ok(chunk)) => {
                    if deliver {
                        if let Some(token) = chunk.token.as_deref() {
                            self.emit(token);
                        }
                    }
                    generation.absorb(chunk);
                }
                Some(Err(e)) => return Err(e.into()),
                None => break,
            }
        }

        self.ensure_active()?;
        Ok(generation)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
