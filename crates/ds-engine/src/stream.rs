use std::fmt;
use std::iter::FusedIterator;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ds_backend::{BatchBuffer, ModelBackend, SeqId, TokenId};
use ds_sampler::SamplerChain;
use tracing::{debug, info, trace, warn};

use crate::context::ContextGuard;
use crate::error::{InferenceError, Result};
use crate::params::{DecodeFailurePolicy, GenerateParams};
use crate::utf8::Utf8Reassembler;

/// Sequence id of every batch slot: generation is single-sequence.
pub(crate) const SEQ_ID: SeqId = 0;

/// Lifecycle of a `TokenStream`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Generating,
    /// End-of-generation token or a length limit was reached.
    Completed,
    /// Stopped through a `CancelHandle`.
    Cancelled,
    /// A decode step failed.
    Failed,
}

impl StreamState {
    pub fn is_terminal(self) -> bool {
        self != StreamState::Generating
    }
}

/// Cooperative cancellation flag for a running stream.
///
/// Checked once before each generation step; a decode step already in
/// progress runs to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Statistics from a generation run.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationStats {
    pub prompt_tokens: usize,
    /// Sampled tokens that advanced the sequence. Under
    /// `DecodeFailurePolicy::Abort` the token whose decode failed is still
    /// emitted as text but not counted.
    pub generated_tokens: usize,
    /// Time spent in the generation loop, prefill excluded.
    pub elapsed: Duration,
    pub state: StreamState,
}

impl GenerationStats {
    pub fn tokens_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.generated_tokens as f64 / secs
        } else {
            0.0
        }
    }
}

/// Per-call scratch state, dropped as soon as the stream terminates.
struct Scratch<'a, B: ModelBackend> {
    guard: ContextGuard<'a, B>,
    batch: BatchBuffer,
    sampler: SamplerChain,
    reassembler: Utf8Reassembler,
    n_cur: usize,
    n_len: usize,
    n_decode: usize,
    max_tokens: usize,
    policy: DecodeFailurePolicy,
    failure: Option<InferenceError>,
}

enum Step {
    Emit(String),
    /// Token consumed but its bytes are not yet decodable.
    Pending,
    Complete,
    Fail(InferenceError),
}

impl<B: ModelBackend> Scratch<'_, B> {
    fn advance(&mut self) {
        self.n_cur += 1;
        self.n_decode += 1;
    }

    fn step(&mut self) -> Step {
        if let Some(err) = self.failure.take() {
            return Step::Fail(err);
        }
        if self.n_cur >= self.n_len || self.n_decode >= self.max_tokens {
            return Step::Complete;
        }

        let index = self.batch.len().saturating_sub(1);
        let logits = match self.guard.logits(index) {
            Some(logits) => logits,
            None => return Step::Fail(InferenceError::MissingLogits(index)),
        };
        let token = self.sampler.sample(logits) as TokenId;

        let ctx = self.guard.model_context();
        if ctx.is_end_of_generation(token) {
            debug!(token, pos = self.n_cur, "end of generation");
            return Step::Complete;
        }

        let piece = ctx.piece_bytes(token);
        let text = self.reassembler.feed(&piece);
        trace!(token, pos = self.n_cur, piece_len = piece.len(), "sampled token");

        let pos = self.n_cur;
        self.batch.clear();
        self.batch.append(token, pos, &[SEQ_ID], true);

        match self.guard.decode_step(&self.batch) {
            Ok(()) => self.advance(),
            Err(source) => match self.policy {
                DecodeFailurePolicy::Abort => {
                    warn!(pos, error = %source, "decode failed, aborting generation");
                    self.failure = Some(InferenceError::DecodingFailure { pos, source });
                }
                DecodeFailurePolicy::Continue => {
                    warn!(pos, error = %source, "decode failed, continuing");
                    self.advance();
                }
            },
        }

        if text.is_empty() {
            Step::Pending
        } else {
            Step::Emit(text)
        }
    }
}

/// Lazily generated text chunks of one `infer` call.
///
/// Each `next` samples and decodes until a non-empty chunk is available or
/// the stream terminates. The stream holds the model context exclusively
/// until it reaches a terminal state; cancellation ends it silently.
pub struct TokenStream<'a, B: ModelBackend> {
    scratch: Option<Scratch<'a, B>>,
    state: StreamState,
    cancel: CancelHandle,
    prompt_tokens: usize,
    generated_tokens: usize,
    started: Instant,
    elapsed: Option<Duration>,
}

impl<'a, B: ModelBackend> TokenStream<'a, B> {
    /// Stream over a context whose prefill left logits on the last slot of
    /// `batch`.
    pub(crate) fn new(
        guard: ContextGuard<'a, B>,
        batch: BatchBuffer,
        prompt_tokens: usize,
        params: &GenerateParams,
    ) -> Self {
        let scratch = Scratch {
            guard,
            batch,
            sampler: SamplerChain::from_params(&params.sampler),
            reassembler: Utf8Reassembler::new(),
            n_cur: prompt_tokens,
            n_len: params.n_len,
            n_decode: 0,
            max_tokens: params.max_tokens,
            policy: params.on_decode_failure,
            failure: None,
        };
        Self {
            scratch: Some(scratch),
            state: StreamState::Generating,
            cancel: CancelHandle::new(),
            prompt_tokens,
            generated_tokens: 0,
            started: Instant::now(),
            elapsed: None,
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Whether the stream still holds the model context and its scratch
    /// buffers.
    pub fn holds_context(&self) -> bool {
        self.scratch.is_some()
    }

    pub fn stats(&self) -> GenerationStats {
        GenerationStats {
            prompt_tokens: self.prompt_tokens,
            generated_tokens: self
                .scratch
                .as_ref()
                .map_or(self.generated_tokens, |s| s.n_decode),
            elapsed: self.elapsed.unwrap_or_else(|| self.started.elapsed()),
            state: self.state,
        }
    }

    fn finish(&mut self, state: StreamState) -> String {
        let Some(mut scratch) = self.scratch.take() else {
            return String::new();
        };
        self.state = state;
        self.generated_tokens = scratch.n_decode;
        self.elapsed = Some(self.started.elapsed());

        let tail = match state {
            StreamState::Completed => scratch.reassembler.flush(),
            _ => String::new(),
        };

        let stats = self.stats();
        info!(
            state = ?state,
            generated = stats.generated_tokens,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            tokens_per_second = stats.tokens_per_second(),
            "generation finished"
        );
        tail
    }
}

impl<B: ModelBackend> fmt::Debug for TokenStream<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStream")
            .field("state", &self.state)
            .field("holds_context", &self.holds_context())
            .field("prompt_tokens", &self.prompt_tokens)
            .finish()
    }
}

impl<B: ModelBackend> Iterator for TokenStream<'_, B> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.scratch.is_none() {
                return None;
            }
            if self.cancel.is_cancelled() {
                self.finish(StreamState::Cancelled);
                return None;
            }

            let step = self.scratch.as_mut()?.step();
            match step {
                Step::Emit(text) => return Some(Ok(text)),
                Step::Pending => continue,
                Step::Complete => {
                    let tail = self.finish(StreamState::Completed);
                    return (!tail.is_empty()).then_some(Ok(tail));
                }
                Step::Fail(err) => {
                    self.finish(StreamState::Failed);
                    return Some(Err(err));
                }
            }
        }
    }
}

impl<B: ModelBackend> FusedIterator for TokenStream<'_, B> {}
