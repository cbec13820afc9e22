use ds_backend::{BatchBuffer, ModelBackend, TokenId, DEFAULT_BATCH_CAPACITY};
use tracing::{debug, info};

use crate::context::{ContextGuard, ModelContext};
use crate::error::{InferenceError, Result};
use crate::params::GenerateParams;
use crate::stream::{GenerationStats, TokenStream, SEQ_ID};

/// Runs generations against a `ModelContext`.
///
/// Sessions are cheap; several may share one context. Generations are
/// serialized by the context: `infer` waits for a running stream to
/// terminate, `try_infer` fails with `InferenceError::Busy` instead.
pub struct Session<'a, B: ModelBackend> {
    ctx: &'a ModelContext<B>,
    params: GenerateParams,
}

impl<'a, B: ModelBackend> Session<'a, B> {
    pub fn new(ctx: &'a ModelContext<B>) -> Self {
        Self::with_params(ctx, GenerateParams::default())
    }

    pub fn with_params(ctx: &'a ModelContext<B>, params: GenerateParams) -> Self {
        Self { ctx, params }
    }

    pub fn params(&self) -> &GenerateParams {
        &self.params
    }

    /// Start generating up to `max_tokens` tokens after `prompt`, using the
    /// session's other parameters.
    ///
    /// Blocks like `infer_with_params`.
    pub fn infer(&self, prompt: &str, max_tokens: usize) -> Result<TokenStream<'a, B>> {
        let params = GenerateParams {
            max_tokens,
            ..self.params.clone()
        };
        self.infer_with_params(prompt, &params)
    }

    /// Start a generation, waiting for the context if another stream holds it.
    ///
    /// The wait is not reentrant: calling this on a thread that still owns a
    /// non-terminal stream over the same context deadlocks. Drain, cancel
    /// and poll, or drop that stream first, or use `try_infer`.
    ///
    /// Fails before any decode with `KvCacheTooSmall` when the prompt plus
    /// `max_tokens` does not fit the context window, and with
    /// `DecodingFailure` when prefill fails.
    pub fn infer_with_params(
        &self,
        prompt: &str,
        params: &GenerateParams,
    ) -> Result<TokenStream<'a, B>> {
        start(self.ctx.lock(), prompt, params)
    }

    /// Like `infer_with_params`, but fails with `Busy` instead of waiting.
    pub fn try_infer(&self, prompt: &str, params: &GenerateParams) -> Result<TokenStream<'a, B>> {
        let guard = self.ctx.try_lock().ok_or(InferenceError::Busy)?;
        start(guard, prompt, params)
    }

    /// Drive a generation, passing every chunk to `on_chunk`.
    ///
    /// Returning `false` from the callback cancels the generation.
    pub fn infer_with<F>(
        &self,
        prompt: &str,
        params: &GenerateParams,
        mut on_chunk: F,
    ) -> Result<GenerationStats>
    where
        F: FnMut(&str) -> bool,
    {
        let mut stream = self.infer_with_params(prompt, params)?;
        let cancel = stream.cancel_handle();
        for chunk in stream.by_ref() {
            if !on_chunk(&chunk?) {
                cancel.cancel();
            }
        }
        Ok(stream.stats())
    }
}

fn start<'a, B: ModelBackend>(
    mut guard: ContextGuard<'a, B>,
    prompt: &str,
    params: &GenerateParams,
) -> Result<TokenStream<'a, B>> {
    let ctx = guard.model_context();
    let tokens = ctx.tokenize(prompt, true)?;
    if tokens.is_empty() {
        return Err(InferenceError::EmptyPrompt);
    }

    let n_ctx = ctx.context_window_size();
    // Saturates so an oversized `max_tokens` still fails the window check.
    let n_kv_req = tokens.len().saturating_add(params.max_tokens);
    info!(
        prompt_tokens = tokens.len(),
        max_tokens = params.max_tokens,
        n_len = params.n_len,
        n_ctx,
        n_kv_req,
        "starting generation"
    );
    if n_kv_req > n_ctx {
        return Err(InferenceError::KvCacheTooSmall {
            required: n_kv_req,
            available: n_ctx,
        });
    }

    guard.clear_kv_cache();
    let mut batch = BatchBuffer::new(DEFAULT_BATCH_CAPACITY);
    prefill(&mut guard, &mut batch, &tokens)?;

    Ok(TokenStream::new(guard, batch, tokens.len(), params))
}

/// Submit the prompt in decode steps of at most one batch each. Only the
/// final prompt token requests logits.
fn prefill<B: ModelBackend>(
    guard: &mut ContextGuard<'_, B>,
    batch: &mut BatchBuffer,
    tokens: &[TokenId],
) -> Result<()> {
    let last = tokens.len() - 1;
    let chunk_len = batch.capacity();

    for (chunk_idx, chunk) in tokens.chunks(chunk_len).enumerate() {
        let base = chunk_idx * chunk_len;
        batch.clear();
        for (offset, &token) in chunk.iter().enumerate() {
            let pos = base + offset;
            batch.append(token, pos, &[SEQ_ID], pos == last);
        }
        guard
            .decode_step(batch)
            .map_err(|source| InferenceError::DecodingFailure { pos: base, source })?;
        debug!(chunk = chunk_idx, n_tokens = chunk.len(), "prefill step decoded");
    }
    Ok(())
}
