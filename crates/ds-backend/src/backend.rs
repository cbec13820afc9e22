use std::path::Path;

use crate::batch::BatchBuffer;
use crate::error::Result;
use crate::params::{ContextParams, ModelParams};

/// Vocabulary token identifier as understood by the backend.
pub type TokenId = i32;

/// Trait for model backends (llama.cpp bindings, test doubles, etc.).
///
/// The backend owns tokenization and the forward pass. Callers only see
/// opaque `Model` and `Context` handles. Both handle types release their
/// native resources on drop, so a `Context` must be dropped before the
/// `Model` it was created from.
pub trait ModelBackend: Send + Sync {
    /// Loaded model handle (vocabulary and weights). Immutable after load.
    type Model: Send + Sync;
    /// Inference context bound to one model. Holds the KV cache and is
    /// mutated by every decode call.
    type Context: Send;

    /// Returns the name of this backend (e.g., "llama.cpp", "mock").
    fn name(&self) -> &str;

    /// Process-level runtime initialization.
    ///
    /// Called by `BackendRuntime` when the first lease is taken.
    fn init(&self) -> Result<()>;

    /// Process-level runtime teardown, paired with `init`.
    fn shutdown(&self);

    /// Whether model layers can be offloaded to an accelerator in this
    /// environment. Simulators and sandboxes report `false`.
    fn supports_gpu_offload(&self) -> bool;

    /// Load a model file.
    fn load_model(&self, path: &Path, params: &ModelParams) -> Result<Self::Model>;

    /// Allocate an inference context for `model`.
    fn create_context(&self, model: &Self::Model, params: &ContextParams)
        -> Result<Self::Context>;

    /// Context window size in tokens.
    fn context_size(&self, context: &Self::Context) -> usize;

    /// Tokenize `text`, optionally prepending the beginning-of-sequence marker.
    fn tokenize(&self, model: &Self::Model, text: &str, add_bos: bool) -> Result<Vec<TokenId>>;

    /// Drop every cached position so the next decode starts at position 0.
    fn clear_kv_cache(&self, context: &mut Self::Context);

    /// Run one decode step over every slot in `batch`.
    ///
    /// A non-zero backend status is reported as `BackendError::Decode`.
    fn decode(&self, context: &mut Self::Context, batch: &BatchBuffer) -> Result<()>;

    /// Logits produced by the last decode for the slot at `index` in the
    /// submitted batch. `None` if that slot did not request logits.
    fn logits<'c>(&self, context: &'c Self::Context, index: usize) -> Option<&'c [f32]>;

    /// Raw bytes of a token's piece. May be a partial UTF-8 sequence.
    fn token_to_piece(&self, model: &Self::Model, token: TokenId) -> Vec<u8>;

    /// Whether `token` ends generation (EOS, EOT, ...).
    fn is_end_of_generation(&self, model: &Self::Model, token: TokenId) -> bool;
}
