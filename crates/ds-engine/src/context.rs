use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use ds_backend::{
    BackendRuntime, BatchBuffer, ContextParams, ModelBackend, ModelParams, RuntimeLease, TokenId,
};
use tracing::{debug, info};

use crate::error::{InferenceError, Result};

/// Context window used by `ModelContext::load`.
pub const DEFAULT_CONTEXT_SIZE: u32 = 2048;

/// A loaded model and its inference context.
///
/// Created once per model file and reused across generations. The context
/// handle sits behind a mutex: only one generation at a time may decode
/// against it.
pub struct ModelContext<B: ModelBackend> {
    // Fields drop in declaration order: context, model, then the lease.
    context: Mutex<B::Context>,
    model: B::Model,
    n_ctx: usize,
    lease: RuntimeLease<B>,
}

impl<B: ModelBackend> ModelContext<B> {
    /// Load the model at `path` with an `n_ctx`-token context and default
    /// model/thread parameters.
    pub fn load(
        runtime: &Arc<BackendRuntime<B>>,
        path: impl AsRef<Path>,
        n_ctx: u32,
    ) -> Result<Self> {
        Self::load_with_params(
            runtime,
            path,
            ModelParams::default(),
            ContextParams::with_n_ctx(n_ctx),
        )
    }

    /// Load with explicit parameters.
    ///
    /// Any handle acquired before a failure is released before the error is
    /// returned.
    pub fn load_with_params(
        runtime: &Arc<BackendRuntime<B>>,
        path: impl AsRef<Path>,
        mut model_params: ModelParams,
        context_params: ContextParams,
    ) -> Result<Self> {
        let path = path.as_ref();
        let lease = runtime.lease()?;
        let backend = lease.backend();

        if !backend.supports_gpu_offload() && model_params.n_gpu_layers > 0 {
            debug!(
                requested = model_params.n_gpu_layers,
                "GPU offload unavailable, forcing n_gpu_layers=0"
            );
            model_params.n_gpu_layers = 0;
        }

        let model = backend
            .load_model(path, &model_params)
            .map_err(|source| InferenceError::ModelLoadFailure {
                path: path.to_path_buf(),
                source,
            })?;

        debug!(
            n_ctx = context_params.n_ctx,
            n_threads = context_params.n_threads,
            n_threads_batch = context_params.n_threads_batch,
            "creating inference context"
        );
        let context = backend
            .create_context(&model, &context_params)
            .map_err(|source| InferenceError::ContextInitFailure {
                n_ctx: context_params.n_ctx,
                source,
            })?;
        let n_ctx = backend.context_size(&context);

        info!(
            backend = backend.name(),
            path = %path.display(),
            n_ctx,
            n_gpu_layers = model_params.n_gpu_layers,
            "model loaded"
        );

        Ok(ModelContext {
            context: Mutex::new(context),
            model,
            n_ctx,
            lease,
        })
    }

    pub fn backend(&self) -> &B {
        self.lease.backend()
    }

    /// Context window size in tokens.
    pub fn context_window_size(&self) -> usize {
        self.n_ctx
    }

    pub fn tokenize(&self, text: &str, add_bos: bool) -> Result<Vec<TokenId>> {
        Ok(self.backend().tokenize(&self.model, text, add_bos)?)
    }

    pub fn piece_bytes(&self, token: TokenId) -> Vec<u8> {
        self.backend().token_to_piece(&self.model, token)
    }

    pub fn is_end_of_generation(&self, token: TokenId) -> bool {
        self.backend().is_end_of_generation(&self.model, token)
    }

    /// Take exclusive access to the context, waiting for any running
    /// generation to release it.
    pub fn lock(&self) -> ContextGuard<'_, B> {
        ContextGuard {
            owner: self,
            context: self.context.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Take exclusive access to the context if it is free.
    pub fn try_lock(&self) -> Option<ContextGuard<'_, B>> {
        let context = match self.context.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        };
        Some(ContextGuard {
            owner: self,
            context,
        })
    }
}

impl<B: ModelBackend> Drop for ModelContext<B> {
    fn drop(&mut self) {
        info!(backend = self.backend().name(), "releasing model context");
    }
}

/// Exclusive access to a `ModelContext`'s inference context.
pub struct ContextGuard<'a, B: ModelBackend> {
    owner: &'a ModelContext<B>,
    context: MutexGuard<'a, B::Context>,
}

impl<'a, B: ModelBackend> ContextGuard<'a, B> {
    /// Run one decode step over `batch`.
    pub fn decode_step(&mut self, batch: &BatchBuffer) -> ds_backend::Result<()> {
        self.owner.backend().decode(&mut self.context, batch)
    }

    /// Logits from the last decode step for batch slot `index`.
    pub fn logits(&self, index: usize) -> Option<&[f32]> {
        self.owner.backend().logits(&self.context, index)
    }

    pub fn clear_kv_cache(&mut self) {
        self.owner.backend().clear_kv_cache(&mut self.context);
    }

    pub fn model_context(&self) -> &'a ModelContext<B> {
        self.owner
    }
}
