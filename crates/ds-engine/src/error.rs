use std::path::PathBuf;

use ds_backend::BackendError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("failed to load model from {path:?}")]
    ModelLoadFailure {
        path: PathBuf,
        #[source]
        source: BackendError,
    },
    #[error("failed to initialize inference context (n_ctx={n_ctx})")]
    ContextInitFailure {
        n_ctx: u32,
        #[source]
        source: BackendError,
    },
    #[error("KV cache too small: {required} tokens required, context window is {available}")]
    KvCacheTooSmall { required: usize, available: usize },
    #[error("decode failed at position {pos}")]
    DecodingFailure {
        pos: usize,
        #[source]
        source: BackendError,
    },
    #[error("no logits for batch index {0}")]
    MissingLogits(usize),
    #[error("prompt produced no tokens")]
    EmptyPrompt,
    #[error("context is busy with another generation")]
    Busy,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type Result<T> = std::result::Result<T, InferenceError>;
