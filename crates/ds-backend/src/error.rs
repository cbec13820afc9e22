use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("backend initialization failed: {0}")]
    Init(String),
    #[error("failed to load model from {path:?}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },
    #[error("failed to create context with n_ctx={n_ctx}: {reason}")]
    ContextInit { n_ctx: u32, reason: String },
    #[error("tokenization failed: {0}")]
    Tokenize(String),
    #[error("decode returned status {status}")]
    Decode { status: i32 },
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, BackendError>;
