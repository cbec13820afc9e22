//! `ds-engine` - Incremental decode and text streaming for decode-stream.
//!
//! This crate provides:
//! - `ModelContext`, the owner of a backend's model and context handles
//! - `Session` and `TokenStream`, a pull-driven sample/decode loop
//! - `Utf8Reassembler`, which turns byte pieces into valid text chunks
//! - `CancelHandle` for cooperative cancellation between steps

pub mod context;
pub mod error;
pub mod params;
pub mod session;
pub mod stream;
pub mod utf8;

pub use context::{ContextGuard, ModelContext, DEFAULT_CONTEXT_SIZE};
pub use error::{InferenceError, Result};
pub use params::{DecodeFailurePolicy, GenerateParams};
pub use session::Session;
pub use stream::{CancelHandle, GenerationStats, StreamState, TokenStream};
pub use utf8::Utf8Reassembler;
