//! `ds-backend` - Model backend contract for decode-stream.
//!
//! This crate provides:
//! - The `ModelBackend` trait: load, tokenize, decode, and piece lookup
//! - `BatchBuffer`, the fixed-capacity token batch submitted per decode step
//! - `BackendRuntime`, a reference-counted init/shutdown pairing
//! - Backend parameter structs (`ModelParams`, `ContextParams`)
//! - A scripted `MockBackend` behind the `mock` feature (also built for this
//!   crate's own unit tests)

pub mod backend;
pub mod batch;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod params;
pub mod runtime;

pub use backend::{ModelBackend, TokenId};
pub use batch::{BatchBuffer, BatchSlot, SeqId, DEFAULT_BATCH_CAPACITY};
pub use error::{BackendError, Result};
pub use params::{resolve_thread_count, ContextParams, ModelParams};
pub use runtime::{BackendRuntime, RuntimeLease};
