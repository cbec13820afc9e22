//! Scripted in-process backend for tests.
//!
//! The vocabulary is byte-level: ids `0..=255` are single bytes, followed by
//! the EOS and BOS markers and any multi-byte pieces registered through
//! [`MockConfig`]. `tokenize` maps every byte of the text to its byte token.
//!
//! Each decode that requests logits produces a distribution sharply peaked
//! on the next token of the script, so any temperature/softmax/dist chain
//! selects it. Once the script is exhausted the peak moves to EOS.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::backend::{ModelBackend, TokenId};
use crate::batch::BatchBuffer;
use crate::error::{BackendError, Result};
use crate::params::{ContextParams, ModelParams};

pub const MOCK_EOS: TokenId = 256;
pub const MOCK_BOS: TokenId = 257;
const FIRST_PIECE_ID: TokenId = 258;

/// Logit given to the scripted token; every other token gets 0.
pub const MOCK_PEAK_LOGIT: f32 = 100.0;

/// Lifecycle and decode calls observed by a [`MockBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum MockEvent {
    Init,
    Shutdown,
    LoadModel { path: PathBuf, n_gpu_layers: u32 },
    CreateContext { n_ctx: u32, n_threads: u32, n_threads_batch: u32 },
    ClearKvCache,
    Decode { n_tokens: usize, first_pos: usize },
    FreeContext,
    FreeModel,
}

/// Behaviour of a [`MockBackend`].
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Multi-byte pieces, assigned ids from `FIRST_PIECE_ID` upward.
    pub pieces: Vec<Vec<u8>>,
    /// Tokens produced by successive logits-requesting decodes.
    pub script: Vec<TokenId>,
    /// Largest context the backend agrees to allocate.
    pub max_n_ctx: u32,
    pub gpu_offload: bool,
    /// Whether `tokenize` honours `add_bos`.
    pub emit_bos: bool,
    pub fail_init: bool,
    pub fail_load: bool,
    pub fail_context: bool,
    /// Zero-based decode call numbers that report failure.
    pub fail_decode_at: Vec<usize>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            pieces: Vec::new(),
            script: Vec::new(),
            max_n_ctx: 4096,
            gpu_offload: true,
            emit_bos: true,
            fail_init: false,
            fail_load: false,
            fail_context: false,
            fail_decode_at: Vec::new(),
        }
    }
}

impl MockConfig {
    /// Register a piece and return its token id.
    pub fn add_piece(&mut self, bytes: &[u8]) -> TokenId {
        self.pieces.push(bytes.to_vec());
        FIRST_PIECE_ID + (self.pieces.len() - 1) as TokenId
    }

    /// Append one scripted token per piece.
    pub fn script_pieces(mut self, pieces: &[&[u8]]) -> Self {
        for piece in pieces {
            let id = self.add_piece(piece);
            self.script.push(id);
        }
        self
    }

    /// Append the end-of-generation marker to the script.
    pub fn script_eos(mut self) -> Self {
        self.script.push(MOCK_EOS);
        self
    }

    fn vocab_size(&self) -> usize {
        FIRST_PIECE_ID as usize + self.pieces.len()
    }
}

type EventLog = Arc<Mutex<Vec<MockEvent>>>;

fn record(events: &EventLog, event: MockEvent) {
    events
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(event);
}

pub struct MockBackend {
    config: MockConfig,
    events: EventLog,
    decode_calls: Arc<AtomicUsize>,
}

impl MockBackend {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            events: Arc::new(Mutex::new(Vec::new())),
            decode_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Snapshot of every recorded event, oldest first.
    pub fn events(&self) -> Vec<MockEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Total decode calls, failed ones included.
    pub fn decode_calls(&self) -> usize {
        self.decode_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new(MockConfig::default())
    }
}

pub struct MockModel {
    pieces: Vec<Vec<u8>>,
    events: EventLog,
}

impl Drop for MockModel {
    fn drop(&mut self) {
        record(&self.events, MockEvent::FreeModel);
    }
}

pub struct MockContext {
    n_ctx: usize,
    vocab_size: usize,
    script: Vec<TokenId>,
    step: usize,
    n_past: usize,
    logits: Vec<f32>,
    logits_index: Option<usize>,
    events: EventLog,
}

impl MockContext {
    fn next_scripted(&mut self) -> TokenId {
        let token = self.script.get(self.step).copied().unwrap_or(MOCK_EOS);
        self.step += 1;
        token
    }
}

impl Drop for MockContext {
    fn drop(&mut self) {
        record(&self.events, MockEvent::FreeContext);
    }
}

impl ModelBackend for MockBackend {
    type Model = MockModel;
    type Context = MockContext;

    fn name(&self) -> &str {
        "mock"
    }

    fn init(&self) -> Result<()> {
        if self.config.fail_init {
            return Err(BackendError::Init("scripted init failure".to_string()));
        }
        record(&self.events, MockEvent::Init);
        Ok(())
    }

    fn shutdown(&self) {
        record(&self.events, MockEvent::Shutdown);
    }

    fn supports_gpu_offload(&self) -> bool {
        self.config.gpu_offload
    }

    fn load_model(&self, path: &Path, params: &ModelParams) -> Result<MockModel> {
        if self.config.fail_load || !path.is_file() {
            return Err(BackendError::ModelLoad {
                path: path.to_path_buf(),
                reason: "not a loadable model file".to_string(),
            });
        }
        record(
            &self.events,
            MockEvent::LoadModel {
                path: path.to_path_buf(),
                n_gpu_layers: params.n_gpu_layers,
            },
        );
        Ok(MockModel {
            pieces: self.config.pieces.clone(),
            events: Arc::clone(&self.events),
        })
    }

    fn create_context(&self, _model: &MockModel, params: &ContextParams) -> Result<MockContext> {
        if self.config.fail_context || params.n_ctx == 0 || params.n_ctx > self.config.max_n_ctx {
            return Err(BackendError::ContextInit {
                n_ctx: params.n_ctx,
                reason: format!("mock supports 1..={} tokens", self.config.max_n_ctx),
            });
        }
        record(
            &self.events,
            MockEvent::CreateContext {
                n_ctx: params.n_ctx,
                n_threads: params.n_threads,
                n_threads_batch: params.n_threads_batch,
            },
        );
        Ok(MockContext {
            n_ctx: params.n_ctx as usize,
            vocab_size: self.config.vocab_size(),
            script: self.config.script.clone(),
            step: 0,
            n_past: 0,
            logits: Vec::new(),
            logits_index: None,
            events: Arc::clone(&self.events),
        })
    }

    fn context_size(&self, context: &MockContext) -> usize {
        context.n_ctx
    }

    fn tokenize(&self, _model: &MockModel, text: &str, add_bos: bool) -> Result<Vec<TokenId>> {
        let mut tokens = Vec::with_capacity(text.len() + 1);
        if add_bos && self.config.emit_bos {
            tokens.push(MOCK_BOS);
        }
        tokens.extend(text.bytes().map(TokenId::from));
        Ok(tokens)
    }

    fn clear_kv_cache(&self, context: &mut MockContext) {
        context.n_past = 0;
        context.step = 0;
        context.logits_index = None;
        record(&self.events, MockEvent::ClearKvCache);
    }

    fn decode(&self, context: &mut MockContext, batch: &BatchBuffer) -> Result<()> {
        let call = self.decode_calls.fetch_add(1, Ordering::SeqCst);
        let first_pos = batch.slots().first().map_or(0, |slot| slot.pos);
        record(
            &self.events,
            MockEvent::Decode {
                n_tokens: batch.len(),
                first_pos,
            },
        );

        if self.config.fail_decode_at.contains(&call) {
            return Err(BackendError::Decode { status: 1 });
        }
        if batch.is_empty() {
            return Err(BackendError::Decode { status: -1 });
        }
        for (offset, slot) in batch.slots().iter().enumerate() {
            if slot.pos != context.n_past + offset {
                return Err(BackendError::Decode { status: -1 });
            }
            if slot.pos >= context.n_ctx {
                return Err(BackendError::Decode { status: 1 });
            }
        }
        context.n_past += batch.len();

        context.logits_index = batch.last_logits_index();
        if context.logits_index.is_some() {
            let next = context.next_scripted();
            context.logits.clear();
            context.logits.resize(context.vocab_size, 0.0);
            if let Some(logit) = context.logits.get_mut(next as usize) {
                *logit = MOCK_PEAK_LOGIT;
            }
        }
        Ok(())
    }

    fn logits<'c>(&self, context: &'c MockContext, index: usize) -> Option<&'c [f32]> {
        match context.logits_index {
            Some(i) if i == index => Some(&context.logits),
            _ => None,
        }
    }

    fn token_to_piece(&self, model: &MockModel, token: TokenId) -> Vec<u8> {
        match token {
            0..=255 => vec![token as u8],
            MOCK_EOS | MOCK_BOS => Vec::new(),
            _ => model
                .pieces
                .get((token - FIRST_PIECE_ID) as usize)
                .cloned()
                .unwrap_or_default(),
        }
    }

    fn is_end_of_generation(&self, _model: &MockModel, token: TokenId) -> bool {
        token == MOCK_EOS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_file() -> tempfile::NamedTempFile {
        tempfile::NamedTempFile::new().unwrap()
    }

    #[test]
    fn test_tokenize_bytes_with_bos() {
        let backend = MockBackend::default();
        let file = model_file();
        let model = backend.load_model(file.path(), &ModelParams::default()).unwrap();
        let tokens = backend.tokenize(&model, "Hi", true).unwrap();
        assert_eq!(tokens, vec![MOCK_BOS, b'H' as TokenId, b'i' as TokenId]);
        assert_eq!(backend.token_to_piece(&model, b'H' as TokenId), b"H".to_vec());
    }

    #[test]
    fn test_scripted_logits_peak() {
        let config = MockConfig::default().script_pieces(&[b"ab"]);
        let backend = MockBackend::new(config);
        let file = model_file();
        let model = backend.load_model(file.path(), &ModelParams::default()).unwrap();
        let mut ctx = backend
            .create_context(&model, &ContextParams::with_n_ctx(64))
            .unwrap();

        let mut batch = BatchBuffer::new(4);
        batch.append(MOCK_BOS, 0, &[0], false);
        batch.append(b'x' as TokenId, 1, &[0], true);
        backend.decode(&mut ctx, &batch).unwrap();

        assert!(backend.logits(&ctx, 0).is_none());
        let logits = backend.logits(&ctx, 1).unwrap();
        assert_eq!(logits[FIRST_PIECE_ID as usize], MOCK_PEAK_LOGIT);
        assert_eq!(backend.token_to_piece(&model, FIRST_PIECE_ID), b"ab".to_vec());
        assert_eq!(backend.decode_calls(), 1);
    }

    #[test]
    fn test_rejects_non_contiguous_positions() {
        let backend = MockBackend::default();
        let file = model_file();
        let model = backend.load_model(file.path(), &ModelParams::default()).unwrap();
        let mut ctx = backend
            .create_context(&model, &ContextParams::with_n_ctx(64))
            .unwrap();

        let mut batch = BatchBuffer::new(2);
        batch.append(1, 5, &[0], true);
        let err = backend.decode(&mut ctx, &batch).unwrap_err();
        assert!(matches!(err, BackendError::Decode { status: -1 }));
    }

    #[test]
    fn test_missing_model_file() {
        let backend = MockBackend::default();
        let result = backend.load_model(Path::new("/nonexistent/model.gguf"), &ModelParams::default());
        assert!(matches!(result, Err(BackendError::ModelLoad { .. })));
    }

    #[test]
    fn test_handles_record_free_on_drop() {
        let backend = MockBackend::default();
        let file = model_file();
        let model = backend.load_model(file.path(), &ModelParams::default()).unwrap();
        let ctx = backend
            .create_context(&model, &ContextParams::with_n_ctx(16))
            .unwrap();
        drop(ctx);
        drop(model);

        let events = backend.events();
        assert_eq!(events[events.len() - 2], MockEvent::FreeContext);
        assert_eq!(events[events.len() - 1], MockEvent::FreeModel);
    }
}
