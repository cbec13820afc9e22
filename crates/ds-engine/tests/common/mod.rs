use std::sync::Arc;

use ds_backend::mock::{MockBackend, MockConfig};
use ds_backend::{BackendRuntime, ModelBackend};
use ds_engine::{ModelContext, TokenStream};
use tempfile::NamedTempFile;

pub struct Fixture {
    pub runtime: Arc<BackendRuntime<MockBackend>>,
    pub ctx: ModelContext<MockBackend>,
    _model_file: NamedTempFile,
}

impl Fixture {
    pub fn new(config: MockConfig, n_ctx: u32) -> Self {
        init_tracing();
        let runtime = BackendRuntime::new(MockBackend::new(config));
        let model_file = NamedTempFile::new().unwrap();
        let ctx = ModelContext::load(&runtime, model_file.path(), n_ctx).unwrap();
        Fixture {
            runtime,
            ctx,
            _model_file: model_file,
        }
    }

    pub fn backend(&self) -> &MockBackend {
        self.runtime.backend()
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

/// Drain a stream, panicking on any error item.
pub fn collect<B: ModelBackend>(stream: &mut TokenStream<'_, B>) -> Vec<String> {
    stream.map(|chunk| chunk.unwrap()).collect()
}
