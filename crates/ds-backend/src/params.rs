use std::thread;

/// Upper bound on decode threads regardless of core count.
const MAX_THREADS: usize = 8;

/// Cores left free for the rest of the process.
const RESERVED_CORES: usize = 2;

/// Parameters applied when loading a model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParams {
    /// Number of layers to offload to the accelerator. Forced to 0 when the
    /// backend reports no offload capability.
    pub n_gpu_layers: u32,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self { n_gpu_layers: 99 }
    }
}

/// Parameters applied when creating an inference context.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextParams {
    /// Context window (KV cache size) in tokens.
    pub n_ctx: u32,
    /// Threads used for single-token decode steps.
    pub n_threads: u32,
    /// Threads used for prompt processing.
    pub n_threads_batch: u32,
}

impl ContextParams {
    /// Context parameters for `n_ctx` tokens with the resolved thread count
    /// applied to both thread pools.
    pub fn with_n_ctx(n_ctx: u32) -> Self {
        Self {
            n_ctx,
            ..Self::default()
        }
    }
}

impl Default for ContextParams {
    fn default() -> Self {
        let available = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let threads = resolve_thread_count(available);
        Self {
            n_ctx: 2048,
            n_threads: threads,
            n_threads_batch: threads,
        }
    }
}

/// Thread count for `available` cores: `clamp(available - 2, 1, 8)`.
pub fn resolve_thread_count(available: usize) -> u32 {
    available.saturating_sub(RESERVED_CORES).clamp(1, MAX_THREADS) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_thread_count() {
        assert_eq!(resolve_thread_count(0), 1);
        assert_eq!(resolve_thread_count(1), 1);
        assert_eq!(resolve_thread_count(3), 1);
        assert_eq!(resolve_thread_count(4), 2);
        assert_eq!(resolve_thread_count(10), 8);
        assert_eq!(resolve_thread_count(64), 8);
    }

    #[test]
    fn test_context_defaults() {
        let params = ContextParams::default();
        assert_eq!(params.n_ctx, 2048);
        assert_eq!(params.n_threads, params.n_threads_batch);
        assert!((1..=8).contains(&params.n_threads));
    }

    #[test]
    fn test_with_n_ctx() {
        let params = ContextParams::with_n_ctx(512);
        assert_eq!(params.n_ctx, 512);
        assert_eq!(params.n_threads, ContextParams::default().n_threads);
    }
}
