use ds_sampler::SamplerParams;

/// What to do when an incremental decode step fails mid-generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeFailurePolicy {
    /// End the stream with `InferenceError::DecodingFailure`.
    #[default]
    Abort,
    /// Log the failure and keep sampling. The KV cache may no longer match
    /// the emitted tokens.
    Continue,
}

/// Parameters controlling one `infer` call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateParams {
    /// Maximum number of generated tokens.
    pub max_tokens: usize,
    /// Hard ceiling on sequence positions (prompt included).
    pub n_len: usize,
    pub sampler: SamplerParams,
    pub on_decode_failure: DecodeFailurePolicy,
}

impl GenerateParams {
    pub fn with_max_tokens(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            ..Self::default()
        }
    }
}

impl Default for GenerateParams {
    fn default() -> Self {
        Self {
            max_tokens: 128,
            n_len: 1024,
            sampler: SamplerParams::default(),
            on_decode_failure: DecodeFailurePolicy::Abort,
        }
    }
}
