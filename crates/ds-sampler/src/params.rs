/// Parameters of the default sampling pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerParams {
    /// Logits are multiplied by `1 / temperature`. Values `<= 0` select the
    /// greedy pipeline.
    pub temperature: f32,
    /// Seed of the weighted-pick random stream.
    pub seed: u64,
}

impl Default for SamplerParams {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            seed: 1234,
        }
    }
}
