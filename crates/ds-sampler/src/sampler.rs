use crate::greedy::{DistSampler, GreedySampler};
use crate::params::SamplerParams;
use crate::softmax::SoftmaxSampler;
use crate::temperature::TemperatureSampler;

/// A token ID paired with its logit and normalized probability.
///
/// `p` is zero until a normalization stage has run.
#[derive(Debug, Clone)]
pub struct TokenLogit {
    pub token_id: u32,
    pub logit: f32,
    pub p: f32,
}

/// A stage of the sampling pipeline.
pub trait Sampler: Send {
    /// Returns the name of this sampler.
    fn name(&self) -> &str;

    /// Modify candidates in-place (scaling, normalizing, selecting).
    fn apply(&mut self, candidates: &mut Vec<TokenLogit>);

    /// Reset any internal state. Default implementation does nothing.
    fn reset(&mut self) {}
}

/// Composes samplers into a pipeline.
/// The last sampler in the chain should be a selector (greedy or dist).
pub struct SamplerChain {
    samplers: Vec<Box<dyn Sampler>>,
}

impl SamplerChain {
    pub fn new() -> Self {
        Self {
            samplers: Vec::new(),
        }
    }

    /// Build the default pipeline: temperature, softmax, seeded weighted pick.
    /// A non-positive temperature yields softmax followed by argmax.
    pub fn from_params(params: &SamplerParams) -> Self {
        if params.temperature <= 0.0 {
            return Self::new()
                .with(Box::new(SoftmaxSampler))
                .with(Box::new(GreedySampler));
        }
        Self::new()
            .with(Box::new(TemperatureSampler::new(params.temperature)))
            .with(Box::new(SoftmaxSampler))
            .with(Box::new(DistSampler::new(params.seed)))
    }

    /// Add a sampler to the end of the chain. Returns self for builder-style usage.
    pub fn with(mut self, sampler: Box<dyn Sampler>) -> Self {
        self.samplers.push(sampler);
        self
    }

    /// Stage names in pipeline order.
    pub fn names(&self) -> Vec<&str> {
        self.samplers.iter().map(|s| s.name()).collect()
    }

    /// Run all samplers in order on raw logits and return the selected token ID.
    ///
    /// Token ids are logit indices. Empty logits select token 0.
    pub fn sample(&mut self, logits: &[f32]) -> u32 {
        let mut candidates: Vec<TokenLogit> = logits
            .iter()
            .enumerate()
            .map(|(i, &logit)| TokenLogit {
                token_id: i as u32,
                logit,
                p: 0.0,
            })
            .collect();

        for sampler in &mut self.samplers {
            sampler.apply(&mut candidates);
        }

        candidates.first().map(|t| t.token_id).unwrap_or(0)
    }

    /// Reset every stage (reseeds random stages).
    pub fn reset(&mut self) {
        for sampler in &mut self.samplers {
            sampler.reset();
        }
    }
}

impl Default for SamplerChain {
    fn default() -> Self {
        Self::from_params(&SamplerParams::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pipeline_order() {
        let chain = SamplerChain::default();
        assert_eq!(chain.names(), vec!["temperature", "softmax", "dist"]);
    }

    #[test]
    fn test_greedy_pipeline_for_zero_temperature() {
        let params = SamplerParams {
            temperature: 0.0,
            seed: 1,
        };
        let mut chain = SamplerChain::from_params(&params);
        assert_eq!(chain.names(), vec!["softmax", "greedy"]);
        assert_eq!(chain.sample(&[0.1, 3.0, -2.0, 2.9]), 1);
    }

    #[test]
    fn test_peaked_logits_pick_peak() {
        let mut chain = SamplerChain::default();
        let mut logits = vec![0.0f32; 300];
        logits[42] = 100.0;
        for _ in 0..10 {
            assert_eq!(chain.sample(&logits), 42);
        }
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let logits = vec![1.0, 1.2, 0.8, 1.1, 0.9];
        let mut a = SamplerChain::default();
        let mut b = SamplerChain::default();
        let seq_a: Vec<u32> = (0..20).map(|_| a.sample(&logits)).collect();
        let seq_b: Vec<u32> = (0..20).map(|_| b.sample(&logits)).collect();
        assert_eq!(seq_a, seq_b);
    }

    #[test]
    fn test_reset_replays_stream() {
        let logits = vec![1.0, 1.0, 1.0, 1.0];
        let mut chain = SamplerChain::default();
        let first: Vec<u32> = (0..8).map(|_| chain.sample(&logits)).collect();
        chain.reset();
        let second: Vec<u32> = (0..8).map(|_| chain.sample(&logits)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_degenerate_logits_stay_in_vocab() {
        let mut chain = SamplerChain::default();
        for logits in [vec![0.0; 16], vec![5.0; 16], vec![f32::NAN; 16]] {
            let token = chain.sample(&logits);
            assert!((token as usize) < logits.len());
        }
        assert_eq!(chain.sample(&[]), 0);
    }
}
