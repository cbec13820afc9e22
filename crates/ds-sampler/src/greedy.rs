use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::sampler::{Sampler, TokenLogit};
use crate::softmax;

/// Greedy sampler: selects the single token with the highest logit.
pub struct GreedySampler;

impl Sampler for GreedySampler {
    fn name(&self) -> &str {
        "greedy"
    }

    fn apply(&mut self, candidates: &mut Vec<TokenLogit>) {
        keep_best(candidates);
    }
}

fn keep_best(candidates: &mut Vec<TokenLogit>) {
    if candidates.is_empty() {
        return;
    }
    let best = candidates
        .iter()
        .enumerate()
        .filter(|(_, t)| !t.logit.is_nan())
        .max_by(|(_, a), (_, b)| a.logit.total_cmp(&b.logit))
        .map(|(i, _)| i)
        .unwrap_or(0);
    candidates.swap(0, best);
    candidates.truncate(1);
}

/// Distribution sampler: draws a token from the normalized probabilities
/// using a seeded random stream.
///
/// The stream advances with every draw, so one generation sees a different
/// draw at each step while remaining reproducible from the seed.
pub struct DistSampler {
    seed: u64,
    rng: StdRng,
}

impl DistSampler {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Sampler for DistSampler {
    fn name(&self) -> &str {
        "dist"
    }

    fn apply(&mut self, candidates: &mut Vec<TokenLogit>) {
        if candidates.is_empty() {
            return;
        }

        // Normalize here if no softmax stage ran before us.
        let total: f32 = candidates.iter().map(|t| t.p).sum();
        if !total.is_finite() || total <= 0.0 {
            softmax::normalize(candidates);
        }

        let dist = match WeightedIndex::new(candidates.iter().map(|t| t.p)) {
            Ok(d) => d,
            Err(_) => {
                keep_best(candidates);
                return;
            }
        };

        let selected = dist.sample(&mut self.rng);
        candidates.swap(0, selected);
        candidates.truncate(1);
    }

    fn reset(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(logits: &[f32]) -> Vec<TokenLogit> {
        logits
            .iter()
            .enumerate()
            .map(|(i, &logit)| TokenLogit {
                token_id: i as u32,
                logit,
                p: 0.0,
            })
            .collect()
    }

    #[test]
    fn test_greedy_picks_max() {
        let mut c = candidates(&[0.5, 2.0, -1.0]);
        GreedySampler.apply(&mut c);
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].token_id, 1);
    }

    #[test]
    fn test_greedy_ignores_nan() {
        let mut c = candidates(&[f32::NAN, 0.1, 0.3]);
        GreedySampler.apply(&mut c);
        assert_eq!(c[0].token_id, 2);
    }

    #[test]
    fn test_greedy_empty() {
        let mut c = Vec::new();
        GreedySampler.apply(&mut c);
        assert!(c.is_empty());
    }

    #[test]
    fn test_dist_normalizes_itself() {
        let mut c = candidates(&[0.0, 50.0, 0.0]);
        DistSampler::new(7).apply(&mut c);
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].token_id, 1);
    }

    #[test]
    fn test_dist_covers_uniform_support() {
        let mut sampler = DistSampler::new(1234);
        let mut seen = [false; 4];
        for _ in 0..200 {
            let mut c = candidates(&[0.0; 4]);
            sampler.apply(&mut c);
            seen[c[0].token_id as usize] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_dist_seed_reproducible() {
        let draw = |seed| {
            let mut sampler = DistSampler::new(seed);
            (0..16)
                .map(|_| {
                    let mut c = candidates(&[0.3, 0.1, 0.2, 0.4]);
                    sampler.apply(&mut c);
                    c[0].token_id
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(draw(99), draw(99));
    }
}
