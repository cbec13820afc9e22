use crate::sampler::{Sampler, TokenLogit};

/// Normalizes logits into probabilities, written to `TokenLogit::p`.
///
/// NaN logits get zero probability. If no logit is usable the distribution
/// is uniform, so a downstream selector always has something to pick.
pub struct SoftmaxSampler;

impl Sampler for SoftmaxSampler {
    fn name(&self) -> &str {
        "softmax"
    }

    fn apply(&mut self, candidates: &mut Vec<TokenLogit>) {
        normalize(candidates);
    }
}

pub(crate) fn normalize(candidates: &mut [TokenLogit]) {
    if candidates.is_empty() {
        return;
    }

    let clean = |logit: f32| {
        if logit.is_nan() {
            f32::NEG_INFINITY
        } else {
            logit.min(f32::MAX)
        }
    };

    let max_logit = candidates
        .iter()
        .map(|t| clean(t.logit))
        .fold(f32::NEG_INFINITY, f32::max);

    if max_logit == f32::NEG_INFINITY {
        let uniform = 1.0 / candidates.len() as f32;
        for token in candidates.iter_mut() {
            token.p = uniform;
        }
        return;
    }

    let mut sum = 0.0f32;
    for token in candidates.iter_mut() {
        token.p = (clean(token.logit) - max_logit).exp();
        sum += token.p;
    }
    for token in candidates.iter_mut() {
        token.p /= sum;
    }
}
