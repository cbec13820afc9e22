use crate::sampler::{Sampler, TokenLogit};

/// Smallest temperature honoured; anything lower is raised to this.
const MIN_TEMPERATURE: f32 = 1e-7;

/// Multiplies every logit by `1 / T`.
pub struct TemperatureSampler {
    inv_temperature: f32,
}

impl TemperatureSampler {
    pub fn new(temperature: f32) -> Self {
        Self {
            inv_temperature: temperature.max(MIN_TEMPERATURE).recip(),
        }
    }

    pub fn temperature(&self) -> f32 {
        self.inv_temperature.recip()
    }
}

impl Sampler for TemperatureSampler {
    fn name(&self) -> &str {
        "temperature"
    }

    fn apply(&mut self, candidates: &mut Vec<TokenLogit>) {
        let scale = self.inv_temperature;
        candidates.iter_mut().for_each(|t| t.logit *= scale);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

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
    fn test_scales_by_inverse_temperature() {
        let mut c = candidates(&[1.0, -2.0, 0.4]);
        TemperatureSampler::new(0.5).apply(&mut c);
        assert_relative_eq!(c[0].logit, 2.0);
        assert_relative_eq!(c[1].logit, -4.0);
        assert_relative_eq!(c[2].logit, 0.8);
    }

    #[test]
    fn test_unit_temperature_is_identity() {
        let mut c = candidates(&[3.0, 1.5]);
        TemperatureSampler::new(1.0).apply(&mut c);
        assert_relative_eq!(c[0].logit, 3.0);
        assert_relative_eq!(c[1].logit, 1.5);
    }

    #[test]
    fn test_non_positive_temperature_keeps_order() {
        let mut c = candidates(&[0.2, 0.1]);
        TemperatureSampler::new(0.0).apply(&mut c);
        assert!(c[0].logit > c[1].logit);
        assert!(c[0].logit.is_finite());
        assert_relative_eq!(TemperatureSampler::new(-3.0).temperature(), MIN_TEMPERATURE);
    }
}
