pub mod greedy;
pub mod params;
pub mod sampler;
pub mod softmax;
pub mod temperature;

pub use greedy::{DistSampler, GreedySampler};
pub use params::SamplerParams;
pub use sampler::{Sampler, SamplerChain, TokenLogit};
pub use softmax::SoftmaxSampler;
pub use temperature::TemperatureSampler;
