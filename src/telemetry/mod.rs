pub mod buffer;
pub mod payload;
pub mod rate;

pub use buffer::SampleBuffer;
pub use payload::decode_payload;
pub use rate::SamplingRateEstimator;
