//! Frame sampling: the shared sample plan and both extraction strategies.

pub mod decode_pipe;
pub mod encode;
pub mod plan;
pub mod probe;
pub mod sampler;
pub mod seek;


pub use decode_pipe::{DecodePipeSampler, FfmpegCli};
pub use plan::SamplePlan;
pub use sampler::MediaSampler;
pub use seek::SeekSampler;
