//! Application layer - Generic services that use ports.

pub mod lifecycle;
pub mod pipeline;
pub mod uploader;

pub use pipeline::{PipelineController, PipelineSettings};
