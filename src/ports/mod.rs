//! Ports - Trait definitions for the collaborators a job talks to.

pub mod fetcher;
pub mod sampler;
pub mod storage;
