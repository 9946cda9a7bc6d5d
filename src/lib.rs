//! Framereel - Video frame extraction library
//!
//! Hexagonal Architecture:
//! - domain/: Pure business logic (jobs, state machines, av sampling)
//! - ports/: Trait definitions (storage, fetcher, sampler)
//! - adapters/: Concrete implementations (HTTP, local filesystem)
//! - application/: Generic services (pipeline, uploader, lifecycle)
//! - config: Environment configuration

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

// Re-exports for convenience
pub use adapters::{FsStorage, HttpFetcher, LocatorFetcher};
pub use application::{PipelineController, PipelineSettings};
pub use config::AppConfig;
pub use domain::av::MediaSampler;
pub use domain::jobs::{JobFailure, JobOutcome, JobRequest};
