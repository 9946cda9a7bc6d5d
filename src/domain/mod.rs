//! Domain layer - Pure business logic.

// Frame sampling (requires ffmpeg-next)
pub mod av;

pub mod error;
pub mod jobs;
pub mod state;
