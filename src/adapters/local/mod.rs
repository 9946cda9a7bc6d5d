//! Local adapters: directory-backed storage and filesystem sources.

pub mod fs;
pub mod source;

pub use fs::FsStorage;
pub use source::FileFetcher;
