//! Adapters - Concrete implementations of ports.

pub mod http;
pub mod local;
pub mod source;

pub use http::HttpFetcher;
pub use local::{FileFetcher, FsStorage};
pub use source::LocatorFetcher;
