//! Inference provider implementations.

pub mod http;
pub mod prompt;

pub use http::HttpCompletionProvider;
