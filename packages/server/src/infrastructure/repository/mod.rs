//! Repository implementations.

pub mod inmemory;
pub mod json_config;

pub use inmemory::InMemoryChatRepository;
pub use json_config::JsonConfigRepository;
