//! Catalog file access implementations.

pub mod fs;

pub use fs::FsFileRepository;
