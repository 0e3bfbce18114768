//! Bundled backends.
//!
//! - [`memory`] - In-memory store for demos and tests

pub mod memory;

pub use memory::MemoryBackend;
