//! Vector repository backends for semvault, implementing
//! [`VectorRepository`](semvault_core::VectorRepository).
//!
//! ## Cargo Features
//!
//! - `lancedb` (default): persistent `LanceDB` backend
//! - Without `lancedb`: only [`MemoryStore`] (testing/development)
//!
//! The on-disk layout under [`LanceStore`]'s directory is opaque;
//! recreating it requires a full reindex.

#[cfg(feature = "lancedb")]
pub mod lancedb;

#[cfg(feature = "lancedb")]
pub use lancedb::LanceStore;

pub mod memory;
pub use memory::MemoryStore;
