//! Indexing pipeline for semvault.
//!
//! - [`SourceRegistry`]: configured sources with compiled glob rules
//! - [`Indexer`]: incremental hash-checked pipeline and reconciliation
//! - [`VaultWatcher`]: debounced file-system observer

pub mod discover;
pub mod indexer;
pub mod watcher;

pub use discover::SourceRegistry;
pub use indexer::{Indexer, SingleOutcome, DEFAULT_CONCURRENCY};
pub use watcher::{VaultWatcher, WatcherConfig};
