//! Markdown chunking and metadata extraction for semvault.
//!
//! - [`MarkdownChunker`]: header-structure-aware splitter with token
//!   size constraints and atomic code/table regions
//! - [`metadata`]: frontmatter tags, inline `#tag`s, `[[wiki-links]]`
//! - [`TokenCounter`] / [`HeuristicTokenizer`]: injected token estimation
//!
//! Both the chunker and the extractors are synchronous pure functions
//! of their input.

pub mod markdown;
pub mod metadata;
pub mod tokens;

pub use markdown::MarkdownChunker;
pub use metadata::{
    extract_all_tags, extract_frontmatter_tags, extract_inline_tags, extract_wikilinks,
    remove_frontmatter,
};
pub use tokens::{HeuristicTokenizer, TokenCounter};
