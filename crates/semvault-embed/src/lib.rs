//! Upstream model clients for semvault.
//!
//! - [`HttpEmbedder`]: batched embedding generation over an
//!   OpenAI-compatible API, with retry/backoff and credential rotation
//! - [`HttpReranker`]: cross-encoder scoring over a rerank endpoint
//! - [`NoopEmbedder`]: zero-vector double for tests and development
//! - [`credentials`]: the credential-provider seam; rotation policy
//!   lives behind it

pub mod credentials;
pub mod http;
pub mod noop;
pub mod rerank;

pub use credentials::{CredentialProvider, KeyRing, StaticKey};
pub use http::HttpEmbedder;
pub use noop::NoopEmbedder;
pub use rerank::HttpReranker;
