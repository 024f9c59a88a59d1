//! Operation surface for semvault.
//!
//! [`Api`] wires the indexer, query service, and analytics behind
//! named operations with typed parameters, plus a JSON [`Api::dispatch`]
//! entry point for the request/response transport. Path arguments are
//! validated against their source root before any filesystem access.

pub mod ops;
pub mod paths;

pub use ops::Api;
