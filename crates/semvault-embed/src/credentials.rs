//! Credential handling for upstream clients.
//!
//! The embed client only sees this interface; the rotation policy
//! behind it (ring order, audit logging) stays outside the core.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Supplies API credentials to an upstream client.
pub trait CredentialProvider: Send + Sync {
    /// The credential to use for the next request, if any remain.
    fn current(&self) -> Option<String>;

    /// Advance past a credential that hit its quota. Returns the
    /// replacement, or `None` when the ring is exhausted.
    fn rotate(&self) -> Option<String>;
}

/// A single fixed key. Rotation always fails.
pub struct StaticKey {
    key: String,
}

impl StaticKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl CredentialProvider for StaticKey {
    fn current(&self) -> Option<String> {
        Some(self.key.clone())
    }

    fn rotate(&self) -> Option<String> {
        None
    }
}

/// An ordered ring of keys, advanced atomically on quota signals.
/// Does not wrap: once every key has been burned the ring is empty.
pub struct KeyRing {
    keys: Vec<String>,
    index: AtomicUsize,
}

impl KeyRing {
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            keys,
            index: AtomicUsize::new(0),
        }
    }
}

impl CredentialProvider for KeyRing {
    fn current(&self) -> Option<String> {
        self.keys.get(self.index.load(Ordering::SeqCst)).cloned()
    }

    fn rotate(&self) -> Option<String> {
        let next = self.index.fetch_add(1, Ordering::SeqCst) + 1;
        self.keys.get(next).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_key() {
        let provider = StaticKey::new("sk-test");
        assert_eq!(provider.current().as_deref(), Some("sk-test"));
        assert!(provider.rotate().is_none());
    }

    #[test]
    fn test_key_ring_rotation() {
        let ring = KeyRing::new(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(ring.current().as_deref(), Some("a"));
        assert_eq!(ring.rotate().as_deref(), Some("b"));
        assert_eq!(ring.current().as_deref(), Some("b"));
        assert_eq!(ring.rotate().as_deref(), Some("c"));
        assert!(ring.rotate().is_none());
        assert!(ring.current().is_none());
    }

    #[test]
    fn test_key_ring_empty() {
        let ring = KeyRing::new(vec![]);
        assert!(ring.current().is_none());
        assert!(ring.rotate().is_none());
    }
}
