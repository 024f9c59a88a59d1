//! Path validation for note operations.
//!
//! Every path argument is relative to a source root. Anything that
//! would resolve outside the root (absolute paths, `..` components)
//! is refused at the boundary.

use std::path::{Component, Path, PathBuf};

use semvault_core::{normalize_rel_path, Error, Result, Source};

/// Join a user-supplied relative path onto a source root, refusing
/// escapes. Returns the absolute path and the normalized relative form.
pub fn safe_join(source: &Source, rel_path: &str) -> Result<(PathBuf, String)> {
    let candidate = Path::new(rel_path);

    if candidate.is_absolute() {
        return Err(Error::InvalidPath(format!(
            "absolute paths are not allowed: {rel_path}"
        )));
    }

    let mut clean = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::InvalidPath(format!(
                    "path escapes source root: {rel_path}"
                )));
            }
        }
    }

    if clean.as_os_str().is_empty() {
        return Err(Error::InvalidPath("empty path".to_string()));
    }

    let rel = normalize_rel_path(&clean);
    Ok((source.root_path.join(&clean), rel))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> Source {
        Source::markdown("vault", "/data/vault")
    }

    #[test]
    fn test_safe_join_plain() {
        let (abs, rel) = safe_join(&source(), "notes/a.md").unwrap();
        assert_eq!(abs, PathBuf::from("/data/vault/notes/a.md"));
        assert_eq!(rel, "notes/a.md");
    }

    #[test]
    fn test_safe_join_normalizes_curdir() {
        let (_, rel) = safe_join(&source(), "./notes/./a.md").unwrap();
        assert_eq!(rel, "notes/a.md");
    }

    #[test]
    fn test_safe_join_rejects_absolute() {
        assert!(matches!(
            safe_join(&source(), "/etc/passwd"),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn test_safe_join_rejects_traversal() {
        assert!(matches!(
            safe_join(&source(), "../outside.md"),
            Err(Error::InvalidPath(_))
        ));
        assert!(matches!(
            safe_join(&source(), "notes/../../outside.md"),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn test_safe_join_rejects_empty() {
        assert!(matches!(safe_join(&source(), ""), Err(Error::InvalidPath(_))));
        assert!(matches!(
            safe_join(&source(), "."),
            Err(Error::InvalidPath(_))
        ));
    }
}
