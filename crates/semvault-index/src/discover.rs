//! Source registration and file discovery.
//!
//! Each configured [`Source`] gets compiled include/exclude glob sets.
//! Hidden path components (`.obsidian`, `.git`, ...) are always
//! skipped. Event paths are resolved back to `(source, relative)`
//! before any indexing decision is made; files outside every source
//! root are rejected.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use semvault_core::{normalize_rel_path, Error, Result, Source};
use tracing::warn;
use walkdir::WalkDir;

struct SourceEntry {
    source: Source,
    include: GlobSet,
    exclude: GlobSet,
}

/// The immutable set of sources for one service run.
pub struct SourceRegistry {
    entries: Vec<SourceEntry>,
}

impl SourceRegistry {
    pub fn new(sources: Vec<Source>) -> Result<Self> {
        let mut entries = Vec::with_capacity(sources.len());
        for source in sources {
            let include_globs = if source.include.is_empty() {
                source.kind.default_include()
            } else {
                source.include.clone()
            };
            let include = build_globset(&include_globs)
                .map_err(|e| Error::Config(format!("source {}: bad include glob: {e}", source.id)))?;
            let exclude = build_globset(&source.exclude)
                .map_err(|e| Error::Config(format!("source {}: bad exclude glob: {e}", source.id)))?;
            entries.push(SourceEntry {
                source,
                include,
                exclude,
            });
        }
        Ok(Self { entries })
    }

    pub fn sources(&self) -> impl Iterator<Item = &Source> {
        self.entries.iter().map(|e| &e.source)
    }

    pub fn get(&self, source_id: &str) -> Option<&Source> {
        self.entries
            .iter()
            .map(|e| &e.source)
            .find(|s| s.id == source_id)
    }

    /// Map an absolute path back to `(source, relative_path)`.
    ///
    /// When roots nest, the longest matching root wins.
    pub fn resolve(&self, abs_path: &Path) -> Option<(&Source, String)> {
        self.entries
            .iter()
            .filter_map(|e| {
                abs_path
                    .strip_prefix(&e.source.root_path)
                    .ok()
                    .map(|rel| (&e.source, rel))
            })
            .max_by_key(|(source, _)| source.root_path.as_os_str().len())
            .map(|(source, rel)| (source, normalize_rel_path(rel)))
    }

    /// Whether a source-relative path is indexable under the source's
    /// include/exclude rules.
    pub fn is_eligible(&self, source_id: &str, rel_path: &str) -> bool {
        let Some(entry) = self.entries.iter().find(|e| e.source.id == source_id) else {
            return false;
        };
        if has_hidden_component(rel_path) {
            return false;
        }
        entry.include.is_match(rel_path) && !entry.exclude.is_match(rel_path)
    }

    /// Walk one source root, returning `(absolute, relative)` pairs for
    /// every eligible file, sorted for deterministic passes.
    pub fn discover(&self, source_id: &str) -> Result<Vec<(PathBuf, String)>> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.source.id == source_id)
            .ok_or_else(|| Error::NotFound(format!("source {source_id}")))?;

        let root = &entry.source.root_path;
        let mut files = Vec::new();

        for item in WalkDir::new(root) {
            let item = match item {
                Ok(i) => i,
                Err(e) => {
                    warn!(source = source_id, error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !item.file_type().is_file() {
                continue;
            }

            let rel = match item.path().strip_prefix(root) {
                Ok(r) => normalize_rel_path(r),
                Err(_) => continue,
            };

            if has_hidden_component(&rel) {
                continue;
            }
            if !entry.include.is_match(&rel) || entry.exclude.is_match(&rel) {
                continue;
            }

            files.push((item.path().to_path_buf(), rel));
        }

        files.sort_by(|a, b| a.1.cmp(&b.1));
        Ok(files)
    }
}

fn build_globset(patterns: &[String]) -> std::result::Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    builder.build()
}

fn has_hidden_component(rel_path: &str) -> bool {
    rel_path
        .split('/')
        .any(|part| part.starts_with('.') && part.len() > 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_discover_markdown_only() {
        let temp = tempdir().unwrap();
        write(temp.path(), "a.md", "# a");
        write(temp.path(), "sub/b.md", "# b");
        write(temp.path(), "sub/ignore.txt", "text");
        write(temp.path(), ".obsidian/config.md", "hidden");

        let registry =
            SourceRegistry::new(vec![Source::markdown("vault", temp.path())]).unwrap();
        let files = registry.discover("vault").unwrap();
        let rels: Vec<&str> = files.iter().map(|(_, r)| r.as_str()).collect();

        assert_eq!(rels, vec!["a.md", "sub/b.md"]);
    }

    #[test]
    fn test_discover_respects_excludes() {
        let temp = tempdir().unwrap();
        write(temp.path(), "keep.md", "x");
        write(temp.path(), "drafts/skip.md", "x");

        let mut source = Source::markdown("vault", temp.path());
        source.exclude = vec!["drafts/**".to_string()];
        let registry = SourceRegistry::new(vec![source]).unwrap();

        let files = registry.discover("vault").unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].1, "keep.md");
    }

    #[test]
    fn test_resolve_maps_to_source() {
        let temp = tempdir().unwrap();
        let registry =
            SourceRegistry::new(vec![Source::markdown("vault", temp.path())]).unwrap();

        let (source, rel) = registry.resolve(&temp.path().join("notes/a.md")).unwrap();
        assert_eq!(source.id, "vault");
        assert_eq!(rel, "notes/a.md");

        assert!(registry.resolve(Path::new("/elsewhere/a.md")).is_none());
    }

    #[test]
    fn test_resolve_prefers_longest_root() {
        let temp = tempdir().unwrap();
        let inner = temp.path().join("project");
        std::fs::create_dir_all(&inner).unwrap();

        let registry = SourceRegistry::new(vec![
            Source::markdown("vault", temp.path()),
            Source::markdown("project", &inner),
        ])
        .unwrap();

        let (source, rel) = registry.resolve(&inner.join("readme.md")).unwrap();
        assert_eq!(source.id, "project");
        assert_eq!(rel, "readme.md");
    }

    #[test]
    fn test_is_eligible() {
        let temp = tempdir().unwrap();
        let registry =
            SourceRegistry::new(vec![Source::markdown("vault", temp.path())]).unwrap();

        assert!(registry.is_eligible("vault", "notes/a.md"));
        assert!(!registry.is_eligible("vault", "notes/a.txt"));
        assert!(!registry.is_eligible("vault", ".trash/a.md"));
        assert!(!registry.is_eligible("unknown", "a.md"));
    }

    #[test]
    fn test_bad_glob_is_config_error() {
        let mut source = Source::markdown("vault", "/tmp");
        source.include = vec!["[".to_string()];
        assert!(matches!(
            SourceRegistry::new(vec![source]),
            Err(Error::Config(_))
        ));
    }
}
