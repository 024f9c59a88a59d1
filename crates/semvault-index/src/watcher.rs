//! Debounced file-system watcher driving the indexer.
//!
//! Raw `notify` events are bridged onto a tokio channel; the watcher
//! task resolves each path to `(source, relative)` and keeps a pending
//! map of `path -> last event time`. A ticker wakes once a second and
//! dispatches every entry whose quiet period has elapsed, so rapid
//! saves during editing collapse into a single embedding call
//! (trailing-edge coalescing).
//!
//! Deletes bypass the debounce: the file is gone, there is nothing to
//! coalesce. A move removes the old path immediately and enqueues the
//! new one.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecursiveMode, Watcher};
use semvault_core::{Error, FileEvent, Result};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::discover::SourceRegistry;
use crate::indexer::Indexer;

/// Watcher tuning knobs.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Quiet period before a pending file is dispatched.
    pub debounce: Duration,
    /// How often the pending map is checked.
    pub tick: Duration,
    /// File names excluded from eventing to prevent feedback loops.
    pub deny_list: Vec<String>,
    /// Use the polling backend instead of native notifications, for
    /// filesystems without recursive watch support.
    pub force_poll: bool,
    /// Poll interval when `force_poll` is set.
    pub poll_interval: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(30),
            tick: Duration::from_secs(1),
            deny_list: vec!["semvault.log".to_string()],
            force_poll: false,
            poll_interval: Duration::from_secs(10),
        }
    }
}

type PendingMap = HashMap<(String, String), Instant>;

/// Watches every configured source root and feeds the indexer.
pub struct VaultWatcher {
    registry: Arc<SourceRegistry>,
    indexer: Arc<Indexer>,
    config: WatcherConfig,
    pending: Arc<Mutex<PendingMap>>,
    watcher: Option<Box<dyn Watcher + Send>>,
    tasks: Vec<JoinHandle<()>>,
}

impl VaultWatcher {
    pub fn new(
        registry: Arc<SourceRegistry>,
        indexer: Arc<Indexer>,
        config: WatcherConfig,
    ) -> Self {
        Self {
            registry,
            indexer,
            config,
            pending: Arc::new(Mutex::new(HashMap::new())),
            watcher: None,
            tasks: Vec::new(),
        }
    }

    /// Register all source roots and spawn the event and ticker tasks.
    pub fn start(&mut self) -> Result<()> {
        let (event_tx, event_rx) = mpsc::channel::<FileEvent>(1024);

        // notify invokes the handler on its own thread; bridge into
        // the async world with a blocking send.
        let handler = move |result: notify::Result<notify::Event>| match result {
            Ok(event) => {
                if let Some(file_event) = classify(&event) {
                    if event_tx.blocking_send(file_event).is_err() {
                        warn!("watcher event channel closed");
                    }
                }
            }
            Err(e) => error!("watch error: {e}"),
        };

        let mut watcher: Box<dyn Watcher + Send> = if self.config.force_poll {
            let poll_config =
                notify::Config::default().with_poll_interval(self.config.poll_interval);
            Box::new(
                notify::PollWatcher::new(handler, poll_config)
                    .map_err(|e| Error::Other(format!("failed to create poll watcher: {e}")))?,
            )
        } else {
            Box::new(
                notify::recommended_watcher(handler)
                    .map_err(|e| Error::Other(format!("failed to create watcher: {e}")))?,
            )
        };

        for source in self.registry.sources() {
            watcher
                .watch(&source.root_path, RecursiveMode::Recursive)
                .map_err(|e| {
                    Error::Other(format!("failed to watch {:?}: {e}", source.root_path))
                })?;
            info!(source = %source.id, root = ?source.root_path, "watching source root");
        }
        self.watcher = Some(watcher);

        self.tasks.push(self.spawn_event_loop(event_rx));
        self.tasks.push(self.spawn_ticker());

        info!(
            debounce_seconds = self.config.debounce.as_secs(),
            "vault watcher started"
        );
        Ok(())
    }

    /// Stop watching and abort background tasks.
    pub fn stop(&mut self) {
        self.watcher = None;
        for task in self.tasks.drain(..) {
            task.abort();
        }
        info!("vault watcher stopped");
    }

    fn spawn_event_loop(&self, mut event_rx: mpsc::Receiver<FileEvent>) -> JoinHandle<()> {
        let registry = Arc::clone(&self.registry);
        let indexer = Arc::clone(&self.indexer);
        let pending = Arc::clone(&self.pending);
        let deny_list = self.config.deny_list.clone();

        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                handle_event(&registry, &indexer, &pending, &deny_list, event).await;
            }
        })
    }

    fn spawn_ticker(&self) -> JoinHandle<()> {
        let indexer = Arc::clone(&self.indexer);
        let pending = Arc::clone(&self.pending);
        let debounce = self.config.debounce;
        let tick = self.config.tick;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let due = drain_due(&mut *pending.lock().await, Instant::now(), debounce);
                for (source_id, rel_path) in due {
                    debug!(source_id, rel_path, "debounce expired, indexing");
                    match indexer.index_single(&source_id, &rel_path).await {
                        Ok(outcome) if !outcome.skipped => {
                            info!(
                                source_id,
                                rel_path,
                                chunks = outcome.chunks_indexed,
                                "watcher indexed file"
                            );
                        }
                        Ok(_) => {}
                        Err(Error::NotFound(_)) => {
                            // Deleted while pending; the delete event
                            // already cleaned the store.
                        }
                        Err(e) => {
                            error!(source_id, rel_path, error = %e, "watcher failed to index file");
                        }
                    }
                }
            }
        })
    }
}

/// Process one event against the pending map and the indexer.
async fn handle_event(
    registry: &SourceRegistry,
    indexer: &Indexer,
    pending: &Mutex<PendingMap>,
    deny_list: &[String],
    event: FileEvent,
) {
    match event {
        FileEvent::Created(path) | FileEvent::Modified(path) => {
            if let Some(key) = resolve_eligible(registry, deny_list, &path) {
                pending.lock().await.insert(key, Instant::now());
            }
        }
        FileEvent::Deleted(path) => {
            // Immediate: cancel any pending index and purge the store.
            if let Some((source_id, rel_path)) = resolve_eligible(registry, deny_list, &path) {
                pending
                    .lock()
                    .await
                    .remove(&(source_id.clone(), rel_path.clone()));
                if let Err(e) = indexer.remove_file(&source_id, &rel_path).await {
                    error!(source_id, rel_path, error = %e, "failed to remove deleted file");
                }
            }
        }
        FileEvent::Moved { from, to } => {
            let from_key = resolve_eligible(registry, deny_list, &from);
            let to_key = resolve_eligible(registry, deny_list, &to);

            // Nothing pending survives a rename on either side.
            {
                let mut map = pending.lock().await;
                if let Some(ref key) = from_key {
                    map.remove(key);
                }
                if let Some(ref key) = to_key {
                    map.remove(key);
                }
            }

            match (from_key, to_key) {
                (Some((from_source, from_rel)), Some((to_source, to_rel)))
                    if from_source == to_source =>
                {
                    // Rewrites ids and metadata, reusing the stored
                    // embeddings; falls back to a fresh index when the
                    // old path had no rows.
                    if let Err(e) = indexer.move_file(&from_source, &from_rel, &to_rel).await {
                        error!(
                            source_id = from_source,
                            from_path = from_rel,
                            to_path = to_rel,
                            error = %e,
                            "failed to move file in index"
                        );
                    }
                }
                (from_key, to_key) => {
                    // Cross-source rename, or one side ineligible:
                    // remove the old entry explicitly to prevent
                    // ghosts, reindex the destination after debounce.
                    if let Some((source_id, rel_path)) = from_key {
                        if let Err(e) = indexer.remove_file(&source_id, &rel_path).await {
                            error!(source_id, rel_path, error = %e, "failed to remove moved file");
                        }
                    }
                    if let Some(key) = to_key {
                        pending.lock().await.insert(key, Instant::now());
                    }
                }
            }
        }
    }
}

/// Resolve a path to its `(source_id, relative)` key, applying the
/// deny list and per-source eligibility rules.
fn resolve_eligible(
    registry: &SourceRegistry,
    deny_list: &[String],
    path: &std::path::Path,
) -> Option<(String, String)> {
    let name = path.file_name()?.to_string_lossy();
    if deny_list.iter().any(|denied| denied.as_str() == name) {
        return None;
    }

    let (source, rel_path) = registry.resolve(path)?;
    if !registry.is_eligible(&source.id, &rel_path) {
        return None;
    }
    Some((source.id.clone(), rel_path))
}

/// Remove and return every pending entry whose quiet period elapsed.
fn drain_due(
    pending: &mut PendingMap,
    now: Instant,
    debounce: Duration,
) -> Vec<(String, String)> {
    let due: Vec<(String, String)> = pending
        .iter()
        .filter(|(_, &last)| now.duration_since(last) >= debounce)
        .map(|(key, _)| key.clone())
        .collect();
    for key in &due {
        pending.remove(key);
    }
    due
}

/// Convert a raw notify event into the service's event model.
fn classify(event: &notify::Event) -> Option<FileEvent> {
    let path = event.paths.first()?.clone();

    match &event.kind {
        EventKind::Create(_) => Some(FileEvent::Created(path)),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() >= 2 => {
            Some(FileEvent::Moved {
                from: event.paths[0].clone(),
                to: event.paths[1].clone(),
            })
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(FileEvent::Deleted(path)),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(FileEvent::Created(path)),
        EventKind::Modify(_) => Some(FileEvent::Modified(path)),
        EventKind::Remove(_) => Some(FileEvent::Deleted(path)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};
    use semvault_core::Source;

    fn make_event(kind: EventKind, paths: Vec<PathBuf>) -> notify::Event {
        notify::Event {
            kind,
            paths,
            attrs: Default::default(),
        }
    }

    #[test]
    fn test_classify_create() {
        let path = PathBuf::from("/vault/a.md");
        let event = make_event(EventKind::Create(CreateKind::File), vec![path.clone()]);
        assert!(matches!(classify(&event), Some(FileEvent::Created(p)) if p == path));
    }

    #[test]
    fn test_classify_modify() {
        let path = PathBuf::from("/vault/a.md");
        let event = make_event(
            EventKind::Modify(ModifyKind::Data(DataChange::Any)),
            vec![path.clone()],
        );
        assert!(matches!(classify(&event), Some(FileEvent::Modified(p)) if p == path));
    }

    #[test]
    fn test_classify_remove() {
        let path = PathBuf::from("/vault/a.md");
        let event = make_event(EventKind::Remove(RemoveKind::File), vec![path.clone()]);
        assert!(matches!(classify(&event), Some(FileEvent::Deleted(p)) if p == path));
    }

    #[test]
    fn test_classify_rename_both() {
        let from = PathBuf::from("/vault/old.md");
        let to = PathBuf::from("/vault/new.md");
        let event = make_event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            vec![from.clone(), to.clone()],
        );
        match classify(&event) {
            Some(FileEvent::Moved { from: f, to: t }) => {
                assert_eq!(f, from);
                assert_eq!(t, to);
            }
            other => panic!("expected Moved, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_rename_halves() {
        let path = PathBuf::from("/vault/a.md");
        let from_event = make_event(
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            vec![path.clone()],
        );
        assert!(matches!(classify(&from_event), Some(FileEvent::Deleted(_))));

        let to_event = make_event(
            EventKind::Modify(ModifyKind::Name(RenameMode::To)),
            vec![path],
        );
        assert!(matches!(classify(&to_event), Some(FileEvent::Created(_))));
    }

    #[test]
    fn test_drain_due_trailing_edge() {
        let debounce = Duration::from_secs(30);
        let now = Instant::now();
        let mut pending = PendingMap::new();
        pending.insert(("vault".into(), "quiet.md".into()), now - Duration::from_secs(31));
        pending.insert(("vault".into(), "active.md".into()), now - Duration::from_secs(2));

        let due = drain_due(&mut pending, now, debounce);
        assert_eq!(due, vec![("vault".to_string(), "quiet.md".to_string())]);
        assert_eq!(pending.len(), 1);
        assert!(pending.contains_key(&("vault".to_string(), "active.md".to_string())));
    }

    #[test]
    fn test_drain_due_rapid_saves_coalesce() {
        let debounce = Duration::from_secs(30);
        let now = Instant::now();
        let mut pending = PendingMap::new();

        // Each save refreshes the timestamp; only one dispatch results.
        let key = ("vault".to_string(), "a.md".to_string());
        pending.insert(key.clone(), now - Duration::from_secs(40));
        pending.insert(key.clone(), now - Duration::from_secs(1));

        assert!(drain_due(&mut pending, now, debounce).is_empty());
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_resolve_eligible_deny_list_and_scope() {
        let temp = tempfile::tempdir().unwrap();
        let registry =
            SourceRegistry::new(vec![Source::markdown("vault", temp.path())]).unwrap();
        let deny = vec!["semvault.log".to_string()];

        assert_eq!(
            resolve_eligible(&registry, &deny, &temp.path().join("notes/a.md")),
            Some(("vault".to_string(), "notes/a.md".to_string()))
        );
        // Deny-listed name
        assert!(resolve_eligible(&registry, &deny, &temp.path().join("semvault.log")).is_none());
        // Not markdown
        assert!(resolve_eligible(&registry, &deny, &temp.path().join("a.txt")).is_none());
        // Outside every source root
        assert!(resolve_eligible(&registry, &deny, std::path::Path::new("/elsewhere/a.md")).is_none());
    }

    #[test]
    fn test_default_config() {
        let config = WatcherConfig::default();
        assert_eq!(config.debounce, Duration::from_secs(30));
        assert!(!config.force_poll);
        assert!(config.deny_list.contains(&"semvault.log".to_string()));
    }

    struct CountingEmbedder {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl semvault_core::Embedder for CountingEmbedder {
        fn model_name(&self) -> &str {
            "counting"
        }

        fn dimension(&self) -> usize {
            4
        }

        async fn embed_batch(
            &self,
            texts: &[String],
        ) -> Result<Vec<Vec<f32>>, semvault_core::EmbedError> {
            self.calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(texts.iter().map(|_| vec![0.5; 4]).collect())
        }
    }

    #[tokio::test]
    async fn test_move_event_reuses_embeddings() {
        use semvault_core::VectorRepository;

        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().to_path_buf();
        std::fs::write(root.join("a.md"), "# A\n\nmovable body").unwrap();

        let registry =
            Arc::new(SourceRegistry::new(vec![Source::markdown("vault", &root)]).unwrap());
        let repo = Arc::new(semvault_store::MemoryStore::new());
        let embedder = Arc::new(CountingEmbedder {
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let indexer = Indexer::new(
            Arc::clone(&registry),
            Arc::clone(&repo) as Arc<dyn VectorRepository>,
            Arc::clone(&embedder) as Arc<dyn semvault_core::Embedder>,
            Arc::new(semvault_chunker::MarkdownChunker::with_defaults()),
            4,
        );
        indexer.index_single("vault", "a.md").await.unwrap();
        let calls = embedder.calls.load(std::sync::atomic::Ordering::SeqCst);

        std::fs::rename(root.join("a.md"), root.join("b.md")).unwrap();
        let pending = Mutex::new(PendingMap::new());
        handle_event(
            &registry,
            &indexer,
            &pending,
            &[],
            FileEvent::Moved {
                from: root.join("a.md"),
                to: root.join("b.md"),
            },
        )
        .await;

        assert_eq!(
            embedder.calls.load(std::sync::atomic::Ordering::SeqCst),
            calls,
            "a same-source move must not re-embed"
        );
        assert!(repo.get_by_path("vault", "a.md").await.unwrap().is_empty());
        let moved = repo.get_by_path("vault", "b.md").await.unwrap();
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0].id, "vault::b.md::0");
        assert!(
            pending.lock().await.is_empty(),
            "a same-source move is handled immediately, nothing pending"
        );
    }
}
