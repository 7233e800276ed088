//! URL → file index with atomic snapshot replacement.
//!
//! # Responsibilities
//! - Build a URL-path → absolute-path map of the served root
//! - Publish each generation with one atomic pointer swap
//! - Rebuild on a timer and/or on filesystem notifications
//! - Resolve request paths with traversal and containment checks
//!
//! # Design Decisions
//! - Readers load an `Arc<Snapshot>` and never wait on a rebuild
//! - Rebuilds are serialized; scheduled ones are skipped while one runs
//! - Background tasks hold a `Weak` reference and stop on shutdown

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use notify::RecommendedWatcher;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::config::schema::StaticFilesConfig;
use crate::http::path::{decode_path, has_dot_dot_segment, normalize_path};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::static_files::walk::{is_within, walk};
use crate::static_files::watcher::spawn_watcher;
use crate::static_files::IndexError;

/// Normalized indexing options.
#[derive(Debug, Clone)]
pub struct IndexSettings {
    root: PathBuf,
    url_base: String,
    scan_interval: Option<Duration>,
    follow_symlinks: bool,
    max_files: Option<usize>,
    max_depth: Option<usize>,
    allow_well_known: bool,
    index_files: Vec<String>,
    watch: bool,
}

impl IndexSettings {
    pub fn from_config(config: &StaticFilesConfig) -> Self {
        Self {
            root: config.root_dir.clone(),
            url_base: normalize_base(&config.url_base),
            scan_interval: config.scan_interval_ms.map(Duration::from_millis),
            follow_symlinks: config.follow_symlinks,
            max_files: config.max_files,
            max_depth: config.max_depth,
            allow_well_known: config.allow_well_known,
            index_files: config.index_files.clone(),
            watch: config.watch,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn url_base(&self) -> &str {
        &self.url_base
    }

    pub fn follow_symlinks(&self) -> bool {
        self.follow_symlinks
    }

    pub fn max_files(&self) -> Option<usize> {
        self.max_files
    }

    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    pub fn allow_well_known(&self) -> bool {
        self.allow_well_known
    }

    pub fn index_files(&self) -> &[String] {
        &self.index_files
    }

    /// Public URL for a `/`-separated path relative to the root.
    pub fn url_for(&self, rel: &str) -> String {
        let prefix = if self.url_base == "/" { "" } else { self.url_base.as_str() };
        match (rel.is_empty(), prefix.is_empty()) {
            (true, true) => "/".to_string(),
            (true, false) => prefix.to_string(),
            (false, _) => format!("{prefix}/{rel}"),
        }
    }
}

/// Leading slash, no trailing slash, `/` for empty.
fn normalize_base(base: &str) -> String {
    let base = base.trim();
    if base.is_empty() || base == "/" {
        return "/".to_string();
    }
    let base = normalize_path(base);
    if base.starts_with('/') {
        base.to_string()
    } else {
        format!("/{base}")
    }
}

/// One immutable index generation.
#[derive(Debug)]
pub struct Snapshot {
    entries: HashMap<String, PathBuf>,
    root: PathBuf,
    generation: u64,
    files: usize,
    truncated: bool,
}

impl Snapshot {
    fn empty(root: PathBuf) -> Self {
        Self {
            entries: HashMap::new(),
            root,
            generation: 0,
            files: 0,
            truncated: false,
        }
    }

    pub fn get(&self, url_path: &str) -> Option<&Path> {
        self.entries.get(url_path).map(PathBuf::as_path)
    }

    /// Indexed URLs, including directory aliases for index files.
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Canonical root this generation was built from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Regular files recorded (aliases excluded).
    pub fn files(&self) -> usize {
        self.files
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

/// Concurrently readable static file index.
pub struct StaticIndex {
    settings: IndexSettings,
    snapshot: ArcSwap<Snapshot>,
    generation: AtomicU64,
    rebuild_lock: tokio::sync::Mutex<()>,
    shutdown: Shutdown,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl StaticIndex {
    pub fn new(config: &StaticFilesConfig) -> Self {
        Self::with_settings(IndexSettings::from_config(config))
    }

    pub fn with_settings(settings: IndexSettings) -> Self {
        let empty = Snapshot::empty(settings.root.clone());
        Self {
            settings,
            snapshot: ArcSwap::from_pointee(empty),
            generation: AtomicU64::new(0),
            rebuild_lock: tokio::sync::Mutex::new(()),
            shutdown: Shutdown::new(),
            tasks: Mutex::new(Vec::new()),
            watcher: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &IndexSettings {
        &self.settings
    }

    /// The current generation.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.load_full()
    }

    /// Exact lookup of an already decoded URL path.
    pub fn lookup(&self, url_path: &str) -> Option<PathBuf> {
        self.snapshot.load().get(url_path).map(Path::to_path_buf)
    }

    /// Resolve a request path to a file inside the root.
    ///
    /// Rejects relative paths, `..` segments (before or after decoding) and
    /// paths outside the URL base, then re-checks containment of the result.
    pub fn resolve_url(&self, path: &str) -> Option<PathBuf> {
        if !path.starts_with('/') || has_dot_dot_segment(path) {
            return None;
        }
        let decoded = decode_path(normalize_path(path))?;
        if has_dot_dot_segment(&decoded) {
            return None;
        }

        let base = self.settings.url_base();
        if base != "/" && decoded != base && !decoded.starts_with(&format!("{base}/")) {
            return None;
        }

        let snapshot = self.snapshot.load();
        let resolved = snapshot.get(&decoded)?;
        if !is_within(resolved, snapshot.root()) {
            tracing::warn!(path = %decoded, resolved = ?resolved, "Indexed path escaped the root");
            return None;
        }
        Some(resolved.to_path_buf())
    }

    /// Build and publish a new generation, waiting for any rebuild in flight.
    pub async fn rebuild(&self) -> Arc<Snapshot> {
        let _guard = self.rebuild_lock.lock().await;
        self.rebuild_locked().await
    }

    /// Rebuild unless one is already running.
    pub async fn try_rebuild(&self) -> Option<Arc<Snapshot>> {
        let _guard = self.rebuild_lock.try_lock().ok()?;
        Some(self.rebuild_locked().await)
    }

    /// Occupy the rebuild slot as an in-flight rebuild would.
    #[cfg(test)]
    pub(crate) async fn block_rebuilds(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.rebuild_lock.lock().await
    }

    async fn rebuild_locked(&self) -> Arc<Snapshot> {
        let started = Instant::now();
        let walked = walk(&self.settings).await;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let snapshot = Arc::new(Snapshot {
            entries: walked.entries,
            root: walked.root,
            generation,
            files: walked.files,
            truncated: walked.truncated,
        });
        self.snapshot.store(snapshot.clone());

        metrics::record_index_rebuild(snapshot.files(), started);
        tracing::info!(
            generation,
            files = snapshot.files(),
            urls = snapshot.len(),
            truncated = snapshot.is_truncated(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Static index rebuilt"
        );
        snapshot
    }

    /// Build once, then start the configured background refreshers.
    ///
    /// A stopped index is not restarted.
    pub async fn start(self: &Arc<Self>) -> Result<(), IndexError> {
        let snapshot = self.rebuild().await;
        if self.shutdown.is_triggered() {
            tracing::debug!(root = ?self.settings.root, "Index already stopped, not starting refreshers");
            return Ok(());
        }

        if let Some(period) = self.settings.scan_interval {
            let task = tokio::spawn(run_interval(Arc::downgrade(self), period, self.shutdown.subscribe()));
            self.tasks.lock().unwrap_or_else(PoisonError::into_inner).push(task);
        }

        if self.settings.watch {
            let (watcher, task) = spawn_watcher(Arc::downgrade(self), snapshot.root(), self.shutdown.subscribe())
                .map_err(|source| IndexError::Watch {
                    path: snapshot.root().to_path_buf(),
                    source,
                })?;
            *self.watcher.lock().unwrap_or_else(PoisonError::into_inner) = Some(watcher);
            self.tasks.lock().unwrap_or_else(PoisonError::into_inner).push(task);
        }

        Ok(())
    }

    /// Stop background rebuilds. The last snapshot stays readable.
    pub fn stop(&self) {
        self.shutdown.trigger();
        self.watcher.lock().unwrap_or_else(PoisonError::into_inner).take();
        for task in self.tasks.lock().unwrap_or_else(PoisonError::into_inner).drain(..) {
            task.abort();
        }
        tracing::debug!(root = ?self.settings.root, "Static index stopped");
    }
}

impl Drop for StaticIndex {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

impl std::fmt::Debug for StaticIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot.load();
        f.debug_struct("StaticIndex")
            .field("root", &self.settings.root)
            .field("url_base", &self.settings.url_base)
            .field("generation", &snapshot.generation)
            .field("urls", &snapshot.len())
            .finish()
    }
}

async fn run_interval(index: Weak<StaticIndex>, period: Duration, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
    let mut ticker = time::interval_at(time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(index) = index.upgrade() else { break };
                if index.try_rebuild().await.is_none() {
                    tracing::debug!("Scheduled index rebuild skipped, one is in flight");
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn settings(root: &Path) -> StaticFilesConfig {
        StaticFilesConfig {
            enabled: true,
            root_dir: root.to_path_buf(),
            ..StaticFilesConfig::default()
        }
    }

    fn site() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
        fs::write(dir.path().join("app.js"), "console.log(1)").unwrap();
        fs::create_dir_all(dir.path().join("docs/guide")).unwrap();
        fs::write(dir.path().join("docs/guide/intro.txt"), "intro").unwrap();
        fs::write(dir.path().join("docs/index.htm"), "docs").unwrap();
        fs::write(dir.path().join(".env"), "SECRET=1").unwrap();
        fs::create_dir_all(dir.path().join(".well-known")).unwrap();
        fs::write(dir.path().join(".well-known/security.txt"), "contact").unwrap();
        dir
    }

    #[test]
    fn test_normalize_base() {
        assert_eq!(normalize_base(""), "/");
        assert_eq!(normalize_base("/"), "/");
        assert_eq!(normalize_base("/static/"), "/static");
        assert_eq!(normalize_base("assets"), "/assets");
    }

    #[tokio::test]
    async fn test_rebuild_indexes_regular_files() {
        let dir = site();
        let index = StaticIndex::new(&settings(dir.path()));
        let snapshot = index.rebuild().await;

        assert_eq!(snapshot.generation(), 1);
        assert_eq!(snapshot.files(), 4);
        assert!(index.lookup("/app.js").is_some());
        assert!(index.lookup("/docs/guide/intro.txt").is_some());
        assert!(index.lookup("/.env").is_none());
        assert!(index.lookup("/.well-known/security.txt").is_none());
    }

    #[tokio::test]
    async fn test_directory_urls_map_to_index_files() {
        let dir = site();
        let index = StaticIndex::new(&settings(dir.path()));
        index.rebuild().await;

        assert_eq!(index.resolve_url("/"), index.lookup("/index.html"));
        assert_eq!(index.resolve_url("/docs/"), index.lookup("/docs/index.htm"));
        assert!(index.resolve_url("/docs/guide").is_none());
    }

    #[tokio::test]
    async fn test_well_known_allow_list() {
        let dir = site();
        let mut config = settings(dir.path());
        config.allow_well_known = true;
        let index = StaticIndex::new(&config);
        index.rebuild().await;

        assert!(index.lookup("/.well-known/security.txt").is_some());
        assert!(index.lookup("/.env").is_none());
    }

    #[tokio::test]
    async fn test_url_base_prefix() {
        let dir = site();
        let mut config = settings(dir.path());
        config.url_base = "/assets/".into();
        let index = StaticIndex::new(&config);
        index.rebuild().await;

        assert!(index.resolve_url("/assets/app.js").is_some());
        assert!(index.resolve_url("/assets").is_some());
        assert!(index.resolve_url("/app.js").is_none());
        assert!(index.resolve_url("/assetsx/app.js").is_none());
    }

    #[tokio::test]
    async fn test_resolve_url_rejects_traversal_and_relative() {
        let dir = site();
        let index = StaticIndex::new(&settings(dir.path()));
        index.rebuild().await;

        assert!(index.resolve_url("app.js").is_none());
        assert!(index.resolve_url("").is_none());
        assert!(index.resolve_url("/docs/../app.js").is_none());
        assert!(index.resolve_url("/docs/%2e%2e/app.js").is_none());
        assert!(index.resolve_url("/app.js/").is_some());
    }

    #[tokio::test]
    async fn test_percent_encoded_names_resolve() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("my file.txt"), "x").unwrap();
        let index = StaticIndex::new(&settings(dir.path()));
        index.rebuild().await;

        assert!(index.resolve_url("/my%20file.txt").is_some());
        assert!(index.resolve_url("/my%2").is_none());
    }

    #[tokio::test]
    async fn test_limits_truncate_without_failing() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            fs::write(dir.path().join(format!("f{i}.txt")), "x").unwrap();
        }
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("a/one.txt"), "x").unwrap();
        fs::write(dir.path().join("a/b/two.txt"), "x").unwrap();

        let mut config = settings(dir.path());
        config.max_files = Some(3);
        let index = StaticIndex::new(&config);
        let snapshot = index.rebuild().await;
        assert_eq!(snapshot.files(), 3);
        assert!(snapshot.is_truncated());

        let mut config = settings(dir.path());
        config.max_depth = Some(1);
        let index = StaticIndex::new(&config);
        index.rebuild().await;
        assert!(index.lookup("/a/one.txt").is_some());
        assert!(index.lookup("/a/b/two.txt").is_none());
    }

    #[tokio::test]
    async fn test_rebuild_without_changes_keeps_key_set() {
        let dir = site();
        let index = StaticIndex::new(&settings(dir.path()));
        let first = index.rebuild().await;
        let second = index.rebuild().await;

        let mut a: Vec<_> = first.urls().collect();
        let mut b: Vec<_> = second.urls().collect();
        a.sort();
        b.sort();
        assert_eq!(a, b);
        assert_eq!(second.generation(), first.generation() + 1);
        assert_eq!(index.lookup("/app.js"), index.lookup("/app.js"));
    }

    #[tokio::test]
    async fn test_old_snapshot_survives_swap() {
        let dir = site();
        let index = StaticIndex::new(&settings(dir.path()));
        let before = index.rebuild().await;
        fs::write(dir.path().join("new.css"), "body{}").unwrap();
        index.rebuild().await;

        assert!(before.get("/new.css").is_none());
        assert!(index.lookup("/new.css").is_some());
    }

    #[tokio::test]
    async fn test_missing_root_yields_empty_index() {
        let index = StaticIndex::new(&settings(Path::new("/definitely/not/here")));
        let snapshot = index.rebuild().await;
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_interval_rebuild_picks_up_new_files() {
        let dir = site();
        let mut config = settings(dir.path());
        config.scan_interval_ms = Some(100);
        let index = Arc::new(StaticIndex::new(&config));
        index.start().await.unwrap();

        fs::write(dir.path().join("late.txt"), "late").unwrap();
        let mut found = false;
        for _ in 0..40 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if index.lookup("/late.txt").is_some() {
                found = true;
                break;
            }
        }
        index.stop();
        assert!(found);
    }

    #[tokio::test]
    async fn test_stopped_index_does_not_restart() {
        let dir = site();
        let mut config = settings(dir.path());
        config.scan_interval_ms = Some(100);
        let index = Arc::new(StaticIndex::new(&config));
        index.stop();
        index.start().await.unwrap();

        assert!(index.tasks.lock().unwrap().is_empty());
        assert!(index.lookup("/app.js").is_some());
    }

    #[tokio::test]
    async fn test_try_rebuild_skips_while_busy() {
        let dir = site();
        let index = StaticIndex::new(&settings(dir.path()));
        let guard = index.rebuild_lock.lock().await;
        assert!(index.try_rebuild().await.is_none());
        drop(guard);
        assert!(index.try_rebuild().await.is_some());
    }

    #[cfg(unix)]
    mod symlinks {
        use super::*;
        use std::os::unix::fs::symlink;

        #[tokio::test]
        async fn test_symlinks_ignored_unless_enabled() {
            let dir = site();
            symlink(dir.path().join("app.js"), dir.path().join("alias.js")).unwrap();

            let index = StaticIndex::new(&settings(dir.path()));
            index.rebuild().await;
            assert!(index.lookup("/alias.js").is_none());

            let mut config = settings(dir.path());
            config.follow_symlinks = true;
            let index = StaticIndex::new(&config);
            index.rebuild().await;
            assert!(index.lookup("/alias.js").is_some());
        }

        #[tokio::test]
        async fn test_symlink_outside_root_is_never_indexed() {
            let dir = site();
            let outside = tempfile::tempdir().unwrap();
            fs::write(outside.path().join("secret.txt"), "secret").unwrap();
            symlink(outside.path().join("secret.txt"), dir.path().join("outlink.txt")).unwrap();
            symlink(outside.path(), dir.path().join("outdir")).unwrap();

            let mut config = settings(dir.path());
            config.follow_symlinks = true;
            let index = StaticIndex::new(&config);
            let snapshot = index.rebuild().await;

            assert!(snapshot.get("/outlink.txt").is_none());
            assert!(snapshot.get("/outdir/secret.txt").is_none());
            assert!(snapshot.urls().all(|url| !url.contains("secret")));
        }

        #[tokio::test]
        async fn test_symlink_cycle_terminates() {
            let dir = tempfile::tempdir().unwrap();
            fs::create_dir_all(dir.path().join("a")).unwrap();
            fs::write(dir.path().join("a/placeholder.txt"), "x").unwrap();
            symlink(dir.path().join("a"), dir.path().join("a/loop")).unwrap();

            let mut config = settings(dir.path());
            config.follow_symlinks = true;
            let index = StaticIndex::new(&config);
            let snapshot = tokio::time::timeout(Duration::from_secs(5), index.rebuild())
                .await
                .expect("indexing hung on a symlink cycle");

            assert!(snapshot.get("/a/placeholder.txt").is_some());
            assert!(snapshot.get("/a/loop/placeholder.txt").is_none());
            assert_eq!(snapshot.files(), 1);
        }

        #[tokio::test]
        async fn test_real_path_wins_over_link_alias() {
            let dir = tempfile::tempdir().unwrap();
            fs::create_dir_all(dir.path().join("real")).unwrap();
            fs::write(dir.path().join("real/file.txt"), "x").unwrap();
            symlink(dir.path().join("real"), dir.path().join("alias")).unwrap();

            let mut config = settings(dir.path());
            config.follow_symlinks = true;
            let index = StaticIndex::new(&config);
            index.rebuild().await;

            assert!(index.lookup("/real/file.txt").is_some());
            assert!(index.lookup("/alias/file.txt").is_none());
        }
    }
}
