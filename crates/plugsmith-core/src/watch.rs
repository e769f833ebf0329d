//! Development watch mode
//!
//! Compiles a plugin once, then again whenever one of its source files
//! changes. Changes arriving within the debounce window, or while a compile
//! is running, are folded into a single follow-up compile.

use crate::Result;
use crate::compiler::{CompiledPlugin, Compiler};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info, warn};

/// Directories whose contents never trigger a compile
pub const IGNORED_DIRS: &[&str] = &["node_modules", "target", "dist"];

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(150);

type WatchEvent = notify::Result<Event>;

/// One compile run by the watcher
#[derive(Debug)]
pub struct WatchCompile {
    /// First changed file, `None` for the initial compile
    pub trigger: Option<PathBuf>,
    /// Number of changes folded into this compile
    pub changes: usize,
    pub elapsed: Duration,
    pub result: Result<CompiledPlugin>,
}

/// True when a change at `relative` (inside the plugin root) is not worth a
/// compile: hidden files and directories, build output and sourcemaps
pub fn is_ignored(relative: &Path) -> bool {
    let skipped_dir = relative.components().any(|c| {
        let name = c.as_os_str().to_string_lossy();
        name.starts_with('.') || IGNORED_DIRS.contains(&name.as_ref())
    });
    skipped_dir || relative.extension().is_some_and(|ext| ext == "map")
}

/// Recompiles one plugin source directory on change
pub struct DevWatcher {
    compiler: Compiler,
    source_dir: PathBuf,
    debounce: Duration,
}

impl DevWatcher {
    pub fn new(compiler: Compiler, source_dir: impl Into<PathBuf>) -> Self {
        Self {
            compiler,
            source_dir: source_dir.into(),
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    /// Watch until `shutdown` resolves, handing every compile to
    /// `on_compile`. Returns how many compiles ran.
    ///
    /// Compile failures are reported and watching continues; only a failure
    /// to set up the file watcher is an error.
    pub async fn run<S, F>(&self, shutdown: S, on_compile: F) -> Result<usize>
    where
        S: Future<Output = ()>,
        F: FnMut(WatchCompile),
    {
        let root = tokio::fs::canonicalize(&self.source_dir).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |event: WatchEvent| {
            let _ = tx.send(event);
        })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;
        info!(dir = %root.display(), "Watching plugin sources");

        let compiles = self.drive(&root, rx, shutdown, on_compile).await;
        info!(compiles, "Stopped watching");
        Ok(compiles)
    }

    async fn drive<S, F>(
        &self,
        root: &Path,
        mut events: UnboundedReceiver<WatchEvent>,
        shutdown: S,
        mut on_compile: F,
    ) -> usize
    where
        S: Future<Output = ()>,
        F: FnMut(WatchCompile),
    {
        tokio::pin!(shutdown);

        on_compile(self.compile(None, 0).await);
        let mut compiles = 1;

        loop {
            let event = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            let Some(trigger) = relevant_path(root, event) else {
                continue;
            };

            // events queued during the previous compile land here too
            tokio::time::sleep(self.debounce).await;
            let changes = 1 + drain_relevant(root, &mut events);

            on_compile(self.compile(Some(trigger), changes).await);
            compiles += 1;
        }
        compiles
    }

    async fn compile(&self, trigger: Option<PathBuf>, changes: usize) -> WatchCompile {
        if let Some(path) = &trigger {
            debug!(path = %path.display(), changes, "Change detected");
        }
        let started = Instant::now();
        let result = self.compiler.compile(&self.source_dir).await;
        if let Err(e) = &result {
            warn!(error = %e, "Compile failed, waiting for changes");
        }
        WatchCompile {
            trigger,
            changes,
            elapsed: started.elapsed(),
            result,
        }
    }
}

/// First path of a create/modify/remove event that is not ignored
fn relevant_path(root: &Path, event: WatchEvent) -> Option<PathBuf> {
    let event = match event {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "File watcher error");
            return None;
        }
    };
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return None;
    }
    event
        .paths
        .into_iter()
        .find(|path| path.strip_prefix(root).is_ok_and(|rel| !is_ignored(rel)))
}

fn drain_relevant(root: &Path, events: &mut UnboundedReceiver<WatchEvent>) -> usize {
    let mut count = 0;
    while let Ok(event) = events.try_recv() {
        if relevant_path(root, event).is_some() {
            count += 1;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::compiler::{BundleRequest, Bundler, CompileOptions};
    use async_trait::async_trait;
    use notify::event::{AccessKind, CreateKind, ModifyKind};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Default)]
    struct CountingBundler {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl Bundler for CountingBundler {
        async fn bundle(&self, request: &BundleRequest) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            tokio::fs::write(&request.outfile, "export default {};\n").await?;
            Ok(())
        }
    }

    fn source_plugin(root: &Path, with_entry: bool) -> PathBuf {
        let dir = root.join("pet-tools");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("package.json"),
            r#"{"name": "pet-tools", "version": "1.0.0"}"#,
        )
        .unwrap();
        if with_entry {
            std::fs::write(dir.join("index.ts"), "export default {}").unwrap();
        }
        dir
    }

    fn watcher(root: &Path, source: &Path, bundler: Arc<CountingBundler>) -> DevWatcher {
        let compiler = Compiler::new(
            CompileOptions::default()
                .with_out_root(root.join("dist"))
                .with_minify(false),
        )
        .with_bundler(bundler);
        DevWatcher::new(compiler, source).with_debounce(Duration::from_millis(5))
    }

    fn modified(path: PathBuf) -> WatchEvent {
        Ok(Event::new(EventKind::Modify(ModifyKind::Any)).add_path(path))
    }

    #[test]
    fn test_is_ignored() {
        assert!(is_ignored(Path::new(".git/index")));
        assert!(is_ignored(Path::new("components/.Widget.ts.swp")));
        assert!(is_ignored(Path::new("node_modules/vue/index.js")));
        assert!(is_ignored(Path::new("backend/target/release/lib.so")));
        assert!(is_ignored(Path::new("dist/index.js")));
        assert!(is_ignored(Path::new("index.js.map")));

        assert!(!is_ignored(Path::new("index.ts")));
        assert!(!is_ignored(Path::new("components/Widget.ts")));
        assert!(!is_ignored(Path::new("backend/src/lib.rs")));
    }

    #[test]
    fn test_relevant_path_filters_kinds_and_locations() {
        let root = Path::new("/plugins/pet-tools");
        assert_eq!(
            relevant_path(root, modified(root.join("index.ts"))),
            Some(root.join("index.ts"))
        );
        assert_eq!(
            relevant_path(
                root,
                Ok(Event::new(EventKind::Create(CreateKind::File)).add_path(root.join("a.ts")))
            ),
            Some(root.join("a.ts"))
        );
        assert!(relevant_path(root, modified(root.join("node_modules/x.js"))).is_none());
        assert!(relevant_path(root, modified(PathBuf::from("/elsewhere/index.ts"))).is_none());
        assert!(
            relevant_path(
                root,
                Ok(Event::new(EventKind::Access(AccessKind::Any)).add_path(root.join("index.ts")))
            )
            .is_none()
        );
        assert!(relevant_path(root, Err(notify::Error::generic("gone"))).is_none());
    }

    #[tokio::test]
    async fn test_burst_of_changes_compiles_once() {
        let tmp = TempDir::new().unwrap();
        let source = source_plugin(tmp.path(), true);
        let bundler = Arc::new(CountingBundler::default());
        let watcher = watcher(tmp.path(), &source, bundler.clone());

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(modified(source.join("index.ts"))).unwrap();
        tx.send(modified(source.join("node_modules/x.js"))).unwrap();
        tx.send(modified(source.join("components/Widget.ts"))).unwrap();
        tx.send(modified(source.join("index.js.map"))).unwrap();
        tx.send(modified(source.join("styles/main.css"))).unwrap();
        drop(tx);

        let mut runs = Vec::new();
        let compiles = watcher
            .drive(&source, rx, std::future::pending(), |run| runs.push(run))
            .await;

        assert_eq!(compiles, 2);
        assert_eq!(bundler.runs.load(Ordering::SeqCst), 2);
        assert!(runs[0].trigger.is_none());
        assert_eq!(runs[1].trigger, Some(source.join("index.ts")));
        assert_eq!(runs[1].changes, 3);
        assert!(runs.iter().all(|run| run.result.is_ok()));
    }

    #[tokio::test]
    async fn test_ignored_changes_do_not_compile() {
        let tmp = TempDir::new().unwrap();
        let source = source_plugin(tmp.path(), true);
        let bundler = Arc::new(CountingBundler::default());
        let watcher = watcher(tmp.path(), &source, bundler.clone());

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(modified(source.join(".git/HEAD"))).unwrap();
        tx.send(modified(source.join("backend/target/debug/x"))).unwrap();
        drop(tx);

        let compiles = watcher
            .drive(&source, rx, std::future::pending(), |_| {})
            .await;
        assert_eq!(compiles, 1);
        assert_eq!(bundler.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_compile_error_keeps_watching() {
        let tmp = TempDir::new().unwrap();
        let source = source_plugin(tmp.path(), false);
        let watcher = watcher(tmp.path(), &source, Arc::new(CountingBundler::default()));

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(modified(source.join("index.ts"))).unwrap();
        drop(tx);

        let mut results = Vec::new();
        let entry = source.join("index.ts");
        watcher
            .drive(&source, rx, std::future::pending(), |run| {
                // the author fixes the missing entry after the first failure
                if run.result.is_err() {
                    std::fs::write(&entry, "export default {}").unwrap();
                }
                results.push(run.result);
            })
            .await;

        assert!(matches!(results[0], Err(Error::NoEntryPoint(_))));
        assert!(results[1].is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_stops_before_pending_changes() {
        let tmp = TempDir::new().unwrap();
        let source = source_plugin(tmp.path(), true);
        let bundler = Arc::new(CountingBundler::default());
        let watcher = watcher(tmp.path(), &source, bundler.clone());

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(modified(source.join("index.ts"))).unwrap();

        let compiles = watcher
            .drive(&source, rx, std::future::ready(()), |_| {})
            .await;
        assert_eq!(compiles, 1);
        assert_eq!(bundler.runs.load(Ordering::SeqCst), 1);
        drop(tx);
    }
}
