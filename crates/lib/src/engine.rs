//! The engine: owner of the list arena, the job queue, and the shared
//! file context.
//!
//! Lists and matchers live in an arena owned here; [`crate::list::FileList`]
//! handles refer to them by index, which keeps the `prev`/`next` chain free
//! of reference cycles.

use std::path::Path;
use std::sync::{Arc, Mutex};

use sluice_core::{Matcher, Pattern};

use crate::counters::CounterSnapshot;
use crate::file::FileCtx;
use crate::list::{FileList, ListId, ListNode};
use crate::observer::Observer;
use crate::queue::AsyncQueue;
use crate::report::ConsoleReporter;
use crate::settings::{parse_ignore_file, Settings};
use crate::sink::MemorySink;
use crate::source;
use crate::watcher::WatchRegistry;

pub(crate) struct EngineInner {
  pub(crate) ctx: Arc<FileCtx>,
  pub(crate) queue: AsyncQueue,
  pub(crate) lists: Mutex<Vec<ListNode>>,
  pub(crate) roots: Mutex<Vec<ListId>>,
  pub(crate) global_matcher: Matcher,
  pub(crate) watch: Mutex<WatchRegistry>,
  pub(crate) watcher: Mutex<Option<crate::watcher::Watcher>>,
}

/// The pipeline engine. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Engine {
  pub(crate) inner: Arc<EngineInner>,
}

impl Engine {
  /// An engine with the default console reporter as observer.
  pub fn new(settings: Settings) -> Engine {
    let reporter = ConsoleReporter::new(&settings);
    Engine::with_observer(settings, Arc::new(reporter))
  }

  /// An engine with a caller-supplied observer.
  pub fn with_observer(settings: Settings, observer: Arc<dyn Observer>) -> Engine {
    let global_matcher = build_global_matcher(&settings);
    let ctx = FileCtx::new(settings, observer);
    Engine {
      inner: Arc::new(EngineInner {
        ctx,
        queue: AsyncQueue::new(),
        lists: Mutex::new(Vec::new()),
        roots: Mutex::new(Vec::new()),
        global_matcher,
        watch: Mutex::new(WatchRegistry::default()),
        watcher: Mutex::new(None),
      }),
    }
  }

  pub fn settings(&self) -> &Settings {
    &self.inner.ctx.settings
  }

  pub fn ctx(&self) -> &Arc<FileCtx> {
    &self.inner.ctx
  }

  pub fn queue(&self) -> &AsyncQueue {
    &self.inner.queue
  }

  pub fn counters(&self) -> CounterSnapshot {
    self.inner.ctx.counters.snapshot()
  }

  /// The matcher built from the `filter`/`ignore`/`ignore_file` settings.
  pub fn global_matcher(&self) -> &Matcher {
    &self.inner.global_matcher
  }

  /// The in-memory sink, present in server mode.
  pub fn sink(&self) -> Option<MemorySink> {
    self.inner.ctx.sink()
  }

  /// Open a root list over glob patterns. Discovery holds a queue lock
  /// until the root closes, so dependent jobs wait for it.
  pub fn src<I>(&self, patterns: I) -> FileList
  where
    I: IntoIterator,
    I::Item: Into<Pattern>,
  {
    let matcher = Matcher::new(self.settings().cwd.clone(), patterns);
    self.queue().lock();

    let id = self.with_lists(|lists| {
      let id = lists.len();
      lists.push(ListNode::root(matcher));
      id
    });
    self.inner.roots.lock().expect("roots lock poisoned").push(id);
    self.inner.ctx.observer.add_list("src");
    tracing::debug!(list = id, "opened root list");

    FileList::new(self.clone(), id)
  }

  /// Run source discovery for every root that has not been driven yet.
  /// Invoked by the task runner after the task body built its chains.
  pub(crate) async fn drive(&self) {
    loop {
      let next = {
        let roots = self.inner.roots.lock().expect("roots lock poisoned").clone();
        self.with_lists(|lists| {
          roots.iter().copied().find(|&id| {
            lists[id]
              .root
              .as_ref()
              .map(|root| !root.driven)
              .unwrap_or(false)
          })
        })
      };
      let Some(id) = next else { break };
      self.with_lists(|lists| {
        if let Some(root) = lists[id].root.as_mut() {
          root.driven = true;
        }
      });
      source::run_source(self, id).await;
    }
  }

  pub(crate) fn with_lists<R>(&self, f: impl FnOnce(&mut Vec<ListNode>) -> R) -> R {
    let mut lists = self.inner.lists.lock().expect("lists lock poisoned");
    f(&mut lists)
  }

  /// Root list ids in declaration order, with their matchers.
  pub(crate) fn root_lists(&self) -> Vec<(ListId, Matcher)> {
    let roots = self.inner.roots.lock().expect("roots lock poisoned").clone();
    self.with_lists(|lists| {
      roots
        .iter()
        .filter_map(|&id| lists[id].root.as_ref().map(|root| (id, root.matcher.clone())))
        .collect()
    })
  }

  /// Keep the watch session alive for the engine's lifetime. Replacing a
  /// previous session drops (and thereby stops) it.
  pub(crate) fn install_watcher(&self, watcher: crate::watcher::Watcher) {
    *self.inner.watcher.lock().expect("watcher lock poisoned") = Some(watcher);
  }

  /// Stop watching, if a watch session is active.
  pub fn stop_watching(&self) {
    if let Some(watcher) = self.inner.watcher.lock().expect("watcher lock poisoned").take() {
      watcher.shutdown();
    }
  }

  /// Record a saved file's dependency edges into the watch registry, so a
  /// change to a dep re-emits its consumers and new references get
  /// watched. Recorded on every build so watch mode starts with the edges
  /// of the initial pass.
  pub(crate) fn note_saved(&self, consumer: &Path, deps: &[std::path::PathBuf], refs: &[std::path::PathBuf]) {
    let mut watch = self.inner.watch.lock().expect("watch lock poisoned");
    watch.record_edges(consumer, deps, refs);
  }

  /// Mark a destination directory: events under it are the pipeline's
  /// own writes and never trigger rebuilds.
  pub(crate) fn note_output_dir(&self, dir: std::path::PathBuf) {
    let mut watch = self.inner.watch.lock().expect("watch lock poisoned");
    watch.note_output_dir(dir);
  }

  /// Whether `path` lies under a registered destination directory.
  /// Discovery skips such paths so a pipeline never consumes its own
  /// outputs.
  pub(crate) fn is_output_path(&self, path: &Path) -> bool {
    let watch = self.inner.watch.lock().expect("watch lock poisoned");
    watch.is_output(path)
  }
}

impl std::fmt::Debug for Engine {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Engine")
      .field("settings", self.settings())
      .field("lists", &self.with_lists(|l| l.len()))
      .finish_non_exhaustive()
  }
}

fn build_global_matcher(settings: &Settings) -> Matcher {
  let mut ignore: Vec<Pattern> = settings.ignore.clone();
  if let Some(path) = &settings.ignore_file {
    let path = sluice_core::path::resolve_path(&settings.cwd, path);
    match sluice_fs::sync::read_file_if_exists(&path, settings.tries) {
      Ok(Some(bytes)) => {
        let text = String::from_utf8_lossy(&bytes);
        ignore.extend(parse_ignore_file(&text));
      }
      Ok(None) => {
        tracing::debug!(path = %path.display(), "ignore file not present");
      }
      Err(error) => {
        tracing::warn!(path = %path.display(), error = %error, "cannot read ignore file");
      }
    }
  }
  Matcher::with_excludes(settings.cwd.clone(), settings.filter.clone(), ignore)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::observer::NoopObserver;
  use tempfile::TempDir;

  #[tokio::test]
  async fn src_holds_queue_lock_until_root_closes() {
    let tmp = TempDir::new().unwrap();
    let engine = Engine::with_observer(
      Settings::for_mode(sluice_core::BuildMode::Build, tmp.path()),
      Arc::new(NoopObserver),
    );

    let list = engine.src(["*.txt"]);
    assert_eq!(list.id(), 0);
    assert_eq!(engine.root_lists().len(), 1);

    let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
    {
      let ran = ran.clone();
      engine.queue().enqueue(async move {
        ran.store(true, std::sync::atomic::Ordering::SeqCst);
      });
    }
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));

    crate::list::close_root(&engine, list.id()).await;
    engine.queue().drained().await;
    assert!(ran.load(std::sync::atomic::Ordering::SeqCst));
  }

  #[test]
  fn global_matcher_combines_filter_and_ignore() {
    let tmp = TempDir::new().unwrap();
    let mut settings = Settings::for_mode(sluice_core::BuildMode::Build, tmp.path());
    settings.ignore = vec![Pattern::from("*.log")];
    let engine = Engine::with_observer(settings, Arc::new(NoopObserver));

    assert!(engine.global_matcher().matches(tmp.path().join("a.txt")));
    assert!(!engine.global_matcher().matches(tmp.path().join("a.log")));
  }

  #[test]
  fn ignore_file_feeds_global_matcher() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join(".sluiceignore"), "# junk\n*.tmp\n").unwrap();

    let mut settings = Settings::for_mode(sluice_core::BuildMode::Build, tmp.path());
    settings.ignore_file = Some(tmp.path().join(".sluiceignore"));
    let engine = Engine::with_observer(settings, Arc::new(NoopObserver));

    assert!(!engine.global_matcher().matches(tmp.path().join("x.tmp")));
    assert!(engine.global_matcher().matches(tmp.path().join("x.rs")));
  }
}
