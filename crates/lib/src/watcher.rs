//! Filesystem watching and incremental rebuilds.
//!
//! The watcher wraps the platform backend (via `notify`), bridging its
//! callback thread into the async engine over a channel. Raw events are
//! debounced into a batch, then every pending path is re-checked against
//! a state cache: files by modification time, directories by entry-list
//! diff. Deletes win over changes only when the final stat really is
//! gone. Marked paths propagate through user-declared dependency edges,
//! and each affected root list is re-seeded and closed again, driving the
//! pipeline through another pass.
//!
//! A chain that contains a collecting stage cannot be updated one file at
//! a time (the batch would be incomplete), so such roots are re-walked in
//! full on any relevant change.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use notify::{RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use thiserror::Error;
use tokio::sync::mpsc;

use sluice_core::path::in_dir;
use sluice_core::{BuildMode, Matcher};

use crate::engine::Engine;
use crate::file::File;
use crate::list::{chain_has_collector, close_root, flow_file, reopen_chain, ListId};
use crate::report;

/// Errors from the watch backend. These are fatal: without watches there
/// is nothing for watch mode to do.
#[derive(Debug, Error)]
pub enum WatchError {
  #[error("watch backend error: {0}")]
  Backend(#[from] notify::Error),
}

/// File names the watcher never reacts to: editor swap files and OS
/// droppings.
fn builtin_ignored(path: &Path) -> bool {
  let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
    return false;
  };
  name == ".DS_Store"
    || name == "Thumbs.db"
    || name == "desktop.ini"
    || name == "4913"
    || name.ends_with('~')
    || name.ends_with(".swp")
    || name.ends_with(".swx")
    || name.starts_with(".#")
}

/// Watch-mode state owned by the engine: the filesystem snapshot, the
/// dependency map, and bookkeeping for dynamically added watches.
#[derive(Default)]
pub(crate) struct WatchRegistry {
  pub(crate) active: bool,
  file_mtimes: HashMap<PathBuf, Option<SystemTime>>,
  dir_entries: HashMap<PathBuf, Vec<String>>,
  /// Consumer source path -> the paths whose changes invalidate it.
  deps: HashMap<PathBuf, Vec<PathBuf>>,
  watched_roots: Vec<PathBuf>,
  pending_watch_dirs: Vec<PathBuf>,
  /// Destination directories of `dest` stages. Events under them are the
  /// pipeline's own writes, never rebuild triggers.
  output_dirs: Vec<PathBuf>,
}

impl WatchRegistry {
  fn covers(&self, path: &Path) -> bool {
    self.watched_roots.iter().any(|root| in_dir(root, path))
  }

  pub(crate) fn is_output(&self, path: &Path) -> bool {
    self.output_dirs.iter().any(|dir| in_dir(dir, path))
  }

  pub(crate) fn note_output_dir(&mut self, dir: PathBuf) {
    if !self.output_dirs.contains(&dir) {
      self.output_dirs.push(dir);
    }
  }

  /// Update the dependency map from a saved file and, once watching is
  /// active, queue watches for edges outside the current watch roots.
  pub(crate) fn record_edges(&mut self, consumer: &Path, deps: &[PathBuf], refs: &[PathBuf]) {
    if deps.is_empty() {
      self.deps.remove(consumer);
    } else {
      self.deps.insert(consumer.to_path_buf(), deps.to_vec());
    }
    if !self.active {
      return;
    }
    for edge in deps.iter().chain(refs.iter()) {
      if !self.covers(edge) {
        if let Some(parent) = edge.parent() {
          let parent = parent.to_path_buf();
          if !self.pending_watch_dirs.contains(&parent) {
            self.pending_watch_dirs.push(parent);
          }
        }
      }
    }
  }

  fn record_file(&mut self, path: PathBuf, mtime: Option<SystemTime>) {
    self.file_mtimes.insert(path, mtime);
  }

  fn record_dir(&mut self, path: PathBuf, entries: Vec<String>) {
    self.dir_entries.insert(path, entries);
  }

  #[cfg(test)]
  pub(crate) fn tracked_files(&self) -> usize {
    self.file_mtimes.len()
  }
}

/// The classified result of one debounce window.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ChangeSet {
  pub changed: BTreeSet<PathBuf>,
  pub deleted: BTreeSet<PathBuf>,
}

impl ChangeSet {
  pub(crate) fn is_empty(&self) -> bool {
    self.changed.is_empty() && self.deleted.is_empty()
  }
}

/// A running watch session. Dropping it stops watching.
pub struct Watcher {
  handle: tokio::task::JoinHandle<()>,
}

impl Watcher {
  /// Start watching every root list's base directory. Call after the
  /// first build so the roots exist and the snapshot can be primed.
  pub async fn start(engine: Engine) -> Result<Watcher, WatchError> {
    let roots = watch_roots(&engine);
    for root in &roots {
      prime(&engine, root).await;
    }
    {
      let mut registry = engine.inner.watch.lock().expect("watch lock poisoned");
      registry.active = true;
      registry.watched_roots = roots.clone();
    }

    let (tx, rx) = mpsc::channel::<PathBuf>(1024);
    let mut backend = notify::recommended_watcher(move |result: Result<notify::Event, notify::Error>| {
      match result {
        Ok(event) => {
          for path in event.paths {
            if builtin_ignored(&path) {
              continue;
            }
            // The receiver draining too slowly just coalesces bursts.
            if tx.blocking_send(path).is_err() {
              break;
            }
          }
        }
        Err(error) => {
          tracing::warn!(error = %error, "watch backend reported an error");
        }
      }
    })?;

    for root in &roots {
      backend.watch(root, RecursiveMode::Recursive)?;
      tracing::info!(root = %root.display(), "watching");
    }

    let handle = tokio::spawn(watch_loop(engine, backend, rx));
    Ok(Watcher { handle })
  }

  /// Stop watching.
  pub fn shutdown(self) {
    self.handle.abort();
  }
}

impl Drop for Watcher {
  fn drop(&mut self) {
    self.handle.abort();
  }
}

/// Deduplicated base directories of every root list that exists on disk.
fn watch_roots(engine: &Engine) -> Vec<PathBuf> {
  let mut roots: Vec<PathBuf> = Vec::new();
  for (_, matcher) in engine.root_lists() {
    let base = matcher.base().to_path_buf();
    let base = if base.is_dir() {
      base
    } else {
      match base.parent() {
        Some(parent) if parent.is_dir() => parent.to_path_buf(),
        _ => continue,
      }
    };
    if !roots.iter().any(|r| in_dir(r, &base)) {
      roots.retain(|r| !in_dir(&base, r));
      roots.push(base);
    }
  }
  roots
}

/// Record the current on-disk state under `root` so later events can be
/// classified by diffing.
async fn prime(engine: &Engine, root: &Path) {
  let tries = engine.settings().tries;
  let mut files: Vec<(PathBuf, Option<SystemTime>)> = Vec::new();
  let mut dirs: Vec<(PathBuf, Vec<String>)> = Vec::new();

  {
    let mut callbacks = sluice_fs::WalkCallbacks::default();
    {
      let files = &mut files;
      callbacks.on_file = Some(Box::new(move |path: &Path, stat: &sluice_fs::FileStat| {
        files.push((path.to_path_buf(), stat.modified));
      }));
    }
    {
      let dirs = &mut dirs;
      callbacks.on_dir = Some(Box::new(move |path: &Path, entries: &[sluice_fs::DirEntry]| {
        dirs.push((path.to_path_buf(), entries.iter().map(|e| e.name.clone()).collect()));
        true
      }));
    }
    let _ = sluice_fs::walk(root, tries, &mut callbacks, None).await;
  }

  let mut registry = engine.inner.watch.lock().expect("watch lock poisoned");
  for (path, mtime) in files {
    registry.record_file(path, mtime);
  }
  for (path, entries) in dirs {
    registry.record_dir(path, entries);
  }
}

async fn watch_loop(engine: Engine, mut backend: RecommendedWatcher, mut rx: mpsc::Receiver<PathBuf>) {
  let debounce = engine.settings().debounce;

  loop {
    let Some(first) = rx.recv().await else {
      return;
    };

    let mut pending: BTreeSet<PathBuf> = BTreeSet::new();
    pending.insert(first);

    // Collapse the burst: keep collecting until the window closes.
    let deadline = tokio::time::Instant::now() + debounce;
    loop {
      match tokio::time::timeout_at(deadline, rx.recv()).await {
        Ok(Some(path)) => {
          pending.insert(path);
        }
        Ok(None) => return,
        Err(_) => break,
      }
    }

    // Pick up watches for dependency edges outside the roots.
    let new_dirs: Vec<PathBuf> = {
      let mut registry = engine.inner.watch.lock().expect("watch lock poisoned");
      std::mem::take(&mut registry.pending_watch_dirs)
    };
    for dir in new_dirs {
      if let Err(error) = backend.watch(&dir, RecursiveMode::NonRecursive) {
        tracing::warn!(dir = %dir.display(), error = %error, "cannot watch dependency directory");
      }
    }

    // Hold the queue while classifying so a running drain does not race
    // the snapshot update.
    engine.queue().lock();
    let changes = classify_batch(&engine, pending).await;
    engine.queue().unlock();

    if changes.is_empty() {
      continue;
    }
    tracing::info!(
      changed = changes.changed.len(),
      deleted = changes.deleted.len(),
      "rebuilding"
    );
    schedule_rebuild(&engine, changes);
  }
}

/// Re-check every pending path against the snapshot.
pub(crate) async fn classify_batch(engine: &Engine, pending: BTreeSet<PathBuf>) -> ChangeSet {
  let tries = engine.settings().tries;
  let mut out = ChangeSet::default();

  for path in pending {
    {
      let registry = engine.inner.watch.lock().expect("watch lock poisoned");
      if registry.is_output(&path) {
        continue;
      }
    }
    match sluice_fs::stat_if_exists(&path, tries).await {
      Ok(None) | Err(_) => {
        let mut registry = engine.inner.watch.lock().expect("watch lock poisoned");
        mark_deleted(&mut registry, &path, &mut out);
      }
      Ok(Some(stat)) if stat.is_file => {
        let mut registry = engine.inner.watch.lock().expect("watch lock poisoned");
        let known = registry.file_mtimes.get(&path).cloned();
        if known != Some(stat.modified) {
          registry.record_file(path.clone(), stat.modified);
          out.changed.insert(path);
        }
      }
      Ok(Some(stat)) if stat.is_dir => {
        diff_dir(engine, &path, &mut out).await;
      }
      Ok(Some(_)) => {}
    }
  }

  // A path both marked and recreated within the window: delete wins only
  // when the final stat really is gone.
  let conflicted: Vec<PathBuf> = out.changed.intersection(&out.deleted).cloned().collect();
  for path in conflicted {
    match sluice_fs::stat_if_exists(&path, tries).await {
      Ok(Some(_)) => {
        out.deleted.remove(&path);
      }
      _ => {
        out.changed.remove(&path);
      }
    }
  }

  propagate_deps(engine, &mut out);
  out
}

/// Mark a path deleted, along with every tracked descendant.
fn mark_deleted(registry: &mut WatchRegistry, path: &Path, out: &mut ChangeSet) {
  let was_dir = registry.dir_entries.contains_key(path);

  let files: Vec<PathBuf> = registry
    .file_mtimes
    .keys()
    .filter(|known| in_dir(path, known))
    .cloned()
    .collect();
  for file in files {
    registry.file_mtimes.remove(&file);
    out.deleted.insert(file);
  }

  let dirs: Vec<PathBuf> = registry
    .dir_entries
    .keys()
    .filter(|known| in_dir(path, known))
    .cloned()
    .collect();
  for dir in dirs {
    registry.dir_entries.remove(&dir);
  }

  if !was_dir {
    out.deleted.insert(path.to_path_buf());
  }
}

/// Diff a directory's entry list against the snapshot: entries only in
/// the snapshot become deletes, new entries become changes (recursively
/// for new subdirectories).
async fn diff_dir(engine: &Engine, dir: &Path, out: &mut ChangeSet) {
  let tries = engine.settings().tries;
  let mut stack: Vec<PathBuf> = vec![dir.to_path_buf()];

  while let Some(current) = stack.pop() {
    let entries = match sluice_fs::read_dir(&current, tries).await {
      Ok(entries) => entries,
      Err(_) => continue,
    };
    let names: Vec<String> = entries.iter().map(|e| e.name.clone()).collect();

    let old: Vec<String> = {
      let mut registry = engine.inner.watch.lock().expect("watch lock poisoned");
      registry.dir_entries.insert(current.clone(), names.clone()).unwrap_or_default()
    };

    for name in old.iter().filter(|name| !names.contains(name)) {
      let gone = current.join(name);
      let mut registry = engine.inner.watch.lock().expect("watch lock poisoned");
      mark_deleted(&mut registry, &gone, out);
    }

    for entry in entries.iter().filter(|e| !old.contains(&e.name)) {
      let skip = {
        let registry = engine.inner.watch.lock().expect("watch lock poisoned");
        registry.is_output(&entry.path)
      };
      if skip {
        continue;
      }
      if entry.is_dir {
        stack.push(entry.path.clone());
      } else {
        let stat = sluice_fs::stat_if_exists(&entry.path, tries).await.ok().flatten();
        let mtime = stat.and_then(|s| s.modified);
        let mut registry = engine.inner.watch.lock().expect("watch lock poisoned");
        registry.record_file(entry.path.clone(), mtime);
        out.changed.insert(entry.path.clone());
      }
    }
  }
}

/// Mark every consumer whose declared deps intersect the marked paths.
fn propagate_deps(engine: &Engine, out: &mut ChangeSet) {
  let registry = engine.inner.watch.lock().expect("watch lock poisoned");
  let mut extra: Vec<PathBuf> = Vec::new();
  for (consumer, deps) in registry.deps.iter() {
    let hit = deps
      .iter()
      .any(|dep| out.changed.contains(dep) || out.deleted.contains(dep));
    if hit && !out.deleted.contains(consumer) {
      extra.push(consumer.clone());
    }
  }
  for consumer in extra {
    out.changed.insert(consumer);
  }
}

fn schedule_rebuild(engine: &Engine, changes: ChangeSet) {
  let engine_job = engine.clone();
  engine.queue().enqueue(async move {
    rebuild(engine_job, changes).await;
  });
}

/// Re-seed affected root lists and drive the pipeline again.
async fn rebuild(engine: Engine, changes: ChangeSet) {
  let started = std::time::Instant::now();
  engine.ctx().counters.reset();

  for (root_id, matcher) in engine.root_lists() {
    let changed: Vec<PathBuf> = changes.changed.iter().filter(|p| matcher.matches(p)).cloned().collect();
    let deleted: Vec<PathBuf> = changes.deleted.iter().filter(|p| matcher.matches(p)).cloned().collect();
    if changed.is_empty() && deleted.is_empty() {
      continue;
    }

    tracing::debug!(list = root_id, changed = changed.len(), deleted = deleted.len(), "re-seeding root");
    reopen_chain(&engine, root_id);

    seed_deleted(&engine, root_id, &matcher, &deleted).await;

    if chain_has_collector(&engine, root_id) {
      // Collected stages need the full batch, not a partial update: the
      // root is re-walked from scratch. `run_source` closes it.
      crate::source::run_source(&engine, root_id).await;
    } else {
      for path in changed {
        let base = base_for(&matcher, &path);
        let file = File::from_disk(engine.ctx().clone(), base, path, None);
        if !engine.ctx().observer.add_file(&file) {
          continue;
        }
        flow_file(&engine, root_id, file).await;
      }
      close_root(&engine, root_id).await;
    }
  }

  let snapshot = engine.counters();
  report::print_rebuild_summary(engine.settings(), &snapshot, started.elapsed());
}

async fn seed_deleted(engine: &Engine, root_id: ListId, matcher: &Matcher, deleted: &[PathBuf]) {
  for path in deleted {
    let base = base_for(matcher, path);
    let mut file = File::from_disk(engine.ctx().clone(), base, path.clone(), None);
    file.set_mode_override(Some(BuildMode::Clean));
    flow_file(engine, root_id, file).await;
  }
}

/// The base of the first include pattern matching `path`, anchoring the
/// re-seeded file's logical name the same way discovery would have.
fn base_for(matcher: &Matcher, path: &Path) -> PathBuf {
  matcher
    .includes()
    .iter()
    .find(|pattern| pattern.matches(path))
    .map(|pattern| pattern.base().to_path_buf())
    .unwrap_or_else(|| matcher.base().to_path_buf())
}
