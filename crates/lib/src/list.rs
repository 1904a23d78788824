//! File lists: the nodes of a pipeline chain, and the file flow through
//! them.
//!
//! A chain starts at a root list produced by [`crate::engine::Engine::src`]
//! and grows rightward through `pipe` and its sugar. Files flow through
//! each stage's `add` hook; when a stage's pending work reaches zero and
//! its upstream has ended, its `after` and `end` hooks run and the end
//! propagates downstream. A closed chain is re-opened by the watcher
//! re-seeding files through the root.

use std::path::PathBuf;
use std::sync::Arc;

use sluice_core::{BuildMode, Matcher, Pattern};

use crate::engine::Engine;
use crate::file::{File, SaveOutcome};
use crate::processor::{AddFn, BoxFuture, ProcessError, Processor};

pub type ListId = usize;

pub(crate) struct RootState {
  pub(crate) matcher: Matcher,
  pub(crate) driven: bool,
  pub(crate) lock_held: bool,
}

pub(crate) struct ListNode {
  pub(crate) name: String,
  pub(crate) prev: Option<ListId>,
  pub(crate) next: Option<ListId>,
  pub(crate) processor: Option<Arc<Processor>>,
  /// In-flight `add` calls on this stage.
  pub(crate) pending: usize,
  /// The upstream stage has ended (the root's discovery sentinel).
  pub(crate) upstream_ended: bool,
  pub(crate) ended: bool,
  /// Whether the `before` hook has run for the current pass.
  pub(crate) started: bool,
  /// Collected clones, keyed by source identity, in arrival order.
  pub(crate) collected: Vec<(String, File)>,
  pub(crate) root: Option<RootState>,
}

impl ListNode {
  pub(crate) fn root(matcher: Matcher) -> ListNode {
    ListNode {
      name: "src".to_string(),
      prev: None,
      next: None,
      processor: None,
      pending: 0,
      upstream_ended: false,
      ended: false,
      started: false,
      collected: Vec::new(),
      root: Some(RootState {
        matcher,
        driven: false,
        lock_held: true,
      }),
    }
  }

  fn stage(name: String, prev: ListId, processor: Arc<Processor>) -> ListNode {
    ListNode {
      name,
      prev: Some(prev),
      next: None,
      processor: Some(processor),
      pending: 0,
      upstream_ended: false,
      ended: false,
      started: false,
      collected: Vec::new(),
      root: None,
    }
  }
}

/// A handle to one list in a pipeline chain.
#[derive(Clone)]
pub struct FileList {
  engine: Engine,
  id: ListId,
}

impl FileList {
  pub(crate) fn new(engine: Engine, id: ListId) -> FileList {
    FileList { engine, id }
  }

  pub fn id(&self) -> ListId {
    self.id
  }

  pub fn engine(&self) -> &Engine {
    &self.engine
  }

  /// Append a processor stage at the result end of this chain.
  pub fn pipe(&self, processor: Processor) -> FileList {
    let processor = Arc::new(processor);
    let id = self.engine.with_lists(|lists| {
      // `pipe` always extends the chain's tail, even when called on an
      // earlier handle.
      let mut tail = self.id;
      while let Some(next) = lists[tail].next {
        tail = next;
      }
      let id = lists.len();
      lists.push(ListNode::stage(processor.name.clone(), tail, processor.clone()));
      lists[tail].next = Some(id);
      id
    });
    self.engine.ctx().observer.add_list(&processor.name);
    tracing::debug!(list = id, stage = %processor.name, "piped");
    let list = FileList::new(self.engine.clone(), id);
    if let Some(init) = &processor.init {
      init(&list);
    }
    list
  }

  /// Save every file into `dir`. Save failures are recorded against the
  /// file; the pipeline continues.
  pub fn dest(&self, dir: impl Into<PathBuf>) -> FileList {
    let dir = dir.into();
    let engine = self.engine.clone();
    engine.note_output_dir(sluice_core::path::resolve_path(
      &engine.settings().cwd,
      &dir,
    ));
    let processor = Processor::named("dest").async_add(move |file: &mut File| {
      let dir = dir.clone();
      let engine = engine.clone();
      Box::pin(async move {
        match file.save(Some(&dir)).await {
          // Only saves that actually produced (or counted) output feed
          // the dependency map; vetoed, refused, and skipped saves must
          // not register edges for destinations that were never written.
          Ok(SaveOutcome::Written) | Ok(SaveOutcome::Previewed) => {
            // Consumers are keyed by source path: that is what a rebuild
            // re-seeds through the root matchers.
            let consumer = file
              .initial_path()
              .map(std::path::Path::to_path_buf)
              .unwrap_or_else(|| file.dest_path());
            engine.note_saved(&consumer, file.deps(), file.refs());
          }
          Ok(_) => {}
          Err(error) => {
            file.error_with(format!("cannot save to {}", dir.display()), &error);
          }
        }
        Ok(true)
      }) as BoxFuture<'_, Result<bool, ProcessError>>
    });
    self.pipe(processor)
  }

  /// Delete every file's source from disk (generated files pass through
  /// untouched).
  pub fn delete(&self) -> FileList {
    let processor = Processor::named("delete").async_add(|file: &mut File| {
      Box::pin(async move {
        if let Err(error) = file.delete(true).await {
          file.error_with("cannot delete", &error);
        }
        Ok(true)
      }) as BoxFuture<'_, Result<bool, ProcessError>>
    });
    self.pipe(processor)
  }

  /// Forward only files whose destination path matches `patterns`.
  pub fn filter<I>(&self, patterns: I) -> FileList
  where
    I: IntoIterator,
    I::Item: Into<Pattern>,
  {
    let matcher = Matcher::new(self.engine.settings().cwd.clone(), patterns);
    let processor =
      Processor::named("filter").sync_add(move |file: &mut File| Ok(matcher.matches(file.dest_path())));
    self.pipe(processor)
  }

  /// A collecting passthrough stage: retains a stable clone of every file
  /// so watch-mode rebuilds of downstream batches see the full set.
  pub fn duplicate(&self) -> FileList {
    self.pipe(Processor::named("duplicate").collecting())
  }

  /// Run `f` once this stage's upstream has fully ended.
  pub fn then<F>(&self, f: F) -> FileList
  where
    F: Fn() + Send + Sync + 'static,
  {
    let f = Arc::new(f);
    let processor = Processor::named("then").on_end(move |_files| {
      let f = f.clone();
      Box::pin(async move {
        f();
        Ok(Vec::new())
      }) as BoxFuture<'static, Result<Vec<File>, ProcessError>>
    });
    self.pipe(processor)
  }

  /// Async variant of [`FileList::then`].
  pub fn then_async<F>(&self, f: F) -> FileList
  where
    F: Fn() -> BoxFuture<'static, Result<(), ProcessError>> + Send + Sync + 'static,
  {
    let f = Arc::new(f);
    let processor = Processor::named("then").on_end(move |_files| {
      let f = f.clone();
      Box::pin(async move {
        f().await?;
        Ok(Vec::new())
      }) as BoxFuture<'static, Result<Vec<File>, ProcessError>>
    });
    self.pipe(processor)
  }
}

impl std::fmt::Debug for FileList {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("FileList").field("id", &self.id).finish()
  }
}

fn collect_key(file: &File) -> String {
  match file.initial_path() {
    Some(path) => path.to_string_lossy().into_owned(),
    None => format!("<generated>:{}", file.name().unwrap_or_default()),
  }
}

/// Run the `before` hook once per pass.
async fn ensure_before(engine: &Engine, id: ListId, processor: &Option<Arc<Processor>>) {
  let run = engine.with_lists(|lists| {
    let node = &mut lists[id];
    if node.started {
      false
    } else {
      node.started = true;
      true
    }
  });
  if !run {
    return;
  }
  if let Some(processor) = processor {
    if let Some(before) = &processor.before {
      if let Err(error) = before().await {
        engine.ctx().counters.add_error();
        tracing::error!(stage = %processor.name, error = %error, "'before' hook failed");
      }
    }
  }
}

/// Push one file through the chain starting at `start`. The file moves
/// stage by stage until a hook suppresses it or the chain ends.
pub(crate) async fn flow_file(engine: &Engine, start: ListId, mut file: File) {
  let mut current = Some(start);

  while let Some(id) = current {
    let (processor, next) = engine.with_lists(|lists| {
      let node = &mut lists[id];
      node.pending += 1;
      (node.processor.clone(), node.next)
    });

    ensure_before(engine, id, &processor).await;

    let mut keep = true;
    if let Some(processor) = &processor {
      if processor.load {
        file.load().await;
      }

      match &processor.add {
        Some(AddFn::Sync(f)) => match f(&mut file) {
          Ok(k) => keep = k,
          Err(error) => {
            file.error_with(format!("processor '{}' failed", processor.name), &error);
          }
        },
        Some(AddFn::Async(f)) => match f(&mut file).await {
          Ok(k) => keep = k,
          Err(error) => {
            file.error_with(format!("processor '{}' failed", processor.name), &error);
          }
        },
        None => {}
      }

      if processor.collect {
        let key = collect_key(&file);
        let cleaning = file.mode() == BuildMode::Clean;
        engine.with_lists(|lists| {
          let node = &mut lists[id];
          if cleaning {
            node.collected.retain(|(k, _)| k != &key);
          } else if let Some(slot) = node.collected.iter_mut().find(|(k, _)| k == &key) {
            slot.1 = file.clone();
          } else {
            node.collected.push((key, file.clone()));
          }
        });
      }
    }

    engine.with_lists(|lists| {
      lists[id].pending = lists[id].pending.saturating_sub(1);
    });

    current = if keep { next } else { None };
  }
}

/// Finish one stage: `before` (if it never saw a file), `after`, then
/// `end` with the collected batch; files returned by `end` flow on
/// downstream. Returns `false` when a batch `end` failed, which aborts
/// the stages beyond this list.
async fn finish_stage(engine: &Engine, id: ListId) -> bool {
  let processor = engine.with_lists(|lists| lists[id].processor.clone());

  ensure_before(engine, id, &processor).await;

  let mut ok = true;
  if let Some(processor) = &processor {
    if let Some(after) = &processor.after {
      if let Err(error) = after().await {
        engine.ctx().counters.add_error();
        tracing::error!(stage = %processor.name, error = %error, "'after' hook failed");
      }
    }

    if let Some(end) = &processor.end {
      let batch: Vec<File> = if processor.collect {
        engine.with_lists(|lists| lists[id].collected.iter().map(|(_, file)| file.clone()).collect())
      } else {
        Vec::new()
      };

      match end(batch).await {
        Ok(files) => {
          let next = engine.with_lists(|lists| lists[id].next);
          if let Some(next) = next {
            for file in files {
              flow_file(engine, next, file).await;
            }
          }
        }
        Err(error) => {
          engine.ctx().counters.add_error();
          tracing::error!(stage = %processor.name, error = %error, "'end' hook failed, aborting downstream");
          ok = false;
        }
      }
    }
  }

  engine.with_lists(|lists| {
    lists[id].ended = true;
  });
  ok
}

/// Propagate end-of-stream from `from` rightward while stages are ready.
pub(crate) async fn finish_cascade(engine: &Engine, from: ListId) {
  engine.with_lists(|lists| {
    lists[from].upstream_ended = true;
  });

  let mut current = Some(from);
  while let Some(id) = current {
    let ready = engine.with_lists(|lists| {
      let node = &lists[id];
      node.upstream_ended && node.pending == 0 && !node.ended
    });
    if !ready {
      break;
    }

    let ok = finish_stage(engine, id).await;
    let next = engine.with_lists(|lists| lists[id].next);
    if !ok {
      break;
    }
    if let Some(next) = next {
      engine.with_lists(|lists| {
        lists[next].upstream_ended = true;
      });
    }
    current = next;
  }
}

/// Close a root list: cascade the end through the chain and release the
/// discovery lock.
pub(crate) async fn close_root(engine: &Engine, root: ListId) {
  finish_cascade(engine, root).await;

  let had_lock = engine.with_lists(|lists| match lists[root].root.as_mut() {
    Some(state) if state.lock_held => {
      state.lock_held = false;
      true
    }
    _ => false,
  });
  if had_lock {
    engine.queue().unlock();
  }
  tracing::debug!(list = root, "root closed");
}

/// Re-open a closed chain for a watch rebuild: every stage may run again.
/// Collected buffers survive so batches stay complete.
pub(crate) fn reopen_chain(engine: &Engine, root: ListId) {
  let need_lock = engine.with_lists(|lists| {
    let mut current = Some(root);
    while let Some(id) = current {
      let node = &mut lists[id];
      node.ended = false;
      node.upstream_ended = false;
      node.started = false;
      current = node.next;
    }
    match lists[root].root.as_mut() {
      Some(state) if !state.lock_held => {
        state.lock_held = true;
        true
      }
      _ => false,
    }
  });
  if need_lock {
    engine.queue().lock();
  }
}

/// Whether any stage downstream of `root` collects. Such chains are
/// rebuilt from a full re-walk, never from partial re-emission.
pub(crate) fn chain_has_collector(engine: &Engine, root: ListId) -> bool {
  engine.with_lists(|lists| {
    let mut current = lists[root].next;
    while let Some(id) = current {
      if lists[id].processor.as_ref().map(|p| p.collect).unwrap_or(false) {
        return true;
      }
      current = lists[id].next;
    }
    false
  })
}
