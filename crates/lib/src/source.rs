//! Source discovery: walking pattern bases and seeding root lists.
//!
//! Each include pattern of a root matcher is walked from its own base.
//! Directories pass through the observer and both matchers before being
//! descended; files matching the root and global matchers become [`File`]s
//! and flow into the chain. Walk errors are reported and do not abort
//! sibling walks. When every pattern is done the root closes.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use sluice_core::LogLevel;
use sluice_fs::{walk, FileStat, WalkCaches, WalkCallbacks};

use crate::engine::Engine;
use crate::file::File;
use crate::list::{close_root, flow_file, ListId};
use crate::log::LogEntry;

pub(crate) async fn run_source(engine: &Engine, root: ListId) {
  let matcher = engine.with_lists(|lists| lists[root].root.as_ref().map(|state| state.matcher.clone()));
  let Some(matcher) = matcher else {
    close_root(engine, root).await;
    return;
  };

  let global = engine.global_matcher().clone();
  let observer = engine.ctx().observer.clone();
  let tries = engine.settings().tries;
  let caches = WalkCaches::new();

  // (pattern base, absolute path, stat) per discovered file.
  let mut discovered: Vec<(PathBuf, PathBuf, FileStat)> = Vec::new();
  let mut seen: HashSet<PathBuf> = HashSet::new();
  let mut failures: Vec<(PathBuf, String)> = Vec::new();

  let bases: Vec<PathBuf> = if matcher.includes().is_empty() {
    vec![matcher.base().to_path_buf()]
  } else {
    matcher.includes().iter().map(|p| p.base().to_path_buf()).collect()
  };

  for base in bases {
    let mut callbacks = WalkCallbacks::default();

    callbacks.on_dir = Some(Box::new(|path: &Path, entries: &[sluice_fs::DirEntry]| {
      let names: Vec<String> = entries.iter().map(|e| e.name.clone()).collect();
      observer.add_dir(path, &names);
      if engine.is_output_path(path) {
        return false;
      }
      if global.excluded(path) || matcher.excluded(path) {
        tracing::debug!(dir = %path.display(), "ignored subtree");
        return false;
      }
      matcher.could_contain_matches(path)
    }));

    {
      let base = &base;
      let seen = &mut seen;
      let discovered = &mut discovered;
      let global = &global;
      let matcher = &matcher;
      let engine = &engine;
      callbacks.on_file = Some(Box::new(move |path: &Path, stat: &FileStat| {
        if seen.contains(path) || engine.is_output_path(path) {
          return;
        }
        if !global.matches(path) || !matcher.matches(path) {
          tracing::trace!(file = %path.display(), "ignored");
          return;
        }
        seen.insert(path.to_path_buf());
        discovered.push((base.clone(), path.to_path_buf(), stat.clone()));
      }));
    }

    {
      let failures = &mut failures;
      callbacks.on_error = Some(Box::new(move |path: &Path, error: &sluice_fs::FsError| {
        if error.is_not_found() {
          // A pattern base that does not exist yet is not an error.
          tracing::debug!(path = %path.display(), "source base missing");
        } else {
          failures.push((path.to_path_buf(), error.to_string()));
        }
      }));
    }

    callbacks.on_other = Some(Box::new(|path: &Path| {
      tracing::trace!(path = %path.display(), "skipping non-regular file");
    }));

    let _ = walk(&base, tries, &mut callbacks, Some(&caches)).await;
    drop(callbacks);
  }

  for (path, message) in failures {
    engine.ctx().counters.add_error();
    let entry = LogEntry::new(LogLevel::Error, format!("source walk failed: {}", message)).with_path(&path);
    observer.file_log(&entry);
    tracing::error!(path = %path.display(), "source walk failed");
  }

  tracing::debug!(list = root, files = discovered.len(), "source discovery complete");

  for (base, path, stat) in discovered {
    let file = File::from_disk(engine.ctx().clone(), base, path, Some(stat));
    if !observer.add_file(&file) {
      tracing::debug!(file = %file.src_display(), "vetoed by observer");
      continue;
    }
    flow_file(engine, root, file).await;
  }

  close_root(engine, root).await;
}
