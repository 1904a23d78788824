//! Depth-first directory walking with pruning and request deduplication.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};

use crate::error::FsError;
use crate::ops::{self, DirEntry, FileStat};

/// Walk callbacks. Every hook is optional; `on_dir` may return `false` to
/// prune the subtree. Errors are reported per path and do not abort
/// sibling subtrees; the walk future resolving is the end signal.
#[derive(Default)]
pub struct WalkCallbacks<'a> {
  pub on_dir: Option<Box<dyn FnMut(&Path, &[DirEntry]) -> bool + Send + 'a>>,
  pub on_file: Option<Box<dyn FnMut(&Path, &FileStat) + Send + 'a>>,
  pub on_other: Option<Box<dyn FnMut(&Path) + Send + 'a>>,
  pub on_error: Option<Box<dyn FnMut(&Path, &FsError) + Send + 'a>>,
}

impl<'a> WalkCallbacks<'a> {
  fn dir(&mut self, path: &Path, entries: &[DirEntry]) -> bool {
    match &mut self.on_dir {
      Some(hook) => hook(path, entries),
      None => true,
    }
  }

  fn file(&mut self, path: &Path, stat: &FileStat) {
    if let Some(hook) = &mut self.on_file {
      hook(path, stat);
    }
  }

  fn other(&mut self, path: &Path) {
    if let Some(hook) = &mut self.on_other {
      hook(path);
    }
  }

  fn error(&mut self, path: &Path, error: &FsError) {
    if let Some(hook) = &mut self.on_error {
      hook(path, error);
    }
  }
}

/// Shared caches deduplicating stat/readdir requests across concurrent
/// walks: the first caller issues the request, later callers wait on the
/// same cell. Failures are not cached.
#[derive(Default)]
pub struct WalkCaches {
  stats: Mutex<HashMap<PathBuf, Arc<OnceCell<Option<FileStat>>>>>,
  dirs: Mutex<HashMap<PathBuf, Arc<OnceCell<Arc<Vec<DirEntry>>>>>>,
}

impl WalkCaches {
  pub fn new() -> WalkCaches {
    WalkCaches::default()
  }

  async fn stat(&self, path: &Path, tries: u32) -> Result<Option<FileStat>, FsError> {
    let cell = {
      let mut map = self.stats.lock().await;
      map.entry(path.to_path_buf()).or_default().clone()
    };
    cell
      .get_or_try_init(|| ops::stat_if_exists(path, tries))
      .await
      .map(|value| value.clone())
  }

  async fn read_dir(&self, path: &Path, tries: u32) -> Result<Arc<Vec<DirEntry>>, FsError> {
    let cell = {
      let mut map = self.dirs.lock().await;
      map.entry(path.to_path_buf()).or_default().clone()
    };
    cell
      .get_or_try_init(|| async { ops::read_dir(path, tries).await.map(Arc::new) })
      .await
      .map(|value| value.clone())
  }
}

async fn stat_via(caches: Option<&WalkCaches>, path: &Path, tries: u32) -> Result<Option<FileStat>, FsError> {
  match caches {
    Some(caches) => caches.stat(path, tries).await,
    None => ops::stat_if_exists(path, tries).await,
  }
}

async fn read_dir_via(caches: Option<&WalkCaches>, path: &Path, tries: u32) -> Result<Arc<Vec<DirEntry>>, FsError> {
  match caches {
    Some(caches) => caches.read_dir(path, tries).await,
    None => ops::read_dir(path, tries).await.map(Arc::new),
  }
}

/// Walk `root` depth-first. A file root fires `on_file` once; a missing
/// root fires `on_error`.
pub async fn walk(
  root: &Path,
  tries: u32,
  callbacks: &mut WalkCallbacks<'_>,
  caches: Option<&WalkCaches>,
) -> Result<(), FsError> {
  match stat_via(caches, root, tries).await {
    Ok(Some(stat)) if stat.is_dir => {
      walk_dir(root.to_path_buf(), tries, callbacks, caches).await;
      Ok(())
    }
    Ok(Some(stat)) if stat.is_file => {
      callbacks.file(root, &stat);
      Ok(())
    }
    Ok(Some(_)) => {
      callbacks.other(root);
      Ok(())
    }
    Ok(None) => {
      let error = FsError::io(
        "walk",
        root,
        std::io::Error::new(std::io::ErrorKind::NotFound, "walk root does not exist"),
      );
      callbacks.error(root, &error);
      Ok(())
    }
    Err(error) => {
      callbacks.error(root, &error);
      Err(error)
    }
  }
}

fn walk_dir<'a, 'b>(
  path: PathBuf,
  tries: u32,
  callbacks: &'a mut WalkCallbacks<'b>,
  caches: Option<&'a WalkCaches>,
) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>
where
  'b: 'a,
{
  Box::pin(async move {
    let entries = match read_dir_via(caches, &path, tries).await {
      Ok(entries) => entries,
      Err(error) => {
        callbacks.error(&path, &error);
        return;
      }
    };

    if !callbacks.dir(&path, &entries) {
      return;
    }

    for entry in entries.iter() {
      if entry.is_dir {
        walk_dir(entry.path.clone(), tries, callbacks, caches).await;
        continue;
      }
      match stat_via(caches, &entry.path, tries).await {
        Ok(Some(stat)) if stat.is_file => callbacks.file(&entry.path, &stat),
        Ok(Some(_)) => callbacks.other(&entry.path),
        // Raced away between readdir and stat.
        Ok(None) => {}
        Err(error) => callbacks.error(&entry.path, &error),
      }
    }
  })
}
