//! Async filesystem operations with retry and parent-directory creation.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::backpressure;
use crate::error::{classify, Failure, FsError};

/// Default retry budget for transient failures.
pub const DEFAULT_TRIES: u32 = 3;

/// Base backoff between transient retries; attempt `n` waits `n` times this.
pub(crate) const BACKOFF: Duration = Duration::from_millis(30);

/// A plain-data snapshot of `std::fs::Metadata`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
  pub len: u64,
  pub modified: Option<SystemTime>,
  pub is_dir: bool,
  pub is_file: bool,
  pub is_symlink: bool,
}

impl From<std::fs::Metadata> for FileStat {
  fn from(meta: std::fs::Metadata) -> FileStat {
    FileStat {
      len: meta.len(),
      modified: meta.modified().ok(),
      is_dir: meta.is_dir(),
      is_file: meta.is_file(),
      is_symlink: meta.file_type().is_symlink(),
    }
  }
}

/// One directory entry, as returned by [`read_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
  pub name: String,
  pub path: PathBuf,
  pub is_dir: bool,
  pub is_symlink: bool,
}

/// Run `attempt` under the retry policy: transient failures back off and
/// retry up to `tries` times, open-file exhaustion parks on the
/// backpressure queue without consuming an attempt, anything else fails
/// immediately. Completion (either way) releases one parked caller.
pub(crate) async fn with_retry<T, F, Fut>(
  op: &'static str,
  path: &Path,
  tries: u32,
  mut attempt: F,
) -> Result<T, FsError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = io::Result<T>>,
{
  let budget = tries.max(1);
  let mut used = 0;

  loop {
    match attempt().await {
      Ok(value) => {
        backpressure::release_one();
        return Ok(value);
      }
      Err(error) => match classify(&error) {
        Failure::Fatal => {
          backpressure::release_one();
          return Err(FsError::io(op, path, error));
        }
        Failure::OpenFileLimit => {
          backpressure::park_for_file_handle().await;
        }
        Failure::Transient => {
          used += 1;
          if used >= budget {
            backpressure::release_one();
            return Err(FsError::exhausted(op, path, budget, error));
          }
          tracing::debug!(op, path = %path.display(), attempt = used, "transient failure, backing off");
          tokio::time::sleep(BACKOFF * used).await;
        }
      },
    }
  }
}

/// Stat a path.
pub async fn stat(path: &Path, tries: u32) -> Result<FileStat, FsError> {
  with_retry("stat", path, tries, || async {
    tokio::fs::metadata(path).await.map(FileStat::from)
  })
  .await
}

/// Stat a path that may not exist.
pub async fn stat_if_exists(path: &Path, tries: u32) -> Result<Option<FileStat>, FsError> {
  match stat(path, tries).await {
    Ok(meta) => Ok(Some(meta)),
    Err(err) if err.is_not_found() => Ok(None),
    Err(err) => Err(err),
  }
}

/// Read a file fully.
pub async fn read_file(path: &Path, tries: u32) -> Result<Vec<u8>, FsError> {
  with_retry("read", path, tries, || tokio::fs::read(path)).await
}

/// Read a file that may not exist.
pub async fn read_file_if_exists(path: &Path, tries: u32) -> Result<Option<Vec<u8>>, FsError> {
  match read_file(path, tries).await {
    Ok(bytes) => Ok(Some(bytes)),
    Err(err) if err.is_not_found() => Ok(None),
    Err(err) => Err(err),
  }
}

/// List a directory, sorted by name.
pub async fn read_dir(path: &Path, tries: u32) -> Result<Vec<DirEntry>, FsError> {
  let mut entries = with_retry("readdir", path, tries, || async {
    let mut reader = tokio::fs::read_dir(path).await?;
    let mut out = Vec::new();
    while let Some(entry) = reader.next_entry().await? {
      let file_type = entry.file_type().await?;
      out.push(DirEntry {
        name: entry.file_name().to_string_lossy().into_owned(),
        path: entry.path(),
        is_dir: file_type.is_dir(),
        is_symlink: file_type.is_symlink(),
      });
    }
    Ok(out)
  })
  .await?;

  entries.sort_by(|a, b| a.name.cmp(&b.name));
  Ok(entries)
}

/// Write a file, creating missing parent directories on demand.
pub async fn write_file(path: &Path, bytes: &[u8], tries: u32) -> Result<(), FsError> {
  match with_retry("write", path, tries, || tokio::fs::write(path, bytes)).await {
    Err(err) if err.is_not_found() => {
      ensure_parent(path, tries).await?;
      with_retry("write", path, tries, || tokio::fs::write(path, bytes)).await
    }
    other => other,
  }
}

/// Append to a file, creating missing parent directories on demand.
pub async fn append_file(path: &Path, bytes: &[u8], tries: u32) -> Result<(), FsError> {
  async fn append_once(path: &Path, bytes: &[u8]) -> io::Result<()> {
    use tokio::io::AsyncWriteExt;
    let mut file = tokio::fs::OpenOptions::new().append(true).create(true).open(path).await?;
    file.write_all(bytes).await?;
    file.flush().await
  }

  match with_retry("append", path, tries, || append_once(path, bytes)).await {
    Err(err) if err.is_not_found() => {
      ensure_parent(path, tries).await?;
      with_retry("append", path, tries, || append_once(path, bytes)).await
    }
    other => other,
  }
}

/// Copy `from` to `to`, creating missing parent directories of `to`.
pub async fn copy_file(from: &Path, to: &Path, tries: u32) -> Result<(), FsError> {
  let attempt = || async {
    tokio::fs::copy(from, to).await?;
    Ok(())
  };
  match with_retry("copy", to, tries, attempt).await {
    Err(err) if err.is_not_found() => {
      // Only a missing destination directory is recoverable here.
      if tokio::fs::metadata(from).await.is_err() {
        return Err(err);
      }
      ensure_parent(to, tries).await?;
      with_retry("copy", to, tries, attempt).await
    }
    other => other,
  }
}

/// Rename `from` to `to`, falling back to copy + delete across devices.
pub async fn move_file(from: &Path, to: &Path, tries: u32) -> Result<(), FsError> {
  match with_retry("move", to, tries, || tokio::fs::rename(from, to)).await {
    Ok(()) => Ok(()),
    Err(first) => {
      if tokio::fs::metadata(from).await.is_err() {
        return Err(first);
      }
      copy_file(from, to, tries).await?;
      delete_file(from, tries).await
    }
  }
}

/// Delete a file.
pub async fn delete_file(path: &Path, tries: u32) -> Result<(), FsError> {
  with_retry("delete", path, tries, || tokio::fs::remove_file(path)).await
}

/// Delete a file that may already be gone.
pub async fn delete_file_if_exists(path: &Path, tries: u32) -> Result<bool, FsError> {
  match delete_file(path, tries).await {
    Ok(()) => Ok(true),
    Err(err) if err.is_not_found() => Ok(false),
    Err(err) => Err(err),
  }
}

/// Create a directory and any missing ancestors.
pub async fn create_dir(path: &Path, tries: u32) -> Result<(), FsError> {
  with_retry("mkdir", path, tries, || tokio::fs::create_dir_all(path)).await
}

/// Delete a directory tree.
pub async fn delete_dir(path: &Path, tries: u32) -> Result<(), FsError> {
  with_retry("rmdir", path, tries, || tokio::fs::remove_dir_all(path)).await
}

/// Remove empty directories upward from `dir`, stopping at the first
/// non-empty one (or at `stop`, exclusive, when given).
pub async fn prune_empty_parents(dir: &Path, stop: Option<&Path>) -> Result<(), FsError> {
  let mut current = Some(dir.to_path_buf());
  while let Some(path) = current {
    if let Some(stop) = stop {
      if path == stop {
        break;
      }
    }
    if tokio::fs::remove_dir(&path).await.is_err() {
      break;
    }
    backpressure::release_one();
    current = path.parent().map(Path::to_path_buf);
  }
  Ok(())
}

async fn ensure_parent(path: &Path, tries: u32) -> Result<(), FsError> {
  match path.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => create_dir(parent, tries).await,
    _ => Ok(()),
  }
}
