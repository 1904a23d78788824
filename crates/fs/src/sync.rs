//! Sync twins of the async operations, sharing the retry policy.
//!
//! These exist for callers outside an async context (tests, setup code,
//! drop paths). Parked callers cannot await here, so the open-file case
//! degrades to a plain sleep before retrying.

use std::io;
use std::path::Path;

use crate::backpressure;
use crate::error::{classify, Failure, FsError};
use crate::ops::{DirEntry, FileStat, BACKOFF};

fn with_retry_sync<T, F>(op: &'static str, path: &Path, tries: u32, mut attempt: F) -> Result<T, FsError>
where
  F: FnMut() -> io::Result<T>,
{
  let budget = tries.max(1);
  let mut used = 0;

  loop {
    match attempt() {
      Ok(value) => {
        backpressure::release_one();
        return Ok(value);
      }
      Err(error) => match classify(&error) {
        Failure::Fatal => {
          backpressure::release_one();
          return Err(FsError::io(op, path, error));
        }
        Failure::OpenFileLimit => backpressure::park_for_file_handle_sync(),
        Failure::Transient => {
          used += 1;
          if used >= budget {
            backpressure::release_one();
            return Err(FsError::exhausted(op, path, budget, error));
          }
          std::thread::sleep(BACKOFF * used);
        }
      },
    }
  }
}

pub fn stat(path: &Path, tries: u32) -> Result<FileStat, FsError> {
  with_retry_sync("stat", path, tries, || std::fs::metadata(path).map(FileStat::from))
}

pub fn stat_if_exists(path: &Path, tries: u32) -> Result<Option<FileStat>, FsError> {
  match stat(path, tries) {
    Ok(meta) => Ok(Some(meta)),
    Err(err) if err.is_not_found() => Ok(None),
    Err(err) => Err(err),
  }
}

pub fn read_file(path: &Path, tries: u32) -> Result<Vec<u8>, FsError> {
  with_retry_sync("read", path, tries, || std::fs::read(path))
}

pub fn read_file_if_exists(path: &Path, tries: u32) -> Result<Option<Vec<u8>>, FsError> {
  match read_file(path, tries) {
    Ok(bytes) => Ok(Some(bytes)),
    Err(err) if err.is_not_found() => Ok(None),
    Err(err) => Err(err),
  }
}

pub fn read_dir(path: &Path, tries: u32) -> Result<Vec<DirEntry>, FsError> {
  let mut entries = with_retry_sync("readdir", path, tries, || {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(path)? {
      let entry = entry?;
      let file_type = entry.file_type()?;
      out.push(DirEntry {
        name: entry.file_name().to_string_lossy().into_owned(),
        path: entry.path(),
        is_dir: file_type.is_dir(),
        is_symlink: file_type.is_symlink(),
      });
    }
    Ok(out)
  })?;

  entries.sort_by(|a, b| a.name.cmp(&b.name));
  Ok(entries)
}

pub fn write_file(path: &Path, bytes: &[u8], tries: u32) -> Result<(), FsError> {
  match with_retry_sync("write", path, tries, || std::fs::write(path, bytes)) {
    Err(err) if err.is_not_found() => {
      ensure_parent(path, tries)?;
      with_retry_sync("write", path, tries, || std::fs::write(path, bytes))
    }
    other => other,
  }
}

pub fn append_file(path: &Path, bytes: &[u8], tries: u32) -> Result<(), FsError> {
  fn append_once(path: &Path, bytes: &[u8]) -> io::Result<()> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new().append(true).create(true).open(path)?;
    file.write_all(bytes)
  }

  match with_retry_sync("append", path, tries, || append_once(path, bytes)) {
    Err(err) if err.is_not_found() => {
      ensure_parent(path, tries)?;
      with_retry_sync("append", path, tries, || append_once(path, bytes))
    }
    other => other,
  }
}

pub fn copy_file(from: &Path, to: &Path, tries: u32) -> Result<(), FsError> {
  let attempt = || std::fs::copy(from, to).map(|_| ());
  match with_retry_sync("copy", to, tries, attempt) {
    Err(err) if err.is_not_found() => {
      if std::fs::metadata(from).is_err() {
        return Err(err);
      }
      ensure_parent(to, tries)?;
      with_retry_sync("copy", to, tries, attempt)
    }
    other => other,
  }
}

pub fn move_file(from: &Path, to: &Path, tries: u32) -> Result<(), FsError> {
  match with_retry_sync("move", to, tries, || std::fs::rename(from, to)) {
    Ok(()) => Ok(()),
    Err(first) => {
      if std::fs::metadata(from).is_err() {
        return Err(first);
      }
      copy_file(from, to, tries)?;
      delete_file(from, tries)
    }
  }
}

pub fn delete_file(path: &Path, tries: u32) -> Result<(), FsError> {
  with_retry_sync("delete", path, tries, || std::fs::remove_file(path))
}

pub fn delete_file_if_exists(path: &Path, tries: u32) -> Result<bool, FsError> {
  match delete_file(path, tries) {
    Ok(()) => Ok(true),
    Err(err) if err.is_not_found() => Ok(false),
    Err(err) => Err(err),
  }
}

pub fn create_dir(path: &Path, tries: u32) -> Result<(), FsError> {
  with_retry_sync("mkdir", path, tries, || std::fs::create_dir_all(path))
}

pub fn delete_dir(path: &Path, tries: u32) -> Result<(), FsError> {
  with_retry_sync("rmdir", path, tries, || std::fs::remove_dir_all(path))
}

pub fn prune_empty_parents(dir: &Path, stop: Option<&Path>) {
  let mut current = Some(dir.to_path_buf());
  while let Some(path) = current {
    if let Some(stop) = stop {
      if path == stop {
        break;
      }
    }
    if std::fs::remove_dir(&path).is_err() {
      break;
    }
    backpressure::release_one();
    current = path.parent().map(Path::to_path_buf);
  }
}

fn ensure_parent(path: &Path, tries: u32) -> Result<(), FsError> {
  match path.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => create_dir(parent, tries),
    _ => Ok(()),
  }
}
