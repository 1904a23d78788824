//! Error type and failure classification for filesystem operations.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors from the filesystem facade.
#[derive(Debug, Error)]
pub enum FsError {
  /// A non-retryable failure, or a failure on the final attempt.
  #[error("{op} {path}: {source}")]
  Io {
    op: &'static str,
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  /// Transient failures persisted past the retry budget.
  #[error("{op} {path} still failing after {tries} attempts: {source}")]
  Exhausted {
    op: &'static str,
    path: PathBuf,
    tries: u32,
    #[source]
    source: io::Error,
  },
}

impl FsError {
  pub(crate) fn io(op: &'static str, path: &Path, source: io::Error) -> FsError {
    FsError::Io {
      op,
      path: path.to_path_buf(),
      source,
    }
  }

  pub(crate) fn exhausted(op: &'static str, path: &Path, tries: u32, source: io::Error) -> FsError {
    FsError::Exhausted {
      op,
      path: path.to_path_buf(),
      tries,
      source,
    }
  }

  /// The underlying I/O error kind.
  pub fn kind(&self) -> io::ErrorKind {
    match self {
      FsError::Io { source, .. } | FsError::Exhausted { source, .. } => source.kind(),
    }
  }

  /// True for `ENOENT`-class failures, which several callers treat as an
  /// expected absence rather than an error.
  pub fn is_not_found(&self) -> bool {
    self.kind() == io::ErrorKind::NotFound
  }

  /// The path the failing operation was aimed at.
  pub fn path(&self) -> &Path {
    match self {
      FsError::Io { path, .. } | FsError::Exhausted { path, .. } => path,
    }
  }
}

/// How an `io::Error` should be handled by the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Failure {
  /// Worth another attempt after a short backoff.
  Transient,
  /// The process ran out of file descriptors; park until one frees up.
  OpenFileLimit,
  /// Retrying cannot help.
  Fatal,
}

#[cfg(unix)]
const ENFILE: i32 = 23;
#[cfg(unix)]
const EMFILE: i32 = 24;
#[cfg(unix)]
const EBUSY: i32 = 16;

pub(crate) fn classify(error: &io::Error) -> Failure {
  #[cfg(unix)]
  if let Some(code) = error.raw_os_error() {
    if code == EMFILE || code == ENFILE {
      return Failure::OpenFileLimit;
    }
    if code == EBUSY {
      return Failure::Transient;
    }
  }

  match error.kind() {
    io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Failure::Transient,
    // Permission failures retry once in practice: on Windows they show up
    // transiently while another process holds the file open.
    io::ErrorKind::PermissionDenied if cfg!(windows) => Failure::Transient,
    _ => Failure::Fatal,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn not_found_is_fatal() {
    let err = io::Error::new(io::ErrorKind::NotFound, "gone");
    assert_eq!(classify(&err), Failure::Fatal);
  }

  #[test]
  fn interrupted_is_transient() {
    let err = io::Error::new(io::ErrorKind::Interrupted, "signal");
    assert_eq!(classify(&err), Failure::Transient);
  }

  #[cfg(unix)]
  #[test]
  fn emfile_parks() {
    let err = io::Error::from_raw_os_error(EMFILE);
    assert_eq!(classify(&err), Failure::OpenFileLimit);
    let err = io::Error::from_raw_os_error(ENFILE);
    assert_eq!(classify(&err), Failure::OpenFileLimit);
  }

  #[test]
  fn error_reports_path_and_kind() {
    let err = FsError::io("read", Path::new("/tmp/x"), io::Error::new(io::ErrorKind::NotFound, "gone"));
    assert!(err.is_not_found());
    assert_eq!(err.path(), Path::new("/tmp/x"));
    assert!(err.to_string().contains("/tmp/x"));
  }
}
