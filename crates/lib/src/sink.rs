//! In-memory output sink for server mode.
//!
//! Under the `server` build mode, `File::save` writes here instead of to
//! disk; the external dev server reads the same map when answering
//! requests. The sink is cheap to clone and safe to share across tasks.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// A shared map from destination path to produced bytes.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
  inner: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>,
}

impl MemorySink {
  pub fn new() -> MemorySink {
    MemorySink::default()
  }

  /// Store the bytes produced for `path`, replacing any prior build.
  pub fn insert(&self, path: impl Into<PathBuf>, bytes: Vec<u8>) {
    self.inner.lock().expect("sink poisoned").insert(path.into(), bytes);
  }

  /// The bytes last produced for `path`.
  pub fn get(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
    self.inner.lock().expect("sink poisoned").get(path.as_ref()).cloned()
  }

  /// Drop an output, as a clean pass would on disk.
  pub fn remove(&self, path: impl AsRef<Path>) -> bool {
    self.inner.lock().expect("sink poisoned").remove(path.as_ref()).is_some()
  }

  /// All destination paths currently held, sorted.
  pub fn paths(&self) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = self.inner.lock().expect("sink poisoned").keys().cloned().collect();
    paths.sort();
    paths
  }

  pub fn len(&self) -> usize {
    self.inner.lock().expect("sink poisoned").len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn clear(&self) {
    self.inner.lock().expect("sink poisoned").clear();
  }
}
