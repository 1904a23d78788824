//! Engine-wide counters feeding the end-of-run summary.

use std::sync::atomic::{AtomicU32, Ordering};

/// Aggregated error/warning/file/task counts for one drain of the queue.
/// The watcher resets them before every rebuild so each summary covers one
/// build, not the whole session.
#[derive(Debug, Default)]
pub struct Counters {
  errors: AtomicU32,
  warnings: AtomicU32,
  files: AtomicU32,
  tasks: AtomicU32,
}

/// A point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
  pub errors: u32,
  pub warnings: u32,
  pub files: u32,
  pub tasks: u32,
}

impl Counters {
  pub fn add_error(&self) {
    self.errors.fetch_add(1, Ordering::Relaxed);
  }

  pub fn add_warning(&self) {
    self.warnings.fetch_add(1, Ordering::Relaxed);
  }

  pub fn add_file(&self) {
    self.files.fetch_add(1, Ordering::Relaxed);
  }

  pub fn add_task(&self) {
    self.tasks.fetch_add(1, Ordering::Relaxed);
  }

  pub fn snapshot(&self) -> CounterSnapshot {
    CounterSnapshot {
      errors: self.errors.load(Ordering::Relaxed),
      warnings: self.warnings.load(Ordering::Relaxed),
      files: self.files.load(Ordering::Relaxed),
      tasks: self.tasks.load(Ordering::Relaxed),
    }
  }

  pub fn reset(&self) {
    self.errors.store(0, Ordering::Relaxed);
    self.warnings.store(0, Ordering::Relaxed);
    self.files.store(0, Ordering::Relaxed);
    self.tasks.store(0, Ordering::Relaxed);
  }
}
