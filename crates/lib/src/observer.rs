//! The engine's event surface.
//!
//! Instead of a global event emitter, every event kind is one method on
//! this trait with a no-op default. Reporters, the watcher bookkeeping,
//! and tests plug in by implementing the subset they care about. Methods
//! returning `bool` may veto the operation by returning `false`.

use std::path::Path;

use sluice_core::SourceMap;

use crate::file::File;
use crate::log::LogEntry;

/// Engine event hooks. All methods default to "observe nothing, veto
/// nothing".
pub trait Observer: Send + Sync {
  /// A new list joined a pipeline.
  fn add_list(&self, _name: &str) {}

  /// A file is about to enter a root list. Return `false` to skip it.
  fn add_file(&self, _file: &File) -> bool {
    true
  }

  /// A directory was enumerated during source discovery.
  fn add_dir(&self, _path: &Path, _entries: &[String]) {}

  /// A file is about to be saved. Return `false` to skip the write.
  fn file_validate(&self, _file: &File) -> bool {
    true
  }

  /// A file was saved (written, counted, or redirected to the sink).
  fn file_save(&self, _file: &File, _dest: &Path) {}

  /// A file (or a clean-mode output) was deleted.
  fn file_delete(&self, _file: &File, _path: &Path) {}

  /// A diagnostic entry was recorded against a file.
  fn file_log(&self, _entry: &LogEntry) {}

  /// A dependency edge is about to be recorded. Return `false` to veto.
  fn file_dep(&self, _file: &File, _dep: &Path) -> bool {
    true
  }

  /// A reference edge is about to be recorded. Return `false` to veto.
  fn file_ref(&self, _file: &File, _reference: &Path) -> bool {
    true
  }

  /// A source map is about to be emitted. Return `false` to suppress it.
  fn source_map_validate(&self, _file: &File, _map: &SourceMap) -> bool {
    true
  }
}

/// The default observer: sees everything, does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn noop_observer_vetoes_nothing() {
    let observer = NoopObserver;
    observer.add_list("stage");
    assert!(observer.file_dep(
      &crate::file::File::detached_for_tests(),
      Path::new("/dep")
    ));
    assert!(observer.file_ref(
      &crate::file::File::detached_for_tests(),
      Path::new("/ref")
    ));
  }
}
