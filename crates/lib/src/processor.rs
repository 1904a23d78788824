//! Processor descriptors: the hooks a list invokes as files flow through.
//!
//! The descriptor is a record of optional closures. `add` comes in an
//! explicit sync or async variant, chosen at construction; `end` receives
//! the collected batch (for collecting processors) and returns the files
//! to forward downstream.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::file::File;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A failure inside a processor hook. Recorded against the current file;
/// siblings keep flowing.
#[derive(Debug, Error)]
pub enum ProcessError {
  #[error("{0}")]
  Message(String),

  #[error(transparent)]
  Fs(#[from] sluice_fs::FsError),

  #[error(transparent)]
  SourceMap(#[from] sluice_core::SourceMapError),
}

impl From<String> for ProcessError {
  fn from(value: String) -> ProcessError {
    ProcessError::Message(value)
  }
}

impl From<&str> for ProcessError {
  fn from(value: &str) -> ProcessError {
    ProcessError::Message(value.to_string())
  }
}

/// Per-file hook. `Ok(true)` forwards the file, `Ok(false)` suppresses it
/// from this stage's output.
pub enum AddFn {
  Sync(Box<dyn Fn(&mut File) -> Result<bool, ProcessError> + Send + Sync>),
  Async(Box<dyn for<'a> Fn(&'a mut File) -> BoxFuture<'a, Result<bool, ProcessError>> + Send + Sync>),
}

/// Hook run synchronously when the stage is piped into a chain.
pub type InitFn = Box<dyn Fn(&crate::list::FileList) + Send + Sync>;

/// Stage-level hook with no per-file argument (`before`/`after`).
pub type StageFn = Box<dyn Fn() -> BoxFuture<'static, Result<(), ProcessError>> + Send + Sync>;

/// End hook: receives the collected batch (empty for non-collecting
/// stages) and returns files to forward downstream.
pub type EndFn = Box<dyn Fn(Vec<File>) -> BoxFuture<'static, Result<Vec<File>, ProcessError>> + Send + Sync>;

/// A processor: what one list does to the files passing through it.
pub struct Processor {
  pub name: String,
  /// Force the source content to be loaded before `add` runs.
  pub load: bool,
  /// Batch clones of all files and hand them to `end`.
  pub collect: bool,
  pub init: Option<InitFn>,
  pub before: Option<StageFn>,
  pub add: Option<AddFn>,
  pub after: Option<StageFn>,
  pub end: Option<EndFn>,
}

impl Processor {
  pub fn named(name: impl Into<String>) -> Processor {
    Processor {
      name: name.into(),
      load: false,
      collect: false,
      init: None,
      before: None,
      add: None,
      after: None,
      end: None,
    }
  }

  /// Preload source content before each `add`.
  pub fn loading(mut self) -> Processor {
    self.load = true;
    self
  }

  /// Collect file clones and present them to `end` as a batch.
  pub fn collecting(mut self) -> Processor {
    self.collect = true;
    self
  }

  /// Synchronous per-file hook.
  pub fn sync_add<F>(mut self, f: F) -> Processor
  where
    F: Fn(&mut File) -> Result<bool, ProcessError> + Send + Sync + 'static,
  {
    self.add = Some(AddFn::Sync(Box::new(f)));
    self
  }

  /// Asynchronous per-file hook.
  pub fn async_add<F>(mut self, f: F) -> Processor
  where
    F: for<'a> Fn(&'a mut File) -> BoxFuture<'a, Result<bool, ProcessError>> + Send + Sync + 'static,
  {
    self.add = Some(AddFn::Async(Box::new(f)));
    self
  }

  /// Hook invoked once when the stage joins a chain, with the handle of
  /// the list it became.
  pub fn on_init<F>(mut self, f: F) -> Processor
  where
    F: Fn(&crate::list::FileList) + Send + Sync + 'static,
  {
    self.init = Some(Box::new(f));
    self
  }

  pub fn on_before<F>(mut self, f: F) -> Processor
  where
    F: Fn() -> BoxFuture<'static, Result<(), ProcessError>> + Send + Sync + 'static,
  {
    self.before = Some(Box::new(f));
    self
  }

  pub fn on_after<F>(mut self, f: F) -> Processor
  where
    F: Fn() -> BoxFuture<'static, Result<(), ProcessError>> + Send + Sync + 'static,
  {
    self.after = Some(Box::new(f));
    self
  }

  pub fn on_end<F>(mut self, f: F) -> Processor
  where
    F: Fn(Vec<File>) -> BoxFuture<'static, Result<Vec<File>, ProcessError>> + Send + Sync + 'static,
  {
    self.end = Some(Box::new(f));
    self
  }
}

impl fmt::Debug for Processor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Processor")
      .field("name", &self.name)
      .field("load", &self.load)
      .field("collect", &self.collect)
      .field("has_add", &self.add.is_some())
      .field("has_end", &self.end.is_some())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn sync_add_runs() {
    let p = Processor::named("bang").sync_add(|file| {
      let content = format!("{}!", file.content());
      file.set_content(content);
      Ok(true)
    });

    let mut file = File::detached_for_tests();
    file.set_content("hey");
    match p.add.as_ref().unwrap() {
      AddFn::Sync(f) => assert!(f(&mut file).unwrap()),
      AddFn::Async(_) => panic!("expected sync add"),
    }
    assert_eq!(file.content(), "hey!");
  }

  #[tokio::test]
  async fn async_add_runs() {
    let p = Processor::named("upper").async_add(|file| {
      Box::pin(async move {
        let content = file.content().to_uppercase();
        file.set_content(content);
        Ok(true)
      })
    });

    let mut file = File::detached_for_tests();
    file.set_content("low");
    match p.add.as_ref().unwrap() {
      AddFn::Async(f) => assert!(f(&mut file).await.unwrap()),
      AddFn::Sync(_) => panic!("expected async add"),
    }
    assert_eq!(file.content(), "LOW");
  }

  #[test]
  fn builder_flags() {
    let p = Processor::named("concat").loading().collecting();
    assert!(p.load);
    assert!(p.collect);
    assert_eq!(p.name, "concat");
  }
}
