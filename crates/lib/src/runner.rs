//! Task running: binding user task functions to the queue and producing
//! the aggregated summary.
//!
//! A task is a plain function over the engine: it builds pipeline chains
//! with `src`/`pipe`/`dest` and returns. The runner enqueues it, drives
//! source discovery, waits for the queue to drain, and reports. Watch
//! mode additionally installs the watcher and leaves it resident; server
//! mode installs the in-memory sink and hands it to the external server
//! starter.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use sluice_core::BuildMode;

use crate::counters::CounterSnapshot;
use crate::engine::Engine;
use crate::report;
use crate::sink::MemorySink;
use crate::watcher::{WatchError, Watcher};

/// Errors that abort a task run entirely (everything else is recorded on
/// files and reflected in the summary counters).
#[derive(Debug, Error)]
pub enum TaskError {
  #[error(transparent)]
  Watch(#[from] WatchError),
}

/// The aggregated result of one task run.
#[derive(Debug, Clone)]
pub struct BuildSummary {
  pub status: String,
  pub errors: u32,
  pub warnings: u32,
  pub files: u32,
  pub tasks: u32,
  pub elapsed: Duration,
}

impl BuildSummary {
  pub fn succeeded(&self) -> bool {
    self.errors == 0
  }
}

impl Engine {
  /// Run one task under the engine's build mode and report the summary.
  ///
  /// In watch mode the watcher stays installed after this returns; the
  /// engine keeps rebuilding until it is dropped (use
  /// [`Engine::wait_idle`] between assertions, or park the task).
  pub async fn run_task<F>(&self, name: &str, task: F) -> Result<BuildSummary, TaskError>
  where
    F: Fn(&Engine) + Send + Sync + 'static,
  {
    let started = Instant::now();
    let mode = self.settings().build_mode;
    tracing::info!(task = name, mode = %mode, "running task");

    let server_url = if mode == BuildMode::Server {
      let sink = MemorySink::new();
      self.ctx().set_sink(sink.clone());
      self.settings().serve.as_ref().map(|serve| serve(sink))
    } else {
      None
    };

    let engine = self.clone();
    let task = Arc::new(task);
    self.queue().enqueue(async move {
      engine.ctx().counters.add_task();
      task(&engine);
      engine.drive().await;
    });
    self.queue().drained().await;

    if mode == BuildMode::Watch {
      let watcher = Watcher::start(self.clone()).await?;
      self.install_watcher(watcher);
    }

    let counters = self.counters();
    let summary = BuildSummary {
      status: summary_status(mode, &counters, server_url.as_deref()),
      errors: counters.errors,
      warnings: counters.warnings,
      files: counters.files,
      tasks: counters.tasks,
      elapsed: started.elapsed(),
    };
    report::print_summary(self.settings(), &summary);
    Ok(summary)
  }

  /// Wait until no queued or running job remains. In watch mode this is
  /// how callers synchronize with rebuilds.
  pub async fn wait_idle(&self) {
    self.queue().drained().await;
  }
}

fn summary_status(mode: BuildMode, counters: &CounterSnapshot, server_url: Option<&str>) -> String {
  match mode {
    BuildMode::Build => {
      if counters.errors > 0 {
        "Build completed (with errors)".to_string()
      } else if counters.files == 0 {
        "Done".to_string()
      } else {
        "Build success".to_string()
      }
    }
    BuildMode::Clean => "Clean completed".to_string(),
    BuildMode::Preview => "Preview completed".to_string(),
    BuildMode::Watch => "Start watching".to_string(),
    BuildMode::Server => match server_url {
      Some(url) => format!("Server running at {}", url),
      None => "Server running".to_string(),
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::observer::NoopObserver;
  use crate::settings::Settings;
  use tempfile::TempDir;

  fn counters(errors: u32, files: u32) -> CounterSnapshot {
    CounterSnapshot {
      errors,
      warnings: 0,
      files,
      tasks: 1,
    }
  }

  #[test]
  fn status_strings_by_mode() {
    assert_eq!(summary_status(BuildMode::Build, &counters(0, 3), None), "Build success");
    assert_eq!(
      summary_status(BuildMode::Build, &counters(2, 3), None),
      "Build completed (with errors)"
    );
    assert_eq!(summary_status(BuildMode::Build, &counters(0, 0), None), "Done");
    assert_eq!(summary_status(BuildMode::Clean, &counters(0, 1), None), "Clean completed");
    assert_eq!(
      summary_status(BuildMode::Preview, &counters(0, 1), None),
      "Preview completed"
    );
    assert_eq!(summary_status(BuildMode::Watch, &counters(0, 1), None), "Start watching");
    assert_eq!(
      summary_status(BuildMode::Server, &counters(0, 1), Some("http://localhost:3000")),
      "Server running at http://localhost:3000"
    );
  }

  #[tokio::test]
  async fn run_task_drains_and_counts() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("a.txt"), "A").unwrap();

    let mut settings = Settings::for_mode(BuildMode::Build, tmp.path());
    settings.silent = true;
    settings.source_map = crate::settings::Setting::Value(false);
    let engine = Engine::with_observer(settings, Arc::new(NoopObserver));

    let summary = engine
      .run_task("copy", |engine| {
        engine.src(["*.txt"]).dest("_out");
      })
      .await
      .unwrap();

    assert_eq!(summary.tasks, 1);
    assert_eq!(summary.files, 1);
    assert!(summary.succeeded());
    assert_eq!(summary.status, "Build success");
    assert_eq!(std::fs::read_to_string(tmp.path().join("_out/a.txt")).unwrap(), "A");
  }

  #[tokio::test]
  async fn tasks_run_fifo_across_run_calls() {
    let tmp = TempDir::new().unwrap();
    let mut settings = Settings::for_mode(BuildMode::Build, tmp.path());
    settings.silent = true;
    let engine = Engine::with_observer(settings, Arc::new(NoopObserver));

    let order = Arc::new(std::sync::Mutex::new(Vec::new()));
    {
      let order = order.clone();
      let o2 = order.clone();
      let first = engine.run_task("first", move |_| {
        order.lock().unwrap().push("first");
      });
      let second = engine.run_task("second", move |_| {
        o2.lock().unwrap().push("second");
      });
      let (a, b) = tokio::join!(first, second);
      a.unwrap();
      b.unwrap();
    }

    assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
  }

  #[tokio::test]
  async fn server_mode_reports_url_and_uses_sink() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("a.txt"), "A").unwrap();

    let mut settings = Settings::for_mode(BuildMode::Server, tmp.path());
    settings.silent = true;
    settings.source_map = crate::settings::Setting::Value(false);
    settings.serve = Some(Arc::new(|_sink| "http://127.0.0.1:8901".to_string()));
    let engine = Engine::with_observer(settings, Arc::new(NoopObserver));

    let summary = engine
      .run_task("serve", |engine| {
        engine.src(["*.txt"]).dest("_out");
      })
      .await
      .unwrap();

    assert_eq!(summary.status, "Server running at http://127.0.0.1:8901");
    let sink = engine.sink().unwrap();
    assert_eq!(sink.get(tmp.path().join("_out/a.txt")).unwrap(), b"A");
    assert!(!tmp.path().join("_out").exists());
  }
}
