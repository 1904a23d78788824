//! Watch-mode rebuilds driven by real filesystem events.
//!
//! These go through the native watch backend, so assertions poll with a
//! generous deadline instead of assuming event latency.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sluice_lib::{BuildMode, Engine, NoopObserver, Processor, Setting, Settings};
use tempfile::TempDir;

fn watch_settings(tmp: &TempDir) -> Settings {
  let mut settings = Settings::for_mode(BuildMode::Watch, tmp.path());
  settings.silent = true;
  settings.source_map = Setting::Value(false);
  settings.debounce = Duration::from_millis(50);
  settings
}

async fn wait_until<F>(mut condition: F) -> bool
where
  F: FnMut() -> bool,
{
  for _ in 0..100 {
    if condition() {
      return true;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
  }
  false
}

fn read(path: &Path) -> Option<String> {
  std::fs::read_to_string(path).ok()
}

#[tokio::test]
async fn change_rebuilds_only_the_changed_file() {
  let tmp = TempDir::new().unwrap();
  std::fs::write(tmp.path().join("a.txt"), "A1").unwrap();
  std::fs::write(tmp.path().join("b.txt"), "B1").unwrap();

  let engine = Engine::with_observer(watch_settings(&tmp), Arc::new(NoopObserver));
  let passed = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
  {
    let passed = passed.clone();
    engine
      .run_task("watch_copy", move |engine| {
        let passed = passed.clone();
        engine
          .src(["*.txt"])
          .pipe(Processor::named("trace").sync_add(move |file| {
            passed.lock().unwrap().push(file.name().unwrap_or_default().to_string());
            Ok(true)
          }))
          .dest("_out");
      })
      .await
      .unwrap();
  }

  assert_eq!(read(&tmp.path().join("_out/a.txt")).as_deref(), Some("A1"));
  let first_pass = passed.lock().unwrap().len();
  assert_eq!(first_pass, 2);

  // Allow the watcher to finish priming before mutating.
  tokio::time::sleep(Duration::from_millis(300)).await;
  std::fs::write(tmp.path().join("a.txt"), "A2").unwrap();

  let rebuilt = wait_until(|| read(&tmp.path().join("_out/a.txt")).as_deref() == Some("A2")).await;
  assert!(rebuilt, "watcher never rebuilt the changed file");
  engine.wait_idle().await;

  let names: Vec<String> = passed.lock().unwrap()[first_pass..].to_vec();
  assert!(names.iter().any(|n| n == "a.txt"));
  assert!(!names.iter().any(|n| n == "b.txt"));

  engine.stop_watching();
}

#[tokio::test]
async fn delete_runs_a_clean_pass_for_outputs() {
  let tmp = TempDir::new().unwrap();
  std::fs::write(tmp.path().join("a.txt"), "A").unwrap();
  std::fs::write(tmp.path().join("b.txt"), "B").unwrap();

  let engine = Engine::with_observer(watch_settings(&tmp), Arc::new(NoopObserver));
  engine
    .run_task("watch_copy", |engine| {
      engine.src(["*.txt"]).dest("_out");
    })
    .await
    .unwrap();
  assert!(tmp.path().join("_out/a.txt").exists());

  tokio::time::sleep(Duration::from_millis(300)).await;
  std::fs::remove_file(tmp.path().join("a.txt")).unwrap();

  let cleaned = wait_until(|| !tmp.path().join("_out/a.txt").exists()).await;
  assert!(cleaned, "deleted source's output was never cleaned");
  // The sibling output survives.
  assert!(tmp.path().join("_out/b.txt").exists());

  engine.stop_watching();
}

#[tokio::test]
async fn dep_change_reemits_the_consumer() {
  let tmp = TempDir::new().unwrap();
  std::fs::write(tmp.path().join("page.txt"), "page").unwrap();
  std::fs::write(tmp.path().join("common.inc"), "v1").unwrap();

  let engine = Engine::with_observer(watch_settings(&tmp), Arc::new(NoopObserver));
  let common = tmp.path().join("common.inc");
  {
    let common = common.clone();
    engine
      .run_task("watch_deps", move |engine| {
        let common = common.clone();
        engine
          .src(["*.txt"])
          .pipe(Processor::named("inline_include").loading().sync_add(move |file| {
            // The page embeds the include, so it depends on it.
            let include = std::fs::read_to_string(&common).unwrap_or_default();
            let content = format!("{}:{}", file.content(), include);
            file.set_content(content);
            file.add_dep(&common);
            Ok(true)
          }))
          .dest("_out");
      })
      .await
      .unwrap();
  }

  assert_eq!(read(&tmp.path().join("_out/page.txt")).as_deref(), Some("page:v1"));

  tokio::time::sleep(Duration::from_millis(300)).await;
  std::fs::write(&common, "v2").unwrap();

  let rebuilt = wait_until(|| read(&tmp.path().join("_out/page.txt")).as_deref() == Some("page:v2")).await;
  assert!(rebuilt, "dependency change never re-emitted the consumer");

  engine.stop_watching();
}

#[tokio::test]
async fn new_file_joins_the_pipeline() {
  let tmp = TempDir::new().unwrap();
  std::fs::write(tmp.path().join("a.txt"), "A").unwrap();

  let engine = Engine::with_observer(watch_settings(&tmp), Arc::new(NoopObserver));
  engine
    .run_task("watch_copy", |engine| {
      engine.src(["*.txt"]).dest("_out");
    })
    .await
    .unwrap();

  tokio::time::sleep(Duration::from_millis(300)).await;
  std::fs::write(tmp.path().join("fresh.txt"), "new").unwrap();

  let built = wait_until(|| read(&tmp.path().join("_out/fresh.txt")).as_deref() == Some("new")).await;
  assert!(built, "newly created file never flowed through the pipeline");

  engine.stop_watching();
}
