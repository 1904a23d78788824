//! sluice-lib: the pipeline engine.
//!
//! A build script is plain Rust: it creates an [`Engine`] from
//! [`Settings`], registers task functions, and inside each task composes
//! pipelines from glob sources:
//!
//! ```no_run
//! use sluice_lib::{Engine, Processor, Settings};
//!
//! # async fn example() -> Result<(), sluice_lib::TaskError> {
//! let engine = Engine::new(Settings::default());
//! engine
//!   .run_task("scripts", |engine| {
//!     engine
//!       .src(["src/**/*.js", "!src/vendor/**"])
//!       .pipe(Processor::named("banner").loading().sync_add(|file| {
//!         let content = format!("/* built */\n{}", file.content());
//!         file.set_content(content);
//!         Ok(true)
//!       }))
//!       .dest("dist");
//!   })
//!   .await?;
//! # Ok(())
//! # }
//! ```
//!
//! The crate splits along the component seams: `file` (the in-memory
//! artifact), `list`/`processor` (the chain), `queue` (sequencing),
//! `source` (discovery), `watcher` (incremental rebuilds), `runner`
//! (task execution and summaries), with `observer`/`report` as the event
//! surface.

pub mod counters;
pub mod engine;
pub mod file;
pub mod list;
pub mod log;
pub mod observer;
pub mod processor;
pub mod queue;
pub mod report;
pub mod runner;
pub mod settings;
pub mod sink;
mod source;
pub mod watcher;
pub mod writer;

pub use counters::CounterSnapshot;
pub use engine::Engine;
pub use file::{File, FileCtx, FileData, SaveOutcome};
pub use list::FileList;
pub use log::{LogEntry, Region};
pub use observer::{NoopObserver, Observer};
pub use processor::{AddFn, BoxFuture, ProcessError, Processor};
pub use queue::AsyncQueue;
pub use report::ConsoleReporter;
pub use runner::{BuildSummary, TaskError};
pub use settings::{Setting, Settings};
pub use sink::MemorySink;
pub use watcher::{WatchError, Watcher};
pub use writer::{FragmentSource, SourceMapWriter, Writer};

pub use sluice_core::{BuildMode, Encoding, LogLevel, Mapping, Matcher, Pattern, SourceMap};
