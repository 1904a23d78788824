//! The configuration surface the engine reads.
//!
//! Most knobs accept either a plain value or a per-file callback; those
//! are modeled as [`Setting`] and resolved at access time against the file
//! being processed.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sluice_core::{BuildMode, Encoding, LogLevel, Pattern};

use crate::file::File;
use crate::sink::MemorySink;

/// A value, or a function computing it per file.
pub enum Setting<T> {
  Value(T),
  PerFile(Arc<dyn Fn(&File) -> T + Send + Sync>),
}

impl<T: Clone> Setting<T> {
  pub fn per_file<F>(f: F) -> Setting<T>
  where
    F: Fn(&File) -> T + Send + Sync + 'static,
  {
    Setting::PerFile(Arc::new(f))
  }

  pub fn resolve(&self, file: &File) -> T {
    match self {
      Setting::Value(value) => value.clone(),
      Setting::PerFile(f) => f(file),
    }
  }
}

impl<T: Clone> Clone for Setting<T> {
  fn clone(&self) -> Setting<T> {
    match self {
      Setting::Value(value) => Setting::Value(value.clone()),
      Setting::PerFile(f) => Setting::PerFile(f.clone()),
    }
  }
}

impl<T: fmt::Debug> fmt::Debug for Setting<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Setting::Value(value) => write!(f, "Value({:?})", value),
      Setting::PerFile(_) => write!(f, "PerFile(..)"),
    }
  }
}

impl<T> From<T> for Setting<T> {
  fn from(value: T) -> Setting<T> {
    Setting::Value(value)
  }
}

/// Signature of the external dev-server starter: receives the in-memory
/// sink and returns the URL it is serving at.
pub type ServeFn = Arc<dyn Fn(MemorySink) -> String + Send + Sync>;

/// Everything the engine is configured by. One value per engine; tasks do
/// not mutate it.
#[derive(Clone)]
pub struct Settings {
  pub build_mode: BuildMode,

  /// Directory relative patterns resolve against.
  pub cwd: PathBuf,

  /// Default text encoding, or a per-file choice.
  pub encoding: Setting<Encoding>,

  /// Allow writing a modified file back onto its own source path.
  pub overwrite: bool,

  /// Global include patterns; empty means everything is eligible.
  pub filter: Vec<Pattern>,

  /// Global exclude patterns.
  pub ignore: Vec<Pattern>,

  /// Optional newline-separated pattern file contributing to `ignore`.
  /// Blank lines and `#` comments are skipped.
  pub ignore_file: Option<PathBuf>,

  /// Whether files get source maps at all.
  pub source_map: Setting<bool>,

  /// Inline the map as a `data:` URI instead of a `.map` sidecar.
  pub source_map_inline: Setting<bool>,

  /// Append the `sourceMappingURL` comment to saved content.
  pub source_map_emit: Setting<bool>,

  /// Value for the emitted map's `sourceRoot` field.
  pub source_map_root: Option<String>,

  pub source_map_include_sources_content: bool,
  pub source_map_include_file: bool,
  pub source_map_include_names: bool,

  /// Reporting knobs, consumed by the console reporter.
  pub log_level: LogLevel,
  pub silent: bool,
  pub colors: bool,
  /// Print absolute paths instead of cwd-relative ones.
  pub full_path: bool,

  /// Retry budget handed to every filesystem call.
  pub tries: u32,

  /// Watch debounce window.
  pub debounce: Duration,

  /// External dev-server starter for `server` mode.
  pub serve: Option<ServeFn>,
}

impl Default for Settings {
  fn default() -> Settings {
    Settings {
      build_mode: BuildMode::Build,
      cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")),
      encoding: Setting::Value(Encoding::Utf8),
      overwrite: false,
      filter: Vec::new(),
      ignore: Vec::new(),
      ignore_file: None,
      source_map: Setting::Value(true),
      source_map_inline: Setting::Value(false),
      source_map_emit: Setting::Value(true),
      source_map_root: None,
      source_map_include_sources_content: false,
      source_map_include_file: true,
      source_map_include_names: true,
      log_level: LogLevel::Info,
      silent: false,
      colors: true,
      full_path: false,
      tries: sluice_fs::DEFAULT_TRIES,
      debounce: Duration::from_millis(100),
      serve: None,
    }
  }
}

impl Settings {
  /// Convenience: default settings with a specific mode and cwd. Tests and
  /// small scripts use this; larger scripts build the struct directly.
  pub fn for_mode(build_mode: BuildMode, cwd: impl Into<PathBuf>) -> Settings {
    Settings {
      build_mode,
      cwd: cwd.into(),
      ..Settings::default()
    }
  }
}

impl fmt::Debug for Settings {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Settings")
      .field("build_mode", &self.build_mode)
      .field("cwd", &self.cwd)
      .field("overwrite", &self.overwrite)
      .field("log_level", &self.log_level)
      .field("silent", &self.silent)
      .finish_non_exhaustive()
  }
}

/// Parse the contents of an ignore file into glob patterns.
pub(crate) fn parse_ignore_file(text: &str) -> Vec<Pattern> {
  text
    .lines()
    .map(str::trim)
    .filter(|line| !line.is_empty() && !line.starts_with('#'))
    .map(Pattern::from)
    .collect()
}
