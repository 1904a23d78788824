//! Build modes and log levels.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The mode a task runs under, chosen once per task invocation.
///
/// The mode decides what `File::save` does with produced content: write it,
/// delete it, keep it in memory, or only count it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
  /// Write outputs to disk.
  #[default]
  Build,

  /// Delete the outputs a build would have produced.
  Clean,

  /// Run the pipeline without touching the disk; only count files.
  Preview,

  /// Build, then stay resident and rebuild on filesystem changes.
  Watch,

  /// Build into an in-memory sink served by an external dev server.
  Server,
}

impl BuildMode {
  /// True for the modes that actually write produced bytes somewhere
  /// (to disk or to the in-memory sink).
  pub fn writes_output(self) -> bool {
    matches!(self, BuildMode::Build | BuildMode::Watch | BuildMode::Server)
  }
}

impl fmt::Display for BuildMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      BuildMode::Build => "build",
      BuildMode::Clean => "clean",
      BuildMode::Preview => "preview",
      BuildMode::Watch => "watch",
      BuildMode::Server => "server",
    };
    write!(f, "{}", s)
  }
}

impl FromStr for BuildMode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "build" => Ok(BuildMode::Build),
      "clean" => Ok(BuildMode::Clean),
      "preview" => Ok(BuildMode::Preview),
      "watch" => Ok(BuildMode::Watch),
      "server" => Ok(BuildMode::Server),
      other => Err(format!("unknown build mode: {}", other)),
    }
  }
}

/// Severity of a per-file log entry.
///
/// Ordered so that `level <= threshold` decides whether an entry is shown:
/// `Error < Warning < Info < Verbose`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
  Error,
  Warning,
  Info,
  Verbose,
}

impl fmt::Display for LogLevel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      LogLevel::Error => "error",
      LogLevel::Warning => "warning",
      LogLevel::Info => "info",
      LogLevel::Verbose => "verbose",
    };
    write!(f, "{}", s)
  }
}
