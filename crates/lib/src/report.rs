//! Console reporting: the default observer and the end-of-run summary.

use std::path::PathBuf;
use std::time::Duration;

use owo_colors::{OwoColorize, Stream};

use sluice_core::path::relative_path;
use sluice_core::LogLevel;

use crate::counters::CounterSnapshot;
use crate::log::LogEntry;
use crate::observer::Observer;
use crate::runner::BuildSummary;
use crate::settings::Settings;

mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
}

/// The default observer: renders file log entries to the terminal,
/// honoring the `silent`, `log_level`, `colors`, and `full_path` knobs.
#[derive(Debug, Clone)]
pub struct ConsoleReporter {
  log_level: LogLevel,
  silent: bool,
  colors: bool,
  full_path: bool,
  cwd: PathBuf,
}

impl ConsoleReporter {
  pub fn new(settings: &Settings) -> ConsoleReporter {
    ConsoleReporter {
      log_level: settings.log_level,
      silent: settings.silent,
      colors: settings.colors,
      full_path: settings.full_path,
      cwd: settings.cwd.clone(),
    }
  }

  fn display_path(&self, path: &std::path::Path) -> String {
    if self.full_path || !path.is_absolute() {
      path.display().to_string()
    } else {
      relative_path(&self.cwd, path)
    }
  }
}

impl Observer for ConsoleReporter {
  fn file_log(&self, entry: &LogEntry) {
    if self.silent || entry.level > self.log_level {
      return;
    }

    let location = match (&entry.path, entry.region) {
      (Some(path), Some(region)) => format!(
        "{}:{}:{} ",
        self.display_path(path),
        region.start_line + 1,
        region.start_column + 1
      ),
      (Some(path), None) => format!("{} ", self.display_path(path)),
      _ => String::new(),
    };

    let line = format!("{}{}", location, entry.message);
    match entry.level {
      LogLevel::Error => {
        if self.colors {
          eprintln!(
            "{} {}",
            symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
            line.if_supports_color(Stream::Stderr, |s| s.red())
          );
        } else {
          eprintln!("{} {}", symbols::ERROR, line);
        }
        if entry.print_stack {
          if let Some(error) = &entry.error {
            eprintln!("    {}", error);
          }
        }
      }
      LogLevel::Warning => {
        if self.colors {
          eprintln!(
            "{} {}",
            symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
            line.if_supports_color(Stream::Stderr, |s| s.yellow())
          );
        } else {
          eprintln!("{} {}", symbols::WARNING, line);
        }
      }
      LogLevel::Info => {
        if self.colors {
          println!(
            "{} {}",
            symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
            line
          );
        } else {
          println!("{} {}", symbols::INFO, line);
        }
      }
      LogLevel::Verbose => println!("  {}", line),
    }

    if let Some(snippet) = &entry.snippet {
      eprintln!("    {}", snippet);
    }
  }
}

pub(crate) fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  let millis = duration.subsec_millis();

  if secs >= 60 {
    format!("{}m {}s", secs / 60, secs % 60)
  } else if secs > 0 {
    format!("{}.{:02}s", secs, millis / 10)
  } else {
    format!("{}ms", millis)
  }
}

/// Print the end-of-run summary line.
pub fn print_summary(settings: &Settings, summary: &BuildSummary) {
  if settings.silent {
    return;
  }

  let counts = format!(
    "{} files, {} errors, {} warnings, {}",
    summary.files,
    summary.errors,
    summary.warnings,
    format_duration(summary.elapsed)
  );

  if summary.errors > 0 {
    if settings.colors {
      eprintln!(
        "{} {} ({})",
        symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
        summary.status,
        counts
      );
    } else {
      eprintln!("{} {} ({})", symbols::ERROR, summary.status, counts);
    }
  } else if settings.colors {
    println!(
      "{} {} ({})",
      symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
      summary.status,
      counts
    );
  } else {
    println!("{} {} ({})", symbols::SUCCESS, summary.status, counts);
  }
}

/// Summary after a watch-mode rebuild.
pub(crate) fn print_rebuild_summary(settings: &Settings, counters: &CounterSnapshot, elapsed: Duration) {
  if settings.silent {
    return;
  }
  let status = if counters.errors > 0 {
    "Build completed (with errors)"
  } else {
    "Build success"
  };
  let summary = BuildSummary {
    status: status.to_string(),
    errors: counters.errors,
    warnings: counters.warnings,
    files: counters.files,
    tasks: counters.tasks,
    elapsed,
  };
  print_summary(settings, &summary);
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn duration_formatting() {
    assert_eq!(format_duration(Duration::from_millis(42)), "42ms");
    assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    assert_eq!(format_duration(Duration::from_secs(75)), "1m 15s");
  }

  #[test]
  fn reporter_respects_cwd_relative_paths() {
    let mut settings = Settings::default();
    settings.cwd = PathBuf::from("/work");
    let reporter = ConsoleReporter::new(&settings);
    assert_eq!(reporter.display_path(std::path::Path::new("/work/sub/a.txt")), "sub/a.txt");

    settings.full_path = true;
    let reporter = ConsoleReporter::new(&settings);
    assert_eq!(
      reporter.display_path(std::path::Path::new("/work/sub/a.txt")),
      "/work/sub/a.txt"
    );
  }
}
