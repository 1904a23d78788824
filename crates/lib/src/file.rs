//! The in-memory file entity flowing through pipelines.
//!
//! A [`File`] is one logical artifact: where it came from (`initial_path`),
//! what it is called logically (`base` + `name`, always `/`-separated),
//! its content in lazily-converted buffer/text form, an optional source
//! map, diagnostics, and dependency edges. Processors mutate the file in
//! place; `save` interprets the result according to the build mode.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use sluice_core::path::{relative_path, resolve_path, split_ext, split_name};
use sluice_core::sourcemap::emit_source_map_url;
use sluice_core::{BuildMode, Encoding, LogLevel, SourceMap};
use sluice_fs::{FileStat, FsError};

use crate::counters::Counters;
use crate::log::{LogEntry, Region};
use crate::observer::Observer;
use crate::settings::Settings;
use crate::sink::MemorySink;

/// Shared engine context every file carries: settings, the observer, the
/// run counters, and (in server mode) the in-memory sink.
pub struct FileCtx {
  pub settings: Settings,
  pub observer: Arc<dyn Observer>,
  pub counters: Counters,
  sink: Mutex<Option<MemorySink>>,
}

impl FileCtx {
  pub fn new(settings: Settings, observer: Arc<dyn Observer>) -> Arc<FileCtx> {
    Arc::new(FileCtx {
      settings,
      observer,
      counters: Counters::default(),
      sink: Mutex::new(None),
    })
  }

  pub fn sink(&self) -> Option<MemorySink> {
    self.sink.lock().expect("sink lock poisoned").clone()
  }

  pub fn set_sink(&self, sink: MemorySink) {
    *self.sink.lock().expect("sink lock poisoned") = Some(sink);
  }
}

impl fmt::Debug for FileCtx {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FileCtx")
      .field("settings", &self.settings)
      .finish_non_exhaustive()
  }
}

/// What `save` did with a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
  /// Bytes went to disk or to the in-memory sink.
  Written,
  /// Unmodified content saved onto its own source path: nothing to do.
  Skipped,
  /// Modified content refused to overwrite its source without `overwrite`.
  Refused,
  /// Preview mode: counted, not written.
  Previewed,
  /// Clean mode: outputs deleted instead of written.
  Cleaned,
  /// An observer vetoed the save.
  Vetoed,
}

#[derive(Debug, Clone, Default)]
struct Slot {
  buffer: Option<Vec<u8>>,
  text: Option<String>,
}

/// Content as the last writer left it: text or bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileData<'a> {
  Text(&'a str),
  Bytes(&'a [u8]),
}

/// One logical artifact moving through a pipeline.
#[derive(Clone)]
pub struct File {
  ctx: Arc<FileCtx>,
  initial_path: Option<PathBuf>,
  base: PathBuf,
  name: Option<String>,
  encoding: Encoding,
  stats: Option<FileStat>,
  source: Slot,
  target: Slot,
  loaded: bool,
  modified: bool,
  sourcemap: Option<SourceMap>,
  mode_override: Option<BuildMode>,
  errors: u32,
  warnings: u32,
  entries: Vec<LogEntry>,
  deps: Vec<PathBuf>,
  refs: Vec<PathBuf>,
  line_index: Option<Vec<usize>>,
}

impl fmt::Debug for File {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("File")
      .field("src", &self.src_display())
      .field("name", &self.name)
      .field("modified", &self.modified)
      .field("errors", &self.errors)
      .finish_non_exhaustive()
  }
}

impl File {
  /// A file discovered on disk under a pattern base.
  pub fn from_disk(ctx: Arc<FileCtx>, base: impl Into<PathBuf>, path: impl Into<PathBuf>, stats: Option<FileStat>) -> File {
    let base = base.into();
    let path = path.into();
    let name = relative_path(&base, &path);
    let mut file = File {
      ctx,
      initial_path: Some(path),
      base,
      name: Some(name),
      encoding: Encoding::Utf8,
      stats,
      source: Slot::default(),
      target: Slot::default(),
      loaded: false,
      modified: false,
      sourcemap: None,
      mode_override: None,
      errors: 0,
      warnings: 0,
      entries: Vec::new(),
      deps: Vec::new(),
      refs: Vec::new(),
      line_index: None,
    };
    file.encoding = file.ctx.settings.encoding.resolve(&file);
    file
  }

  /// A file created by a processor, with no on-disk origin.
  pub fn in_memory(ctx: Arc<FileCtx>, base: impl Into<PathBuf>, name: impl Into<String>) -> File {
    let mut file = File {
      ctx,
      initial_path: None,
      base: base.into(),
      name: Some(name.into()),
      encoding: Encoding::Utf8,
      stats: None,
      source: Slot::default(),
      target: Slot::default(),
      loaded: true,
      modified: false,
      sourcemap: None,
      mode_override: None,
      errors: 0,
      warnings: 0,
      entries: Vec::new(),
      deps: Vec::new(),
      refs: Vec::new(),
      line_index: None,
    };
    file.encoding = file.ctx.settings.encoding.resolve(&file);
    file
  }

  /// A new generated file sharing this file's context and base.
  pub fn derived(&self, name: impl Into<String>) -> File {
    File::in_memory(self.ctx.clone(), self.base.clone(), name)
  }

  #[cfg(test)]
  pub(crate) fn detached_for_tests() -> File {
    use crate::observer::NoopObserver;
    let ctx = FileCtx::new(Settings::default(), Arc::new(NoopObserver));
    File::in_memory(ctx, "/", "test.txt")
  }

  pub(crate) fn ctx(&self) -> &Arc<FileCtx> {
    &self.ctx
  }

  // --- identity -----------------------------------------------------------

  /// The on-disk origin, absent for generated files.
  pub fn initial_path(&self) -> Option<&Path> {
    self.initial_path.as_deref()
  }

  /// The origin path for display: `<generated>` when there is none.
  pub fn src_display(&self) -> String {
    match &self.initial_path {
      Some(path) => path.display().to_string(),
      None => "<generated>".to_string(),
    }
  }

  pub fn generated(&self) -> bool {
    self.initial_path.is_none()
  }

  /// Whether a source was found on disk.
  pub fn exists(&self) -> bool {
    self.stats.is_some()
  }

  pub fn stats(&self) -> Option<&FileStat> {
    self.stats.as_ref()
  }

  pub fn base(&self) -> &Path {
    &self.base
  }

  /// Re-anchor the logical name; `path` changes with it.
  pub fn set_base(&mut self, base: impl Into<PathBuf>) {
    self.base = base.into();
  }

  /// The logical `/`-separated name relative to `base`.
  pub fn name(&self) -> Option<&str> {
    self.name.as_deref()
  }

  pub fn set_name(&mut self, name: impl Into<String>) {
    self.name = Some(name.into().replace('\\', "/"));
  }

  /// `base` + `name`, the logical absolute path.
  pub fn path(&self) -> Option<PathBuf> {
    self.name.as_ref().map(|name| self.base.join(name))
  }

  /// Where a plain `save()` would write: the logical path, falling back
  /// to the source path.
  pub fn dest_path(&self) -> PathBuf {
    self
      .path()
      .or_else(|| self.initial_path.clone())
      .unwrap_or_else(|| PathBuf::from("<generated>"))
  }

  /// The directory part of the logical name (empty for bare names).
  pub fn dir(&self) -> Option<&str> {
    self.name.as_deref().map(|n| split_name(n).0)
  }

  pub fn set_dir(&mut self, dir: &str) {
    let file_name = self.file_name().unwrap_or_default().to_string();
    let dir = dir.trim_end_matches('/');
    self.name = Some(if dir.is_empty() {
      file_name
    } else {
      format!("{}/{}", dir, file_name)
    });
  }

  /// The file-name part of the logical name.
  pub fn file_name(&self) -> Option<&str> {
    self.name.as_deref().map(|n| split_name(n).1)
  }

  /// The extension including the dot, empty when there is none.
  pub fn ext(&self) -> Option<&str> {
    self.file_name().map(|f| split_ext(f).1)
  }

  /// Swap the extension; `ext` may come with or without the leading dot.
  pub fn set_ext(&mut self, ext: &str) {
    let Some(name) = self.name.as_deref() else {
      return;
    };
    let (dir, file_name) = split_name(name);
    let stem = split_ext(file_name).0.to_string();
    let dot = if ext.is_empty() || ext.starts_with('.') { "" } else { "." };
    let new_name = if dir.is_empty() {
      format!("{}{}{}", stem, dot, ext)
    } else {
      format!("{}/{}{}{}", dir, stem, dot, ext)
    };
    self.name = Some(new_name);
  }

  pub fn encoding(&self) -> Encoding {
    self.encoding
  }

  pub fn set_encoding(&mut self, encoding: Encoding) {
    self.encoding = encoding;
  }

  /// The effective build mode: a per-file override (set by the watcher
  /// for delete rebuilds) or the engine's mode.
  pub fn mode(&self) -> BuildMode {
    self.mode_override.unwrap_or(self.ctx.settings.build_mode)
  }

  pub fn set_mode_override(&mut self, mode: Option<BuildMode>) {
    self.mode_override = mode;
  }

  // --- content ------------------------------------------------------------

  pub fn modified(&self) -> bool {
    self.modified
  }

  /// The current text content: the target slot if a processor wrote one,
  /// otherwise the (loaded) source. Converts from bytes on demand.
  pub fn content(&mut self) -> &str {
    if self.target.text.is_none() {
      if let Some(buffer) = &self.target.buffer {
        self.target.text = Some(self.encoding.decode(buffer));
      }
    }
    if self.target.text.is_none() && self.source.text.is_none() {
      if let Some(buffer) = &self.source.buffer {
        self.source.text = Some(self.encoding.decode(buffer));
      }
    }
    match &self.target.text {
      Some(text) => text,
      None => self.source.text.as_deref().unwrap_or(""),
    }
  }

  /// The current byte content, converting from text on demand.
  pub fn buffer(&mut self) -> &[u8] {
    if self.target.buffer.is_none() {
      if let Some(text) = &self.target.text {
        self.target.buffer = Some(self.encoding.encode(text));
      }
    }
    if self.target.buffer.is_none() && self.source.buffer.is_none() {
      if let Some(text) = &self.source.text {
        self.source.buffer = Some(self.encoding.encode(text));
      }
    }
    match &self.target.buffer {
      Some(buffer) => buffer,
      None => self.source.buffer.as_deref().unwrap_or(&[]),
    }
  }

  /// Replace the content with text; invalidates the byte form and the
  /// line index, and marks the file modified.
  pub fn set_content(&mut self, content: impl Into<String>) {
    self.target.text = Some(content.into());
    self.target.buffer = None;
    self.modified = true;
    self.line_index = None;
  }

  /// Replace the content with bytes; the text twin of [`set_content`].
  pub fn set_buffer(&mut self, buffer: Vec<u8>) {
    self.target.buffer = Some(buffer);
    self.target.text = None;
    self.modified = true;
    self.line_index = None;
  }

  /// Whichever form the last writer set, without conversion.
  pub fn data(&self) -> Option<FileData<'_>> {
    if let Some(text) = &self.target.text {
      return Some(FileData::Text(text));
    }
    self.target.buffer.as_deref().map(FileData::Bytes)
  }

  /// The unprocessed source text (loaded from `initial_path`).
  pub fn src_content(&mut self) -> &str {
    if self.source.text.is_none() {
      if let Some(buffer) = &self.source.buffer {
        self.source.text = Some(self.encoding.decode(buffer));
      }
    }
    self.source.text.as_deref().unwrap_or("")
  }

  /// The unprocessed source bytes.
  pub fn src_buffer(&mut self) -> &[u8] {
    if self.source.buffer.is_none() {
      if let Some(text) = &self.source.text {
        self.source.buffer = Some(self.encoding.encode(text));
      }
    }
    self.source.buffer.as_deref().unwrap_or(&[])
  }

  /// Seed the source slot directly. Used by tests and by processors that
  /// synthesize input.
  pub fn set_src_content(&mut self, content: impl Into<String>) {
    self.source.text = Some(content.into());
    self.source.buffer = None;
    self.loaded = true;
  }

  /// Byte offsets of line starts in the current content, for
  /// position-to-offset queries. Cached until the content changes.
  pub fn line_index(&mut self) -> &[usize] {
    if self.line_index.is_none() {
      let content = self.content().to_string();
      let mut index = vec![0usize];
      for (offset, byte) in content.bytes().enumerate() {
        if byte == b'\n' {
          index.push(offset + 1);
        }
      }
      self.line_index = Some(index);
    }
    self.line_index.as_deref().unwrap_or(&[])
  }

  /// The text of one zero-based line of the current content.
  pub fn line_text(&mut self, line: u32) -> Option<String> {
    let index = self.line_index().to_vec();
    let start = *index.get(line as usize)?;
    let content = self.content();
    let end = index
      .get(line as usize + 1)
      .map(|next| next.saturating_sub(1))
      .unwrap_or(content.len());
    content.get(start..end).map(|s| s.trim_end_matches('\r').to_string())
  }

  // --- source map ---------------------------------------------------------

  pub fn source_map(&self) -> Option<&SourceMap> {
    self.sourcemap.as_ref()
  }

  /// Attach a map produced by the current stage. When an earlier stage
  /// already attached one whose `file` matches one of the new map's
  /// sources, the two are composed instead of replaced.
  pub fn attach_source_map(&mut self, mut map: SourceMap) {
    if let Some(previous) = &self.sourcemap {
      let connects = previous
        .file
        .as_ref()
        .map(|file| map.sources.iter().any(|s| s == file))
        .unwrap_or(false);
      if connects {
        map.apply_upstream(previous);
      }
    }
    self.sourcemap = Some(map);
  }

  pub fn take_source_map(&mut self) -> Option<SourceMap> {
    self.sourcemap.take()
  }

  // --- diagnostics --------------------------------------------------------

  pub fn error_count(&self) -> u32 {
    self.errors
  }

  pub fn warning_count(&self) -> u32 {
    self.warnings
  }

  pub fn log_entries(&self) -> &[LogEntry] {
    &self.entries
  }

  pub fn error(&mut self, message: impl Into<String>) {
    self.record(LogEntry::new(LogLevel::Error, message));
  }

  pub fn error_with(&mut self, message: impl Into<String>, error: &(dyn std::error::Error + 'static)) {
    self.record(LogEntry::new(LogLevel::Error, message).with_error(error));
  }

  pub fn error_at(&mut self, message: impl Into<String>, region: Region) {
    self.record(LogEntry::new(LogLevel::Error, message).with_region(region));
  }

  pub fn warning(&mut self, message: impl Into<String>) {
    self.record(LogEntry::new(LogLevel::Warning, message));
  }

  pub fn warning_at(&mut self, message: impl Into<String>, region: Region) {
    self.record(LogEntry::new(LogLevel::Warning, message).with_region(region));
  }

  pub fn verbose(&mut self, message: impl Into<String>) {
    self.record(LogEntry::new(LogLevel::Verbose, message));
  }

  /// Funnel for every diagnostic: count it, default the path, rewrite a
  /// generated-position region through the source map, attach a snippet,
  /// then hand it to the observer.
  pub fn record(&mut self, mut entry: LogEntry) {
    match entry.level {
      LogLevel::Error => {
        self.errors += 1;
        self.ctx.counters.add_error();
      }
      LogLevel::Warning => {
        self.warnings += 1;
        self.ctx.counters.add_warning();
      }
      _ => {}
    }

    if entry.path.is_none() {
      entry.path = self.initial_path.clone().or_else(|| self.path());
    }

    if let (Some(region), Some(map)) = (entry.region, &self.sourcemap) {
      if let Some(origin) = map.get_source(region.start_line, region.start_column, true) {
        entry.path = Some(resolve_path(&self.base, &origin.source));
        entry.region = Some(Region::at(origin.line, origin.column));
      }
    }

    if entry.snippet.is_none() {
      if let Some(region) = entry.region {
        // Only when the entry still points at this file's own content.
        let own = entry.path.as_deref() == self.initial_path.as_deref() || entry.path == self.path();
        if own {
          entry.snippet = self.line_text(region.start_line);
        }
      }
    }

    match entry.level {
      LogLevel::Error => tracing::error!(file = %self.src_display(), "{}", entry.message),
      LogLevel::Warning => tracing::warn!(file = %self.src_display(), "{}", entry.message),
      LogLevel::Info => tracing::info!(file = %self.src_display(), "{}", entry.message),
      LogLevel::Verbose => tracing::debug!(file = %self.src_display(), "{}", entry.message),
    }

    let observer = self.ctx.observer.clone();
    observer.file_log(&entry);
    self.entries.push(entry);
  }

  // --- dependency edges ---------------------------------------------------

  /// Declare that this file must be rebuilt when `path` changes.
  pub fn add_dep(&mut self, path: impl Into<PathBuf>) -> bool {
    let path = resolve_path(&self.ctx.settings.cwd, path.into());
    let observer = self.ctx.observer.clone();
    if !observer.file_dep(self, &path) {
      return false;
    }
    if !self.deps.contains(&path) {
      self.deps.push(path);
    }
    true
  }

  /// Declare that this file's build observed `path`, without making its
  /// changes invalidate this file.
  pub fn add_ref(&mut self, path: impl Into<PathBuf>) -> bool {
    let path = resolve_path(&self.ctx.settings.cwd, path.into());
    let observer = self.ctx.observer.clone();
    if !observer.file_ref(self, &path) {
      return false;
    }
    if !self.refs.contains(&path) {
      self.refs.push(path);
    }
    true
  }

  pub fn deps(&self) -> &[PathBuf] {
    &self.deps
  }

  pub fn refs(&self) -> &[PathBuf] {
    &self.refs
  }

  // --- I/O ----------------------------------------------------------------

  /// Ensure the source content is present, reading from disk at most
  /// once. A read failure is recorded as a file error and leaves an empty
  /// source buffer; processing continues. Returns whether a source is
  /// actually available.
  pub async fn load(&mut self) -> bool {
    if self.loaded {
      return true;
    }
    self.loaded = true;

    let Some(path) = self.initial_path.clone() else {
      return true;
    };
    let tries = self.ctx.settings.tries;

    match sluice_fs::read_file(&path, tries).await {
      Ok(bytes) => {
        if self.stats.is_none() {
          self.stats = sluice_fs::stat_if_exists(&path, tries).await.ok().flatten();
        }
        self.source.buffer = Some(bytes);
        self.source.text = None;
        true
      }
      Err(error) => {
        self.source.buffer = Some(Vec::new());
        self.error_with(format!("cannot read {}", path.display()), &error);
        false
      }
    }
  }

  /// Destination for a save into `dir` (or the file's own path).
  pub fn resolve_dest(&self, dir: Option<&Path>) -> PathBuf {
    match dir {
      Some(dir) => {
        let root = resolve_path(&self.ctx.settings.cwd, dir);
        match &self.name {
          Some(name) => root.join(name),
          None => root.join("<generated>"),
        }
      }
      None => self.dest_path(),
    }
  }

  /// Persist the file according to the effective build mode. I/O errors
  /// are returned; policy refusals are logged against the file and
  /// reported in the outcome.
  pub async fn save(&mut self, dir: Option<&Path>) -> Result<SaveOutcome, FsError> {
    let mode = self.mode();
    let dest = self.resolve_dest(dir);
    let tries = self.ctx.settings.tries;

    match mode {
      BuildMode::Preview => {
        self.ctx.counters.add_file();
        let observer = self.ctx.observer.clone();
        observer.file_save(self, &dest);
        Ok(SaveOutcome::Previewed)
      }

      BuildMode::Clean => {
        let map_path = sibling_map_path(&dest);
        if let Some(sink) = self.ctx.sink() {
          sink.remove(&dest);
          sink.remove(&map_path);
        } else {
          sluice_fs::delete_file_if_exists(&dest, tries).await?;
          sluice_fs::delete_file_if_exists(&map_path, tries).await?;
          if let Some(parent) = dest.parent() {
            sluice_fs::prune_empty_parents(parent, None).await?;
          }
        }
        self.ctx.counters.add_file();
        let observer = self.ctx.observer.clone();
        observer.file_delete(self, &dest);
        Ok(SaveOutcome::Cleaned)
      }

      BuildMode::Build | BuildMode::Watch | BuildMode::Server => {
        let observer = self.ctx.observer.clone();
        if !observer.file_validate(self) {
          return Ok(SaveOutcome::Vetoed);
        }

        let onto_source = self.initial_path.as_deref() == Some(dest.as_path());
        if onto_source {
          if !self.modified {
            return Ok(SaveOutcome::Skipped);
          }
          if !self.ctx.settings.overwrite {
            self.error(format!(
              "refusing to overwrite source file {} (enable overwrite to allow)",
              dest.display()
            ));
            return Ok(SaveOutcome::Refused);
          }
        }

        // An unmodified copy still needs its source bytes.
        if !self.modified && !self.loaded {
          self.load().await;
        }

        let (bytes, sidecar) = self.prepare_output(&dest)?;

        if let Some(sink) = self.ctx.sink() {
          sink.insert(dest.clone(), bytes);
          if let Some((map_path, map_bytes)) = sidecar {
            sink.insert(map_path, map_bytes);
          }
        } else {
          sluice_fs::write_file(&dest, &bytes, tries).await?;
          if let Some((map_path, map_bytes)) = sidecar {
            sluice_fs::write_file(&map_path, &map_bytes, tries).await?;
          }
        }

        self.ctx.counters.add_file();
        let observer = self.ctx.observer.clone();
        observer.file_save(self, &dest);
        tracing::debug!(dest = %dest.display(), "saved");
        Ok(SaveOutcome::Written)
      }
    }
  }

  /// Final bytes for `dest`, plus an optional `.map` sidecar.
  #[allow(clippy::type_complexity)]
  fn prepare_output(&mut self, dest: &Path) -> Result<(Vec<u8>, Option<(PathBuf, Vec<u8>)>), FsError> {
    let want_map = self.ctx.settings.source_map.resolve(self) && self.sourcemap.is_some();
    if !want_map {
      return Ok((self.buffer().to_vec(), None));
    }

    let mut map = self.sourcemap.clone().unwrap_or_default();
    let observer = self.ctx.observer.clone();
    if !observer.source_map_validate(self, &map) {
      return Ok((self.buffer().to_vec(), None));
    }

    let settings = &self.ctx.settings;
    let dest_dir = dest.parent().map(Path::to_path_buf).unwrap_or_default();

    // Source paths are stored absolute inside the engine; emitted maps
    // reference them relative to the map's own location.
    for source in map.sources.iter_mut() {
      let absolute = resolve_path(&settings.cwd, &*source);
      if absolute.is_absolute() && !dest_dir.as_os_str().is_empty() {
        *source = relative_path(&dest_dir, &absolute);
      }
    }

    map.file = if settings.source_map_include_file {
      dest.file_name().map(|n| n.to_string_lossy().into_owned())
    } else {
      None
    };
    map.source_root = settings.source_map_root.clone();
    if !settings.source_map_include_names {
      map.names.clear();
      for row in map.mappings.iter_mut() {
        for mapping in row.iter_mut() {
          mapping.name = None;
        }
      }
    }
    if !settings.source_map_include_sources_content {
      for content in map.sources_content.iter_mut() {
        *content = None;
      }
    }

    let inline = settings.source_map_inline.resolve(self);
    let emit = settings.source_map_emit.resolve(self);
    let map_path = sibling_map_path(dest);

    let mut sidecar = None;
    let url = if inline {
      map.to_data_uri()
    } else {
      sidecar = Some((map_path.clone(), map.to_json().into_bytes()));
      map_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
    };

    let bytes = if emit {
      let single_line = single_line_comment_style(dest);
      let content = emit_source_map_url(self.content(), &url, single_line);
      self.encoding.encode(&content)
    } else {
      self.buffer().to_vec()
    };

    Ok((bytes, sidecar))
  }

  /// Delete the source file from disk. A no-op for generated files.
  pub async fn delete(&mut self, delete_empty_parent: bool) -> Result<bool, FsError> {
    let Some(path) = self.initial_path.clone() else {
      return Ok(false);
    };
    let tries = self.ctx.settings.tries;
    let removed = sluice_fs::delete_file_if_exists(&path, tries).await?;
    if delete_empty_parent {
      if let Some(parent) = path.parent() {
        sluice_fs::prune_empty_parents(parent, None).await?;
      }
    }
    let observer = self.ctx.observer.clone();
    observer.file_delete(self, &path);
    Ok(removed)
  }
}

/// `<destPath>.map`.
pub(crate) fn sibling_map_path(dest: &Path) -> PathBuf {
  let mut os = dest.as_os_str().to_os_string();
  os.push(".map");
  PathBuf::from(os)
}

/// `//#` for script-like files, `/*# */` for everything else.
fn single_line_comment_style(dest: &Path) -> bool {
  matches!(
    dest.extension().and_then(|e| e.to_str()),
    Some("js") | Some("mjs") | Some("cjs") | Some("jsx") | Some("ts") | Some("tsx")
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::observer::NoopObserver;
  use sluice_core::Mapping;
  use tempfile::TempDir;

  fn ctx_with(settings: Settings) -> Arc<FileCtx> {
    FileCtx::new(settings, Arc::new(NoopObserver))
  }

  fn disk_file(ctx: &Arc<FileCtx>, tmp: &TempDir, rel: &str, content: &str) -> File {
    let path = tmp.path().join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, content).unwrap();
    File::from_disk(ctx.clone(), tmp.path(), path, None)
  }

  #[test]
  fn name_and_path_derivation() {
    let ctx = ctx_with(Settings::default());
    let file = File::from_disk(ctx, "/work", "/work/sub/app.js", None);

    assert_eq!(file.name(), Some("sub/app.js"));
    assert_eq!(file.path(), Some(PathBuf::from("/work/sub/app.js")));
    assert_eq!(file.dir(), Some("sub"));
    assert_eq!(file.file_name(), Some("app.js"));
    assert_eq!(file.ext(), Some(".js"));
    assert!(!file.generated());
  }

  #[test]
  fn set_ext_and_dir_recompute_name() {
    let ctx = ctx_with(Settings::default());
    let mut file = File::from_disk(ctx, "/work", "/work/sub/app.scss", None);

    file.set_ext("css");
    assert_eq!(file.name(), Some("sub/app.css"));

    file.set_dir("styles/final");
    assert_eq!(file.name(), Some("styles/final/app.css"));
    assert_eq!(file.path(), Some(PathBuf::from("/work/styles/final/app.css")));
  }

  #[test]
  fn content_buffer_duality() {
    let mut file = File::detached_for_tests();
    file.set_content("héllo");
    assert_eq!(file.buffer(), "héllo".as_bytes());
    assert!(file.modified());

    file.set_buffer(b"bytes".to_vec());
    assert_eq!(file.content(), "bytes");
    assert_eq!(file.data(), Some(FileData::Bytes(b"bytes".as_slice())));
  }

  #[test]
  fn setting_content_invalidates_line_index() {
    let mut file = File::detached_for_tests();
    file.set_content("one\ntwo\nthree");
    assert_eq!(file.line_index(), &[0, 4, 8]);
    assert_eq!(file.line_text(1).as_deref(), Some("two"));

    file.set_content("a\nb");
    assert_eq!(file.line_index(), &[0, 2]);
  }

  #[test]
  fn generated_files_have_no_source() {
    let ctx = ctx_with(Settings::default());
    let file = File::in_memory(ctx, "/work", "bundle.js");
    assert!(file.generated());
    assert_eq!(file.src_display(), "<generated>");
    assert_eq!(file.dest_path(), PathBuf::from("/work/bundle.js"));
  }

  #[tokio::test]
  async fn load_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let ctx = ctx_with(Settings::default());
    let mut file = disk_file(&ctx, &tmp, "a.txt", "first");

    assert!(file.load().await);
    std::fs::write(tmp.path().join("a.txt"), "second").unwrap();
    assert!(file.load().await);
    assert_eq!(file.src_content(), "first");
  }

  #[tokio::test]
  async fn load_failure_is_recorded_not_fatal() {
    let tmp = TempDir::new().unwrap();
    let ctx = ctx_with(Settings::default());
    let mut file = File::from_disk(ctx, tmp.path(), tmp.path().join("missing.txt"), None);

    assert!(!file.load().await);
    assert_eq!(file.error_count(), 1);
    assert_eq!(file.src_content(), "");
  }

  #[tokio::test]
  async fn save_writes_into_dest_dir() {
    let tmp = TempDir::new().unwrap();
    let mut settings = Settings::default();
    settings.cwd = tmp.path().to_path_buf();
    settings.source_map = crate::settings::Setting::Value(false);
    let ctx = ctx_with(settings);
    let mut file = disk_file(&ctx, &tmp, "sub/a.txt", "hello");

    let outcome = file.save(Some(Path::new("_out"))).await.unwrap();
    assert_eq!(outcome, SaveOutcome::Written);
    assert_eq!(
      std::fs::read_to_string(tmp.path().join("_out/sub/a.txt")).unwrap(),
      "hello"
    );
  }

  #[tokio::test]
  async fn save_refuses_source_overwrite() {
    let tmp = TempDir::new().unwrap();
    let mut settings = Settings::default();
    settings.cwd = tmp.path().to_path_buf();
    let ctx = ctx_with(settings);
    let mut file = disk_file(&ctx, &tmp, "a.txt", "hello");

    file.set_content("mutated");
    let outcome = file.save(None).await.unwrap();
    assert_eq!(outcome, SaveOutcome::Refused);
    assert_eq!(file.error_count(), 1);
    assert_eq!(std::fs::read_to_string(tmp.path().join("a.txt")).unwrap(), "hello");
  }

  #[tokio::test]
  async fn save_skips_unmodified_onto_source() {
    let tmp = TempDir::new().unwrap();
    let mut settings = Settings::default();
    settings.cwd = tmp.path().to_path_buf();
    let ctx = ctx_with(settings);
    let mut file = disk_file(&ctx, &tmp, "a.txt", "hello");

    let outcome = file.save(None).await.unwrap();
    assert_eq!(outcome, SaveOutcome::Skipped);
  }

  #[tokio::test]
  async fn preview_counts_without_writing() {
    let tmp = TempDir::new().unwrap();
    let mut settings = Settings::default();
    settings.cwd = tmp.path().to_path_buf();
    settings.build_mode = BuildMode::Preview;
    let ctx = ctx_with(settings);
    let mut file = disk_file(&ctx, &tmp, "a.txt", "hello");
    file.set_content("hello!");

    let outcome = file.save(Some(Path::new("_out"))).await.unwrap();
    assert_eq!(outcome, SaveOutcome::Previewed);
    assert!(!tmp.path().join("_out").exists());
    assert_eq!(ctx.counters.snapshot().files, 1);
  }

  #[tokio::test]
  async fn clean_removes_outputs_and_empty_parents() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("_out/sub/a.txt");
    std::fs::create_dir_all(out.parent().unwrap()).unwrap();
    std::fs::write(&out, "stale").unwrap();

    let mut settings = Settings::default();
    settings.cwd = tmp.path().to_path_buf();
    settings.build_mode = BuildMode::Clean;
    let ctx = ctx_with(settings);
    let mut file = disk_file(&ctx, &tmp, "sub/a.txt", "hello");

    let outcome = file.save(Some(Path::new("_out"))).await.unwrap();
    assert_eq!(outcome, SaveOutcome::Cleaned);
    assert!(!out.exists());
    assert!(!tmp.path().join("_out").exists());
  }

  #[tokio::test]
  async fn server_mode_redirects_to_sink() {
    let tmp = TempDir::new().unwrap();
    let mut settings = Settings::default();
    settings.cwd = tmp.path().to_path_buf();
    settings.build_mode = BuildMode::Server;
    settings.source_map = crate::settings::Setting::Value(false);
    let ctx = ctx_with(settings);
    let sink = MemorySink::new();
    ctx.set_sink(sink.clone());

    let mut file = disk_file(&ctx, &tmp, "a.txt", "hello");
    file.set_content("served");
    file.save(Some(Path::new("_out"))).await.unwrap();

    let dest = tmp.path().join("_out/a.txt");
    assert_eq!(sink.get(&dest).unwrap(), b"served");
    assert!(!dest.exists());
  }

  #[tokio::test]
  async fn save_emits_sidecar_map_and_comment() {
    let tmp = TempDir::new().unwrap();
    let mut settings = Settings::default();
    settings.cwd = tmp.path().to_path_buf();
    let ctx = ctx_with(settings);
    let mut file = disk_file(&ctx, &tmp, "app.js", "var x;");

    file.set_content("var x;");
    let mut map = SourceMap::new();
    let src = map.ensure_source(tmp.path().join("app.js").to_string_lossy().as_ref());
    map.add_mapping(0, Mapping::new(0, src, 0, 0));
    file.attach_source_map(map);

    file.save(Some(Path::new("_out"))).await.unwrap();

    let written = std::fs::read_to_string(tmp.path().join("_out/app.js")).unwrap();
    assert!(written.contains("//# sourceMappingURL=app.js.map"));

    let map_text = std::fs::read_to_string(tmp.path().join("_out/app.js.map")).unwrap();
    let parsed = SourceMap::parse(&map_text).unwrap();
    assert_eq!(parsed.file.as_deref(), Some("app.js"));
    assert_eq!(parsed.sources, vec!["../app.js".to_string()]);
  }

  #[tokio::test]
  async fn inline_map_is_a_data_uri() {
    let tmp = TempDir::new().unwrap();
    let mut settings = Settings::default();
    settings.cwd = tmp.path().to_path_buf();
    settings.source_map_inline = crate::settings::Setting::Value(true);
    let ctx = ctx_with(settings);
    let mut file = disk_file(&ctx, &tmp, "app.js", "var x;");

    file.set_content("var x;");
    let mut map = SourceMap::new();
    let src = map.ensure_source("app.js");
    map.add_mapping(0, Mapping::new(0, src, 0, 0));
    file.attach_source_map(map);

    file.save(Some(Path::new("_out"))).await.unwrap();

    let written = std::fs::read_to_string(tmp.path().join("_out/app.js")).unwrap();
    assert!(written.contains("sourceMappingURL=data:application/json;base64,"));
    assert!(!tmp.path().join("_out/app.js.map").exists());
  }

  #[tokio::test]
  async fn delete_removes_source_and_prunes() {
    let tmp = TempDir::new().unwrap();
    let ctx = ctx_with(Settings::default());
    let mut file = disk_file(&ctx, &tmp, "deep/nested/a.txt", "x");

    assert!(file.delete(true).await.unwrap());
    assert!(!tmp.path().join("deep").exists());
  }

  #[test]
  fn clone_isolates_buffers() {
    let mut original = File::detached_for_tests();
    original.set_content("shared?");
    let mut copy = original.clone();
    copy.set_content("changed");

    assert_eq!(original.content(), "shared?");
    assert_eq!(copy.content(), "changed");
  }

  #[test]
  fn dep_and_ref_edges_deduplicate() {
    let mut file = File::detached_for_tests();
    assert!(file.add_dep("/work/common.css"));
    assert!(file.add_dep("/work/common.css"));
    assert_eq!(file.deps().len(), 1);

    assert!(file.add_ref("/work/seen.txt"));
    assert_eq!(file.refs().len(), 1);
  }

  #[test]
  fn diagnostics_rewrite_through_source_map() {
    let mut file = File::detached_for_tests();
    let mut map = SourceMap::new();
    let src = map.ensure_source("origin.src");
    map.add_mapping(2, Mapping::new(0, src, 41, 7));
    file.attach_source_map(map);

    file.error_at("bad token", Region::at(2, 3));

    let entry = file.log_entries().last().unwrap();
    assert_eq!(entry.path.as_deref(), Some(Path::new("/origin.src")));
    let region = entry.region.unwrap();
    assert_eq!(region.start_line, 41);
    assert_eq!(region.start_column, 10);
    assert_eq!(file.error_count(), 1);
  }
}
