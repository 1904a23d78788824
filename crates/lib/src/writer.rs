//! Text concatenation with position tracking and synchronized mappings.
//!
//! [`Writer`] appends fragments while tracking the generated line and
//! column, inserting the configured indent after every emitted line break.
//! [`SourceMapWriter`] additionally maintains a source map: one mapping at
//! the start of every fragment and line, plus mappings at character-class
//! transitions so the map stays usable without recording every column.
//!
//! CRLF is emitted verbatim but counts as a single line break.

use sluice_core::{Mapping, SourceMap};

use crate::file::File;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
  Ident,
  Space,
  Punct,
}

fn class_of(c: char) -> CharClass {
  if c.is_alphanumeric() || c == '_' || c == '$' {
    CharClass::Ident
  } else if c.is_whitespace() {
    CharClass::Space
  } else {
    CharClass::Punct
  }
}

/// Append-only text writer tracking (line, column).
#[derive(Debug, Default)]
pub struct Writer {
  out: String,
  line: u32,
  column: u32,
  indent: String,
  pending_indent: bool,
}

impl Writer {
  pub fn new() -> Writer {
    Writer::default()
  }

  /// The indent inserted after each emitted line break, before the next
  /// non-empty line's text.
  pub fn set_indent(&mut self, indent: impl Into<String>) {
    self.indent = indent.into();
  }

  pub fn indent(&self) -> &str {
    &self.indent
  }

  pub fn line(&self) -> u32 {
    self.line
  }

  pub fn column(&self) -> u32 {
    self.column
  }

  pub fn write(&mut self, content: &str) {
    for c in content.chars() {
      self.push_char(c);
    }
  }

  pub(crate) fn push_char(&mut self, c: char) {
    match c {
      '\n' => {
        self.out.push('\n');
        self.line += 1;
        self.column = 0;
        self.pending_indent = !self.indent.is_empty();
      }
      // Emitted verbatim; the following '\n' does the line accounting.
      '\r' => self.out.push('\r'),
      other => {
        self.flush_indent();
        self.out.push(other);
        self.column += 1;
      }
    }
  }

  /// Insert the pending indent, if any. Mappings must be recorded after
  /// this so their columns include the indent.
  pub(crate) fn flush_indent(&mut self) {
    if self.pending_indent {
      self.pending_indent = false;
      self.column += self.indent.chars().count() as u32;
      let indent = self.indent.clone();
      self.out.push_str(&indent);
    }
  }

  pub fn as_str(&self) -> &str {
    &self.out
  }

  pub fn into_string(self) -> String {
    self.out
  }
}

/// Where a fragment's text came from.
#[derive(Debug, Clone, Copy)]
pub struct FragmentSource<'a> {
  pub path: &'a str,
  pub line: u32,
  pub column: u32,
}

impl<'a> FragmentSource<'a> {
  pub fn start_of(path: &'a str) -> FragmentSource<'a> {
    FragmentSource { path, line: 0, column: 0 }
  }
}

/// A [`Writer`] that also builds the combined source map.
#[derive(Debug, Default)]
pub struct SourceMapWriter {
  writer: Writer,
  map: SourceMap,
  line_mappings_only: bool,
}

impl SourceMapWriter {
  pub fn new() -> SourceMapWriter {
    SourceMapWriter::default()
  }

  /// Record only fragment-start and line-start mappings, skipping the
  /// character-class transition points.
  pub fn line_mappings_only() -> SourceMapWriter {
    SourceMapWriter {
      line_mappings_only: true,
      ..SourceMapWriter::default()
    }
  }

  pub fn set_indent(&mut self, indent: impl Into<String>) {
    self.writer.set_indent(indent);
  }

  pub fn writer(&self) -> &Writer {
    &self.writer
  }

  pub fn map(&self) -> &SourceMap {
    &self.map
  }

  /// Append a whole fragment attributed to `source`.
  pub fn write(&mut self, content: &str, source: Option<FragmentSource<'_>>) {
    self.write_range(content, 0, content.len(), source);
  }

  /// Append `content[start..end]` attributed to `source`, whose line and
  /// column describe the start of the slice.
  pub fn write_range(&mut self, content: &str, start: usize, end: usize, source: Option<FragmentSource<'_>>) {
    let slice = &content[start..end];
    let source_index = source.map(|s| self.map.ensure_source(s.path));
    let mut src_line = source.map(|s| s.line).unwrap_or(0);
    let mut src_column = source.map(|s| s.column).unwrap_or(0);

    let mut prev_class: Option<CharClass> = None;
    let mut need_mapping = true;

    for c in slice.chars() {
      if c == '\n' {
        self.writer.push_char(c);
        src_line += 1;
        src_column = 0;
        prev_class = None;
        need_mapping = true;
        continue;
      }
      if c == '\r' {
        self.writer.push_char(c);
        continue;
      }

      let class = class_of(c);
      let transition = !self.line_mappings_only && prev_class.map(|p| p != class).unwrap_or(false);
      if let Some(idx) = source_index {
        if need_mapping || transition {
          self.writer.flush_indent();
          self.map.add_mapping(
            self.writer.line(),
            Mapping {
              generated_column: self.writer.column(),
              source: Some(idx),
              source_line: src_line,
              source_column: src_column,
              name: None,
            },
          );
        }
      }

      self.writer.push_char(c);
      src_column += 1;
      prev_class = Some(class);
      need_mapping = false;
    }
  }

  /// Append `content[start..end]` copying the overlapping part of the
  /// fragment's own map, adjusted to the writer's current position.
  /// First-line mappings left of the slice start and last-line mappings at
  /// or beyond the slice end are dropped.
  pub fn write_mapped_range(&mut self, content: &str, start: usize, end: usize, fragment_map: &SourceMap) {
    self.writer.flush_indent();
    let base_line = self.writer.line();
    let base_column = self.writer.column();

    let (start_line, start_column) = position_at(content, start);
    let (end_line, end_column) = position_at(content, end);

    let indent_columns = self.writer.indent().chars().count() as u32;

    for (row_idx, row) in fragment_map.mappings.iter().enumerate() {
      let row_line = row_idx as u32;
      if row_line < start_line || row_line > end_line {
        continue;
      }
      for mapping in row {
        if row_line == start_line && mapping.generated_column < start_column {
          continue;
        }
        if row_line == end_line && mapping.generated_column >= end_column {
          continue;
        }

        let target_line = base_line + (row_line - start_line);
        let target_column = if row_line == start_line {
          base_column + (mapping.generated_column - start_column)
        } else if indent_columns > 0 {
          mapping.generated_column + indent_columns
        } else {
          mapping.generated_column
        };

        let mut copied = Mapping {
          generated_column: target_column,
          source: None,
          source_line: mapping.source_line,
          source_column: mapping.source_column,
          name: None,
        };
        if let Some(src) = mapping.source {
          if let Some(path) = fragment_map.sources.get(src as usize) {
            let idx = self.map.ensure_source(path);
            if let Some(Some(text)) = fragment_map.sources_content.get(src as usize) {
              self.map.set_source_content(idx, text.clone());
            }
            copied.source = Some(idx);
          }
        }
        if let Some(name) = mapping.name {
          if let Some(text) = fragment_map.names.get(name as usize) {
            copied.name = Some(self.map.ensure_name(text));
          }
        }
        self.map.add_mapping(target_line, copied);
      }
    }

    self.writer.write(&content[start..end]);
  }

  /// Append a whole fragment that carries its own map.
  pub fn write_mapped(&mut self, content: &str, fragment_map: &SourceMap) {
    self.write_mapped_range(content, 0, content.len(), fragment_map);
  }

  /// Finish: assign the accumulated content and map to `file`.
  pub fn end(self, file: &mut File) {
    let SourceMapWriter { writer, mut map, .. } = self;
    if map.file.is_none() {
      map.file = file.file_name().map(String::from);
    }
    file.set_content(writer.into_string());
    file.attach_source_map(map);
  }
}

/// Zero-based (line, column) of a byte offset in `content`.
fn position_at(content: &str, offset: usize) -> (u32, u32) {
  let mut line = 0u32;
  let mut column = 0u32;
  for (idx, c) in content.char_indices() {
    if idx >= offset {
      break;
    }
    if c == '\n' {
      line += 1;
      column = 0;
    } else if c != '\r' {
      column += 1;
    }
  }
  (line, column)
}
