//! Source Map v3 parsing, generation, queries, and composition.
//!
//! The engine needs source maps for one reason: a pipeline is a chain of
//! transforms, and diagnostics at the end must point at the file the user
//! actually edited. Each processor that rewrites content may attach a map;
//! [`SourceMap::apply_upstream`] merges a later stage's map with the one
//! before it so the chain stays collapsible.
//!
//! Only plain revision-3 maps are supported. Indexed ("sections") maps and
//! other versions are rejected at parse time.

pub mod vlq;

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;
use thiserror::Error;

/// Errors from parsing or decoding a map.
#[derive(Debug, Error)]
pub enum SourceMapError {
  #[error("not a valid source map: {0}")]
  Json(#[from] serde_json::Error),

  #[error("unsupported source map version {0}")]
  UnsupportedVersion(u32),

  #[error("indexed (sections) source maps are not supported")]
  Indexed,

  #[error("truncated VLQ sequence in mappings")]
  TruncatedVlq,

  #[error("invalid VLQ digit {0:?} in mappings")]
  InvalidVlqDigit(char),

  #[error("VLQ value out of range")]
  VlqOverflow,

  #[error("mapping references source index {0} out of range")]
  SourceOutOfRange(i64),
}

/// One mapping point on a generated line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
  pub generated_column: u32,
  /// Index into `sources`; `None` for a point with no source attribution.
  pub source: Option<u32>,
  pub source_line: u32,
  pub source_column: u32,
  /// Index into `names`.
  pub name: Option<u32>,
}

impl Mapping {
  pub fn new(generated_column: u32, source: u32, source_line: u32, source_column: u32) -> Mapping {
    Mapping {
      generated_column,
      source: Some(source),
      source_line,
      source_column,
      name: None,
    }
  }
}

/// A resolved original position, the answer to "where did this generated
/// position come from".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePosition {
  pub source: String,
  pub line: u32,
  pub column: u32,
  pub name: Option<String>,
}

/// An in-memory Source Map v3.
///
/// `mappings` is a sparse two-dimensional table: one row per generated
/// line, each row sorted by generated column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceMap {
  pub file: Option<String>,
  pub source_root: Option<String>,
  pub sources: Vec<String>,
  pub sources_content: Vec<Option<String>>,
  pub names: Vec<String>,
  pub mappings: Vec<Vec<Mapping>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSourceMap {
  version: u32,
  file: Option<String>,
  source_root: Option<String>,
  #[serde(default)]
  sources: Vec<String>,
  sources_content: Option<Vec<Option<String>>>,
  #[serde(default)]
  names: Vec<String>,
  #[serde(default)]
  mappings: String,
  sections: Option<serde_json::Value>,
}

impl SourceMap {
  pub fn new() -> SourceMap {
    SourceMap::default()
  }

  /// Parse a JSON source map. Version ≠ 3 and indexed maps are rejected.
  pub fn parse(text: &str) -> Result<SourceMap, SourceMapError> {
    let raw: RawSourceMap = serde_json::from_str(text)?;
    if raw.sections.is_some() {
      return Err(SourceMapError::Indexed);
    }
    if raw.version != 3 {
      return Err(SourceMapError::UnsupportedVersion(raw.version));
    }

    let mappings = decode_mappings(&raw.mappings, raw.sources.len())?;
    let mut sources_content = raw.sources_content.unwrap_or_default();
    sources_content.resize(raw.sources.len(), None);

    Ok(SourceMap {
      file: raw.file,
      source_root: raw.source_root,
      sources: raw.sources,
      sources_content,
      names: raw.names,
      mappings,
    })
  }

  /// Emit the map as JSON. Optional fields are included when present;
  /// callers that want them stripped clear the fields first.
  pub fn to_json(&self) -> String {
    let mut obj = serde_json::Map::new();
    obj.insert("version".into(), serde_json::json!(3));
    if let Some(file) = &self.file {
      obj.insert("file".into(), serde_json::json!(file));
    }
    if let Some(root) = &self.source_root {
      obj.insert("sourceRoot".into(), serde_json::json!(root));
    }
    obj.insert("sources".into(), serde_json::json!(self.sources));
    if self.sources_content.iter().any(|c| c.is_some()) {
      obj.insert("sourcesContent".into(), serde_json::json!(self.sources_content));
    }
    obj.insert("names".into(), serde_json::json!(self.names));
    obj.insert("mappings".into(), serde_json::json!(encode_mappings(&self.mappings)));
    serde_json::Value::Object(obj).to_string()
  }

  /// The map as a `data:` URI suitable for inlining after a
  /// `sourceMappingURL=` marker.
  pub fn to_data_uri(&self) -> String {
    format!("data:application/json;base64,{}", BASE64.encode(self.to_json()))
  }

  /// True when no mapping points exist at all.
  pub fn is_empty(&self) -> bool {
    self.mappings.iter().all(|row| row.is_empty())
  }

  /// Index of `path` in `sources`, appending it if new.
  pub fn ensure_source(&mut self, path: &str) -> u32 {
    if let Some(idx) = self.sources.iter().position(|s| s == path) {
      return idx as u32;
    }
    self.sources.push(path.to_string());
    self.sources_content.push(None);
    (self.sources.len() - 1) as u32
  }

  /// Index of `name` in `names`, appending it if new.
  pub fn ensure_name(&mut self, name: &str) -> u32 {
    if let Some(idx) = self.names.iter().position(|n| n == name) {
      return idx as u32;
    }
    self.names.push(name.to_string());
    (self.names.len() - 1) as u32
  }

  /// Attach the original text of a source.
  pub fn set_source_content(&mut self, source: u32, content: String) {
    let idx = source as usize;
    if idx < self.sources_content.len() {
      self.sources_content[idx] = Some(content);
    }
  }

  /// Insert a mapping on `generated_line`, keeping the row sorted by
  /// generated column. A mapping at an already-mapped column replaces the
  /// old point.
  pub fn add_mapping(&mut self, generated_line: u32, mapping: Mapping) {
    let line = generated_line as usize;
    if self.mappings.len() <= line {
      self.mappings.resize(line + 1, Vec::new());
    }
    let row = &mut self.mappings[line];
    match row.binary_search_by_key(&mapping.generated_column, |m| m.generated_column) {
      Ok(pos) => row[pos] = mapping,
      Err(pos) => row.insert(pos, mapping),
    }
  }

  /// Resolve a generated position to its original position.
  ///
  /// Finds the greatest mapping at or left of `column` on `line` and
  /// projects the column offset into the source. When the line has no
  /// mapping and `search_prior_lines` is set, the nearest mapped prior
  /// line is used instead, projecting the line delta and keeping the
  /// queried column.
  pub fn get_source(&self, line: u32, column: u32, search_prior_lines: bool) -> Option<SourcePosition> {
    if let Some(mapping) = self.mapping_at(line, column) {
      let source = mapping.source? as usize;
      return Some(SourcePosition {
        source: self.sources.get(source)?.clone(),
        line: mapping.source_line,
        column: mapping.source_column + (column - mapping.generated_column),
        name: mapping.name.and_then(|n| self.names.get(n as usize).cloned()),
      });
    }

    if !search_prior_lines {
      return None;
    }

    let mut prior = line.min(self.mappings.len() as u32);
    while prior > 0 {
      prior -= 1;
      if let Some(mapping) = self.mappings.get(prior as usize).and_then(|row| row.last()) {
        let source = mapping.source? as usize;
        let delta = line - prior;
        return Some(SourcePosition {
          source: self.sources.get(source)?.clone(),
          line: mapping.source_line + delta,
          column,
          name: None,
        });
      }
    }
    None
  }

  /// Resolve an original position back to a generated one.
  ///
  /// Scans every row for mappings of `source` covering `(line, column)`
  /// and projects into the generated text, constrained so the projected
  /// column stays inside the mapping's span on its generated line.
  pub fn get_generated(&self, source: &str, line: u32, column: u32) -> Option<(u32, u32)> {
    let src_idx = self.sources.iter().position(|s| s == source)? as u32;

    for (row_line, row) in self.mappings.iter().enumerate() {
      for (idx, mapping) in row.iter().enumerate() {
        if mapping.source != Some(src_idx) || mapping.source_line != line || mapping.source_column > column {
          continue;
        }
        let projected = mapping.generated_column + (column - mapping.source_column);
        let in_span = match row.get(idx + 1) {
          Some(next) => projected < next.generated_column,
          None => true,
        };
        if in_span {
          return Some((row_line as u32, projected));
        }
      }
    }
    None
  }

  /// The greatest mapping at or left of `column` on `line`.
  fn mapping_at(&self, line: u32, column: u32) -> Option<&Mapping> {
    let row = self.mappings.get(line as usize)?;
    let idx = row.partition_point(|m| m.generated_column <= column);
    if idx == 0 {
      None
    } else {
      Some(&row[idx - 1])
    }
  }

  /// Rewrite this map through the map of the previous stage.
  ///
  /// `upstream.file` must name one of this map's sources `S`; every
  /// mapping attributed to `S` is re-attributed to the position upstream
  /// reports for it. When one mapping here spans several upstream
  /// mappings, extra points are inserted at the matching column offsets.
  /// `S` itself is removed from the source list. Mappings upstream cannot
  /// resolve lose their attribution.
  pub fn apply_upstream(&mut self, upstream: &SourceMap) {
    let Some(file) = upstream.file.as_deref() else {
      return;
    };
    let Some(stale) = self.sources.iter().position(|s| s == file) else {
      return;
    };
    let stale = stale as u32;

    // Rewritten sources are appended after the existing ones; the stale
    // index is compacted away at the end.
    let mut rows = std::mem::take(&mut self.mappings);
    for row in rows.iter_mut() {
      let mut rewritten: Vec<Mapping> = Vec::with_capacity(row.len());
      for idx in 0..row.len() {
        let mapping = row[idx];
        if mapping.source != Some(stale) {
          rewritten.push(mapping);
          continue;
        }

        let span = row.get(idx + 1).map(|next| next.generated_column - mapping.generated_column);

        match upstream.get_source(mapping.source_line, mapping.source_column, false) {
          Some(origin) => {
            let source = self.ensure_source(&origin.source);
            self.copy_source_content(upstream, &origin.source, source);
            rewritten.push(Mapping {
              generated_column: mapping.generated_column,
              source: Some(source),
              source_line: origin.line,
              source_column: origin.column,
              name: mapping.name,
            });
          }
          None => {
            rewritten.push(Mapping {
              source: None,
              name: None,
              ..mapping
            });
          }
        }

        // Splice in upstream points that fall inside this mapping's span.
        if let Some(span) = span {
          if let Some(upstream_row) = upstream.mappings.get(mapping.source_line as usize) {
            for inner in upstream_row {
              let from = mapping.source_column;
              if inner.generated_column <= from || inner.generated_column >= from + span {
                continue;
              }
              let Some(inner_source) = inner.source else {
                continue;
              };
              let Some(inner_path) = upstream.sources.get(inner_source as usize) else {
                continue;
              };
              let inner_path = inner_path.clone();
              let source = self.ensure_source(&inner_path);
              self.copy_source_content(upstream, &inner_path, source);
              rewritten.push(Mapping {
                generated_column: mapping.generated_column + (inner.generated_column - from),
                source: Some(source),
                source_line: inner.source_line,
                source_column: inner.source_column,
                name: None,
              });
            }
          }
        }
      }
      rewritten.sort_by_key(|m| m.generated_column);
      rewritten.dedup_by_key(|m| m.generated_column);
      *row = rewritten;
    }
    self.mappings = rows;

    self.remove_source(stale);
  }

  fn copy_source_content(&mut self, upstream: &SourceMap, path: &str, dest: u32) {
    if self.sources_content.get(dest as usize).map(|c| c.is_some()).unwrap_or(false) {
      return;
    }
    if let Some(idx) = upstream.sources.iter().position(|s| s == path) {
      if let Some(Some(content)) = upstream.sources_content.get(idx) {
        self.set_source_content(dest, content.clone());
      }
    }
  }

  fn remove_source(&mut self, stale: u32) {
    self.sources.remove(stale as usize);
    self.sources_content.remove(stale as usize);
    for row in self.mappings.iter_mut() {
      for mapping in row.iter_mut() {
        if let Some(src) = mapping.source {
          if src > stale {
            mapping.source = Some(src - 1);
          } else if src == stale {
            // Should have been rewritten; drop the attribution.
            mapping.source = None;
            mapping.name = None;
          }
        }
      }
    }
  }

  /// Fill unmapped rows by carrying the previous mapped row's trailing
  /// mapping one source line down per generated line.
  pub fn compute_lines(&mut self, total_lines: u32) {
    let total = total_lines as usize;
    if self.mappings.len() < total {
      self.mappings.resize(total, Vec::new());
    }

    let mut carry: Option<Mapping> = None;
    for row in self.mappings.iter_mut().take(total) {
      if let Some(last) = row.last().copied() {
        carry = Some(last);
        continue;
      }
      if let Some(prev) = carry.as_mut() {
        let next = Mapping {
          generated_column: 0,
          source: prev.source,
          source_line: prev.source_line + 1,
          source_column: 0,
          name: None,
        };
        row.push(next);
        *prev = next;
      }
    }
  }
}

/// Replace an existing `sourceMappingURL` comment in `content`, or append
/// one. `single_line` selects `//#` over `/*# ... */` for the appended
/// form; an existing comment keeps its own form.
pub fn emit_source_map_url(content: &str, url: &str, single_line: bool) -> String {
  // Both `#` and the legacy `@` marker are recognized.
  let line_re = regex::Regex::new(r"//[#@][ \t]*sourceMappingURL=\S*").unwrap();
  let block_re = regex::Regex::new(r"/\*[#@][ \t]*sourceMappingURL=[^*]*\*/").unwrap();

  if line_re.is_match(content) {
    return line_re
      .replace(content, format!("//# sourceMappingURL={}", url).as_str())
      .into_owned();
  }
  if block_re.is_match(content) {
    return block_re
      .replace(content, format!("/*# sourceMappingURL={} */", url).as_str())
      .into_owned();
  }

  if single_line {
    format!("{}\n//# sourceMappingURL={}", content, url)
  } else {
    format!("{}\n/*# sourceMappingURL={} */", content, url)
  }
}

fn decode_mappings(text: &str, source_count: usize) -> Result<Vec<Vec<Mapping>>, SourceMapError> {
  let mut rows: Vec<Vec<Mapping>> = Vec::new();
  let mut source: i64 = 0;
  let mut source_line: i64 = 0;
  let mut source_column: i64 = 0;
  let mut name: i64 = 0;

  for line_text in text.split(';') {
    let mut row = Vec::new();
    let mut generated_column: i64 = 0;

    for segment in line_text.split(',') {
      if segment.is_empty() {
        continue;
      }
      let seg_bytes = segment.as_bytes();
      let mut pos = 0;

      generated_column += vlq::decode(seg_bytes, &mut pos)?;
      let mut mapping = Mapping {
        generated_column: clamp_u32(generated_column)?,
        source: None,
        source_line: 0,
        source_column: 0,
        name: None,
      };

      if pos < seg_bytes.len() {
        source += vlq::decode(seg_bytes, &mut pos)?;
        source_line += vlq::decode(seg_bytes, &mut pos)?;
        source_column += vlq::decode(seg_bytes, &mut pos)?;
        if source < 0 || source as usize >= source_count {
          return Err(SourceMapError::SourceOutOfRange(source));
        }
        mapping.source = Some(source as u32);
        mapping.source_line = clamp_u32(source_line)?;
        mapping.source_column = clamp_u32(source_column)?;

        if pos < seg_bytes.len() {
          name += vlq::decode(seg_bytes, &mut pos)?;
          mapping.name = Some(clamp_u32(name)?);
        }
      }

      row.push(mapping);
    }

    row.sort_by_key(|m| m.generated_column);
    rows.push(row);
  }

  while rows.last().map(|r| r.is_empty()).unwrap_or(false) {
    rows.pop();
  }
  Ok(rows)
}

fn encode_mappings(rows: &[Vec<Mapping>]) -> String {
  let mut out = String::new();
  let mut source: i64 = 0;
  let mut source_line: i64 = 0;
  let mut source_column: i64 = 0;
  let mut name: i64 = 0;

  for (line_idx, row) in rows.iter().enumerate() {
    if line_idx > 0 {
      out.push(';');
    }
    let mut generated_column: i64 = 0;
    for (seg_idx, mapping) in row.iter().enumerate() {
      if seg_idx > 0 {
        out.push(',');
      }
      vlq::encode(i64::from(mapping.generated_column) - generated_column, &mut out);
      generated_column = i64::from(mapping.generated_column);

      if let Some(src) = mapping.source {
        vlq::encode(i64::from(src) - source, &mut out);
        source = i64::from(src);
        vlq::encode(i64::from(mapping.source_line) - source_line, &mut out);
        source_line = i64::from(mapping.source_line);
        vlq::encode(i64::from(mapping.source_column) - source_column, &mut out);
        source_column = i64::from(mapping.source_column);

        if let Some(n) = mapping.name {
          vlq::encode(i64::from(n) - name, &mut out);
          name = i64::from(n);
        }
      }
    }
  }
  out
}

fn clamp_u32(value: i64) -> Result<u32, SourceMapError> {
  u32::try_from(value).map_err(|_| SourceMapError::VlqOverflow)
}

/// Build an index from source path to the positions mapped from it, used
/// by validation hooks.
pub fn sources_in_use(map: &SourceMap) -> HashMap<String, usize> {
  let mut counts: HashMap<String, usize> = HashMap::new();
  for row in &map.mappings {
    for mapping in row {
      if let Some(src) = mapping.source {
        if let Some(path) = map.sources.get(src as usize) {
          *counts.entry(path.clone()).or_default() += 1;
        }
      }
    }
  }
  counts
}

#[cfg(test)]
mod tests {
  use super::*;

  fn simple_map() -> SourceMap {
    let mut map = SourceMap::new();
    map.file = Some("out.js".to_string());
    let a = map.ensure_source("a.js");
    let b = map.ensure_source("b.js");
    map.add_mapping(0, Mapping::new(0, a, 0, 0));
    map.add_mapping(1, Mapping::new(0, b, 0, 0));
    map
  }

  #[test]
  fn parse_rejects_bad_version() {
    let text = r#"{"version":2,"sources":[],"names":[],"mappings":""}"#;
    assert!(matches!(
      SourceMap::parse(text),
      Err(SourceMapError::UnsupportedVersion(2))
    ));
  }

  #[test]
  fn parse_rejects_indexed_maps() {
    let text = r#"{"version":3,"sections":[],"sources":[],"names":[],"mappings":""}"#;
    assert!(matches!(SourceMap::parse(text), Err(SourceMapError::Indexed)));
  }

  #[test]
  fn emit_parse_roundtrip() {
    let map = simple_map();
    let parsed = SourceMap::parse(&map.to_json()).unwrap();
    assert_eq!(parsed.mappings, map.mappings);
    assert_eq!(parsed.sources, map.sources);
    assert_eq!(parsed.file, map.file);
  }

  #[test]
  fn roundtrip_with_names_and_content() {
    let mut map = SourceMap::new();
    let src = map.ensure_source("x.ts");
    map.set_source_content(src, "let q = 1;".to_string());
    let name = map.ensure_name("q");
    map.add_mapping(
      0,
      Mapping {
        generated_column: 4,
        source: Some(src),
        source_line: 0,
        source_column: 4,
        name: Some(name),
      },
    );
    map.add_mapping(2, Mapping::new(0, src, 5, 2));

    let parsed = SourceMap::parse(&map.to_json()).unwrap();
    assert_eq!(parsed.mappings, map.mappings);
    assert_eq!(parsed.names, map.names);
    assert_eq!(parsed.sources_content, map.sources_content);
  }

  #[test]
  fn get_source_projects_column_offset() {
    let map = simple_map();
    let pos = map.get_source(0, 5, false).unwrap();
    assert_eq!(pos.source, "a.js");
    assert_eq!(pos.line, 0);
    assert_eq!(pos.column, 5);
  }

  #[test]
  fn get_source_prior_line_projection() {
    let map = simple_map();
    // Line 3 has no mappings; line 1 is the nearest mapped line.
    let pos = map.get_source(3, 7, true).unwrap();
    assert_eq!(pos.source, "b.js");
    assert_eq!(pos.line, 2);
    assert_eq!(pos.column, 7);

    assert!(map.get_source(3, 7, false).is_none());
  }

  #[test]
  fn get_generated_respects_span() {
    let mut map = SourceMap::new();
    let src = map.ensure_source("in.js");
    map.add_mapping(0, Mapping::new(0, src, 0, 0));
    map.add_mapping(0, Mapping::new(10, src, 0, 50));

    assert_eq!(map.get_generated("in.js", 0, 3), Some((0, 3)));
    assert_eq!(map.get_generated("in.js", 0, 52), Some((0, 12)));
    // Column 20 projects to generated column 20, outside the first
    // mapping's span and before the second mapping's source range starts.
    assert_eq!(map.get_generated("in.js", 0, 20), None);
    assert_eq!(map.get_generated("missing.js", 0, 0), None);
  }

  #[test]
  fn add_mapping_replaces_duplicate_columns() {
    let mut map = SourceMap::new();
    let src = map.ensure_source("s.js");
    map.add_mapping(0, Mapping::new(4, src, 0, 0));
    map.add_mapping(0, Mapping::new(4, src, 9, 9));
    assert_eq!(map.mappings[0].len(), 1);
    assert_eq!(map.mappings[0][0].source_line, 9);
  }

  #[test]
  fn apply_upstream_collapses_chain() {
    // Stage 1: origin.ts -> mid.js, mapping (1,1) <- generated (101,99).
    let mut upstream = SourceMap::new();
    upstream.file = Some("mid.js".to_string());
    let origin = upstream.ensure_source("origin.ts");
    upstream.add_mapping(101, Mapping::new(99, origin, 1, 1));

    // Stage 2: mid.js -> out.js, mapping (101,101) <- generated (201,202).
    let mut map = SourceMap::new();
    map.file = Some("out.js".to_string());
    let mid = map.ensure_source("mid.js");
    let name = map.ensure_name("x");
    map.add_mapping(
      201,
      Mapping {
        generated_column: 202,
        source: Some(mid),
        source_line: 101,
        source_column: 101,
        name: Some(name),
      },
    );

    map.apply_upstream(&upstream);

    // The intermediate source is gone.
    assert_eq!(map.sources, vec!["origin.ts".to_string()]);

    // Generated (201,202) now resolves to origin.ts (1,3): the upstream
    // mapping at column 99 plus the offset 101-99.
    let pos = map.get_source(201, 202, false).unwrap();
    assert_eq!(pos.source, "origin.ts");
    assert_eq!(pos.line, 1);
    assert_eq!(pos.column, 3);
    assert_eq!(pos.name.as_deref(), Some("x"));

    // And the original position projects back to the generated one.
    assert_eq!(map.get_generated("origin.ts", 1, 3), Some((201, 202)));
  }

  #[test]
  fn apply_upstream_splices_span() {
    // Upstream: two points on its generated line 0 at columns 0 and 4.
    let mut upstream = SourceMap::new();
    upstream.file = Some("mid.js".to_string());
    let a = upstream.ensure_source("a.src");
    let b = upstream.ensure_source("b.src");
    upstream.add_mapping(0, Mapping::new(0, a, 0, 0));
    upstream.add_mapping(0, Mapping::new(4, b, 7, 0));

    // Downstream: one wide mapping covering columns 0..10 of mid line 0.
    let mut map = SourceMap::new();
    let mid = map.ensure_source("mid.js");
    map.add_mapping(0, Mapping::new(0, mid, 0, 0));
    map.add_mapping(0, Mapping::new(10, mid, 1, 0));

    map.apply_upstream(&upstream);

    // The wide mapping was split at the inner upstream point.
    let row = &map.mappings[0];
    assert_eq!(row.len(), 3);
    let pos = map.get_source(0, 0, false).unwrap();
    assert_eq!(pos.source, "a.src");
    let pos = map.get_source(0, 4, false).unwrap();
    assert_eq!(pos.source, "b.src");
    assert_eq!(pos.line, 7);
    assert!(!map.sources.iter().any(|s| s == "mid.js"));
  }

  #[test]
  fn compute_lines_fills_gaps() {
    let mut map = SourceMap::new();
    let src = map.ensure_source("s.js");
    map.add_mapping(0, Mapping::new(0, src, 10, 0));
    map.compute_lines(4);

    assert_eq!(map.mappings.len(), 4);
    assert_eq!(map.mappings[1][0].source_line, 11);
    assert_eq!(map.mappings[2][0].source_line, 12);
    assert_eq!(map.mappings[3][0].source_line, 13);
    assert_eq!(map.mappings[3][0].generated_column, 0);
  }

  #[test]
  fn url_comment_replacement() {
    assert_eq!(
      emit_source_map_url("//# sourceMappingURL=b.js", "a.js", true),
      "//# sourceMappingURL=a.js"
    );
    assert_eq!(
      emit_source_map_url("body {}\n/*@ sourceMappingURL=old.map */", "new.map", false),
      "body {}\n/*# sourceMappingURL=new.map */"
    );
  }

  #[test]
  fn url_comment_appended_when_missing() {
    assert_eq!(
      emit_source_map_url("var x;", "a.js", true),
      "var x;\n//# sourceMappingURL=a.js"
    );
    assert_eq!(
      emit_source_map_url("var x;", "a.js", false),
      "var x;\n/*# sourceMappingURL=a.js */"
    );
  }

  #[test]
  fn data_uri_is_parseable() {
    let map = simple_map();
    let uri = map.to_data_uri();
    let prefix = "data:application/json;base64,";
    assert!(uri.starts_with(prefix));
    let decoded = BASE64.decode(&uri[prefix.len()..]).unwrap();
    let parsed = SourceMap::parse(std::str::from_utf8(&decoded).unwrap()).unwrap();
    assert_eq!(parsed.mappings, map.mappings);
  }

  #[test]
  fn sources_in_use_counts() {
    let map = simple_map();
    let counts = sources_in_use(&map);
    assert_eq!(counts.get("a.js"), Some(&1));
    assert_eq!(counts.get("b.js"), Some(&1));
  }
}
