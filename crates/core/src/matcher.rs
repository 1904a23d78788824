//! Pattern compilation and path matching.
//!
//! A [`Matcher`] is a compiled disjunction of include patterns plus an
//! optional nested exclude matcher. Patterns come in four shapes: glob
//! strings (a leading `!` marks an exclude), prebuilt regular expressions,
//! predicate functions, and whole nested matchers. Glob strings compile to
//! anchored regular expressions over `/`-separated absolute path text;
//! compilation is total, so any string yields a usable pattern.
//!
//! Each compiled pattern remembers its `base`: the longest fixed prefix
//! with no metacharacters. The matcher's own base is the common directory
//! of its include bases, which is where a source walk starts.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;

use crate::path::{common_dir, in_dir, normalize_path, resolve_path, to_slash, CASE_INSENSITIVE};

/// One user-supplied pattern, before compilation.
#[derive(Clone)]
pub enum Pattern {
  /// A glob string. `!`-prefixed globs are excludes.
  Glob(String),
  /// An arbitrary regular expression, tested unanchored against the
  /// `/`-form of the absolute path.
  Regex(Regex),
  /// A predicate over the absolute path.
  Predicate(Arc<dyn Fn(&Path) -> bool + Send + Sync>),
  /// A prebuilt matcher used as a single include pattern.
  Matcher(Matcher),
  /// A list of patterns, flattened during compilation.
  List(Vec<Pattern>),
}

impl fmt::Debug for Pattern {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Pattern::Glob(g) => write!(f, "Glob({:?})", g),
      Pattern::Regex(r) => write!(f, "Regex({:?})", r.as_str()),
      Pattern::Predicate(_) => write!(f, "Predicate(..)"),
      Pattern::Matcher(m) => write!(f, "Matcher(base={:?})", m.base()),
      Pattern::List(l) => write!(f, "List({} patterns)", l.len()),
    }
  }
}

impl From<&str> for Pattern {
  fn from(value: &str) -> Self {
    Pattern::Glob(value.to_string())
  }
}

impl From<String> for Pattern {
  fn from(value: String) -> Self {
    Pattern::Glob(value)
  }
}

impl From<Regex> for Pattern {
  fn from(value: Regex) -> Self {
    Pattern::Regex(value)
  }
}

impl From<Matcher> for Pattern {
  fn from(value: Matcher) -> Self {
    Pattern::Matcher(value)
  }
}

impl<T: Into<Pattern>> From<Vec<T>> for Pattern {
  fn from(value: Vec<T>) -> Self {
    Pattern::List(value.into_iter().map(Into::into).collect())
  }
}

/// A single compiled include pattern.
#[derive(Clone)]
pub struct CompiledPattern {
  base: PathBuf,
  dir_only: bool,
  test: Test,
}

#[derive(Clone)]
enum Test {
  Regex(Regex),
  Predicate(Arc<dyn Fn(&Path) -> bool + Send + Sync>),
  Nested(Box<Matcher>),
}

impl CompiledPattern {
  /// The longest metacharacter-free prefix of the pattern; walks start here.
  pub fn base(&self) -> &Path {
    &self.base
  }

  /// Whether the glob carried a trailing `/` (directory-only).
  pub fn dir_only(&self) -> bool {
    self.dir_only
  }

  /// Test an absolute path against this pattern.
  pub fn matches(&self, path: &Path) -> bool {
    match &self.test {
      Test::Regex(re) => re.is_match(&to_slash(&normalize_path(path))),
      Test::Predicate(pred) => pred(path),
      Test::Nested(matcher) => matcher.matches(path),
    }
  }
}

impl fmt::Debug for CompiledPattern {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CompiledPattern")
      .field("base", &self.base)
      .field("dir_only", &self.dir_only)
      .finish_non_exhaustive()
  }
}

/// A compiled set of include patterns with an optional exclude matcher.
#[derive(Clone, Debug)]
pub struct Matcher {
  cwd: PathBuf,
  includes: Vec<CompiledPattern>,
  excludes: Option<Box<Matcher>>,
  base: PathBuf,
}

impl Matcher {
  /// Compile `patterns` relative to `cwd`.
  ///
  /// `!`-prefixed glob strings are collected into the nested exclude
  /// matcher; everything else becomes an include pattern.
  pub fn new<I>(cwd: impl Into<PathBuf>, patterns: I) -> Matcher
  where
    I: IntoIterator,
    I::Item: Into<Pattern>,
  {
    let cwd = normalize_path(&cwd.into());
    let mut includes = Vec::new();
    let mut exclude_globs = Vec::new();

    for pattern in patterns {
      collect(&cwd, pattern.into(), &mut includes, &mut exclude_globs);
    }

    let excludes = if exclude_globs.is_empty() {
      None
    } else {
      Some(Box::new(Matcher::new(
        cwd.clone(),
        exclude_globs.into_iter().map(Pattern::Glob),
      )))
    };

    let base = includes
      .iter()
      .map(|p| p.base.clone())
      .reduce(|a, b| common_dir(&a, &b).unwrap_or_else(|| PathBuf::from(std::path::MAIN_SEPARATOR.to_string())))
      .unwrap_or_else(|| cwd.clone());

    Matcher {
      cwd,
      includes,
      excludes,
      base,
    }
  }

  /// A matcher with no patterns: matches everything under `cwd` semantics.
  pub fn match_all(cwd: impl Into<PathBuf>) -> Matcher {
    Matcher::new(cwd, Vec::<Pattern>::new())
  }

  /// Compile with an explicit exclude set in addition to any `!` globs in
  /// `patterns`. Used for configuration surfaces that keep include and
  /// ignore lists separate.
  pub fn with_excludes<I, E>(cwd: impl Into<PathBuf>, patterns: I, excludes: E) -> Matcher
  where
    I: IntoIterator,
    I::Item: Into<Pattern>,
    E: IntoIterator,
    E::Item: Into<Pattern>,
  {
    let cwd = cwd.into();
    let mut matcher = Matcher::new(cwd.clone(), patterns);
    let extra: Vec<Pattern> = excludes.into_iter().map(Into::into).collect();
    if !extra.is_empty() {
      let extra_matcher = Matcher::new(cwd, extra);
      matcher.excludes = match matcher.excludes.take() {
        Some(existing) => {
          let mut merged = *existing;
          merged.includes.push(CompiledPattern {
            base: extra_matcher.base.clone(),
            dir_only: false,
            test: Test::Nested(Box::new(extra_matcher)),
          });
          Some(Box::new(merged))
        }
        None => Some(Box::new(extra_matcher)),
      };
    }
    matcher
  }

  /// The common directory of the include patterns' bases.
  pub fn base(&self) -> &Path {
    &self.base
  }

  /// The directory relative patterns were resolved against.
  pub fn cwd(&self) -> &Path {
    &self.cwd
  }

  /// The compiled include patterns, in declaration order.
  pub fn includes(&self) -> &[CompiledPattern] {
    &self.includes
  }

  /// True when the matcher has neither includes nor excludes.
  pub fn is_empty(&self) -> bool {
    self.includes.is_empty() && self.excludes.is_none()
  }

  /// Test an absolute path: some include matches (an empty include set
  /// counts everything as included) and no exclude matches.
  pub fn matches(&self, path: impl AsRef<Path>) -> bool {
    let path = path.as_ref();
    let included = self.includes.is_empty() || self.includes.iter().any(|p| p.matches(path));
    if !included {
      return false;
    }
    match &self.excludes {
      Some(ex) => !ex.matches(path),
      None => true,
    }
  }

  /// True when an exclude pattern matches `path`, regardless of includes.
  /// Walks use this to prune subtrees that could never produce a match.
  pub fn excluded(&self, path: impl AsRef<Path>) -> bool {
    match &self.excludes {
      Some(ex) => ex.matches(path.as_ref()),
      None => false,
    }
  }

  /// Whether a walk should bother descending into `dir`: true when some
  /// include pattern's subtree overlaps it (or there are no includes).
  pub fn could_contain_matches(&self, dir: impl AsRef<Path>) -> bool {
    let dir = dir.as_ref();
    if self.includes.is_empty() {
      return true;
    }
    self
      .includes
      .iter()
      .any(|p| in_dir(&p.base, dir) || in_dir(dir, &p.base))
  }
}

fn collect(cwd: &Path, pattern: Pattern, includes: &mut Vec<CompiledPattern>, excludes: &mut Vec<String>) {
  match pattern {
    Pattern::Glob(glob) => {
      if let Some(rest) = glob.strip_prefix('!') {
        excludes.push(rest.to_string());
      } else {
        includes.push(compile_glob(cwd, &glob));
      }
    }
    Pattern::Regex(re) => includes.push(CompiledPattern {
      base: cwd.to_path_buf(),
      dir_only: false,
      test: Test::Regex(re),
    }),
    Pattern::Predicate(pred) => includes.push(CompiledPattern {
      base: cwd.to_path_buf(),
      dir_only: false,
      test: Test::Predicate(pred),
    }),
    Pattern::Matcher(m) => includes.push(CompiledPattern {
      base: m.base.clone(),
      dir_only: false,
      test: Test::Nested(Box::new(m)),
    }),
    Pattern::List(list) => {
      for p in list {
        collect(cwd, p, includes, excludes);
      }
    }
  }
}

/// Compile one glob string into a pattern. Never fails: a glob the regex
/// engine rejects falls back to a literal match of its own text.
fn compile_glob(cwd: &Path, glob: &str) -> CompiledPattern {
  let (body, dir_only) = match glob.strip_suffix('/') {
    Some(rest) if !rest.is_empty() && !rest.ends_with('\\') => (rest, true),
    _ => (glob, false),
  };

  let cwd_slash = to_slash(cwd);

  // Anchor the pattern to an absolute slash-path form.
  let full = if is_absolute_glob(body) {
    body.to_string()
  } else if let Some(rest) = body.strip_prefix("./") {
    format!("{}/{}", cwd_slash, rest)
  } else if has_unescaped_slash(body) {
    format!("{}/{}", cwd_slash, body)
  } else {
    // Bare names match by basename anywhere under cwd.
    format!("{}/**/{}", cwd_slash, body)
  };

  let base = fixed_prefix(&full);
  let regex = glob_to_regex(&full, dir_only);

  CompiledPattern {
    base,
    dir_only,
    test: Test::Regex(regex),
  }
}

fn is_absolute_glob(glob: &str) -> bool {
  if glob.starts_with('/') {
    return true;
  }
  // Windows drive anchors.
  let bytes = glob.as_bytes();
  bytes.len() >= 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && (bytes[2] == b'/' || bytes[2] == b'\\')
}

fn has_unescaped_slash(glob: &str) -> bool {
  let mut chars = glob.chars();
  while let Some(c) = chars.next() {
    match c {
      '\\' => {
        chars.next();
      }
      '/' => return true,
      _ => {}
    }
  }
  false
}

/// The longest leading run of `/`-separated segments containing no
/// metacharacter, as a native path.
fn fixed_prefix(full: &str) -> PathBuf {
  let mut fixed = String::new();
  for segment in full.split('/') {
    if segment.chars().any(|c| matches!(c, '*' | '?' | '[' | '\\')) {
      break;
    }
    if !fixed.is_empty() {
      fixed.push('/');
    }
    fixed.push_str(segment);
  }
  if fixed.is_empty() {
    fixed.push('/');
  }
  // A leading empty segment means the path started at the root.
  if full.starts_with('/') && !fixed.starts_with('/') {
    fixed.insert(0, '/');
  }
  resolve_path("/", fixed)
}

fn glob_to_regex(full: &str, dir_only: bool) -> Regex {
  let mut out = String::new();
  if CASE_INSENSITIVE {
    out.push_str("(?i)");
  }
  out.push('^');

  let chars: Vec<char> = full.chars().collect();
  let mut i = 0;
  while i < chars.len() {
    let c = chars[i];
    match c {
      '\\' => {
        // Escape: next char is a literal. A trailing backslash is itself
        // a literal (unsupported escapes become literals).
        if i + 1 < chars.len() {
          push_literal(&mut out, chars[i + 1]);
          i += 2;
        } else {
          push_literal(&mut out, '\\');
          i += 1;
        }
      }
      '*' => {
        if i + 1 < chars.len() && chars[i + 1] == '*' {
          // `**/` also matches the empty run, so `a/**/b` covers `a/b`.
          if i + 2 < chars.len() && chars[i + 2] == '/' {
            out.push_str("(?:.*/)?");
            i += 3;
          } else {
            out.push_str(".*");
            i += 2;
          }
        } else {
          out.push_str("[^/]*");
          i += 1;
        }
      }
      '?' => {
        out.push_str("[^/]");
        i += 1;
      }
      '[' => {
        match parse_class(&chars, i) {
          Some((class, next)) => {
            out.push_str(&class);
            i = next;
          }
          None => {
            // Unterminated class: literal bracket.
            push_literal(&mut out, '[');
            i += 1;
          }
        }
      }
      other => {
        push_literal(&mut out, other);
        i += 1;
      }
    }
  }

  if dir_only {
    // Directory-only patterns cover the directory and its subtree.
    out.push_str("(?:/.*)?");
  }
  out.push('$');

  match Regex::new(&out) {
    Ok(re) => re,
    Err(_) => {
      // Total compilation: degrade to a literal match of the glob text.
      let literal = format!("^{}$", regex::escape(full));
      Regex::new(&literal).unwrap_or_else(|_| Regex::new("$^").unwrap())
    }
  }
}

fn push_literal(out: &mut String, c: char) {
  if regex_syntax_char(c) {
    out.push('\\');
  }
  out.push(c);
}

fn regex_syntax_char(c: char) -> bool {
  matches!(
    c,
    '.' | '+' | '*' | '?' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$' | '\\' | '#' | '&' | '-' | '~'
  )
}

/// Parse a `[...]` character class starting at `start`. Returns the regex
/// text and the index just past the closing bracket, or `None` when the
/// class never closes.
fn parse_class(chars: &[char], start: usize) -> Option<(String, usize)> {
  let mut i = start + 1;
  let mut body = String::new();
  let negated = matches!(chars.get(i), Some('^') | Some('!'));
  if negated {
    i += 1;
  }

  let mut first = true;
  while i < chars.len() {
    let c = chars[i];
    if c == ']' && !first {
      let prefix = if negated { "[^" } else { "[" };
      return Some((format!("{}{}]", prefix, body), i + 1));
    }
    match c {
      '\\' if i + 1 < chars.len() => {
        body.push('\\');
        body.push(chars[i + 1]);
        i += 2;
      }
      '-' => {
        body.push('-');
        i += 1;
      }
      other => {
        if matches!(other, '[' | ']' | '^' | '\\') {
          body.push('\\');
        }
        body.push(other);
        i += 1;
      }
    }
    first = false;
  }
  None
}

#[cfg(test)]
mod tests {
  use super::*;

  fn matcher(patterns: &[&str]) -> Matcher {
    Matcher::new("/work", patterns.iter().map(|p| Pattern::from(*p)))
  }

  #[test]
  fn star_does_not_cross_separators() {
    let m = matcher(&["./src/*.js"]);
    assert!(m.matches("/work/src/app.js"));
    assert!(!m.matches("/work/src/sub/app.js"));
    assert!(!m.matches("/work/src/app.ts"));
  }

  #[test]
  fn double_star_crosses_separators() {
    let m = matcher(&["./src/**/*.js"]);
    assert!(m.matches("/work/src/app.js"));
    assert!(m.matches("/work/src/a/b/c/app.js"));
    assert!(!m.matches("/work/other/app.js"));
  }

  #[test]
  fn question_mark_matches_one_char() {
    let m = matcher(&["./a?.txt"]);
    assert!(m.matches("/work/ab.txt"));
    assert!(!m.matches("/work/a.txt"));
    assert!(!m.matches("/work/a/x.txt"));
  }

  #[test]
  fn character_classes() {
    let m = matcher(&["./file[abc].txt"]);
    assert!(m.matches("/work/filea.txt"));
    assert!(m.matches("/work/filec.txt"));
    assert!(!m.matches("/work/filed.txt"));

    let neg = matcher(&["./file[^abc].txt"]);
    assert!(neg.matches("/work/filed.txt"));
    assert!(!neg.matches("/work/filea.txt"));
  }

  #[test]
  fn bare_names_match_anywhere() {
    let m = matcher(&["*.txt"]);
    assert!(m.matches("/work/top.txt"));
    assert!(m.matches("/work/deep/down/leaf.txt"));
    assert!(!m.matches("/elsewhere/leaf.txt"));
  }

  #[test]
  fn absolute_patterns_anchor_at_root() {
    let m = matcher(&["/opt/data/*.csv"]);
    assert!(m.matches("/opt/data/a.csv"));
    assert!(!m.matches("/work/opt/data/a.csv"));
    assert_eq!(m.base(), Path::new("/opt/data"));
  }

  #[test]
  fn trailing_slash_covers_subtree() {
    let m = matcher(&["./node_modules/"]);
    assert!(m.matches("/work/node_modules"));
    assert!(m.matches("/work/node_modules/pkg/index.js"));
    assert!(!m.matches("/work/node_modules_backup"));
  }

  #[test]
  fn excludes_subtract_from_includes() {
    let m = matcher(&["./src/**/*.js", "!./src/vendor/**"]);
    assert!(m.matches("/work/src/app.js"));
    assert!(!m.matches("/work/src/vendor/lib.js"));
  }

  #[test]
  fn empty_includes_match_all_minus_excludes() {
    let m = matcher(&["!*.log"]);
    assert!(m.matches("/work/anything/at/all.txt"));
    assert!(!m.matches("/work/debug.log"));
  }

  #[test]
  fn escapes_become_literals() {
    let m = matcher(&["./lit\\*eral.txt"]);
    assert!(m.matches("/work/lit*eral.txt"));
    assert!(!m.matches("/work/litXeral.txt"));
  }

  #[test]
  fn unterminated_class_is_literal() {
    // Compilation is total: the stray bracket matches itself.
    let m = matcher(&["./odd[name.txt"]);
    assert!(m.matches("/work/odd[name.txt"));
  }

  #[test]
  fn base_is_longest_fixed_prefix() {
    let m = matcher(&["./assets/img/**/*.png"]);
    assert_eq!(m.base(), Path::new("/work/assets/img"));

    let multi = matcher(&["./assets/img/*.png", "./assets/css/*.css"]);
    assert_eq!(multi.base(), Path::new("/work/assets"));
  }

  #[test]
  fn regex_pattern_matches_unanchored() {
    let m = Matcher::new("/work", [Pattern::Regex(Regex::new(r"\.tmp\d+$").unwrap())]);
    assert!(m.matches("/work/cache/file.tmp42"));
    assert!(!m.matches("/work/cache/file.tmp"));
  }

  #[test]
  fn predicate_pattern() {
    let m = Matcher::new(
      "/work",
      [Pattern::Predicate(Arc::new(|p: &Path| {
        p.extension().map(|e| e == "rs").unwrap_or(false)
      }))],
    );
    assert!(m.matches("/work/src/main.rs"));
    assert!(!m.matches("/work/src/main.c"));
  }

  #[test]
  fn nested_matcher_pattern() {
    let inner = matcher(&["./src/**"]);
    let outer = Matcher::new("/work", [Pattern::Matcher(inner)]);
    assert!(outer.matches("/work/src/x.txt"));
    assert!(!outer.matches("/work/out/x.txt"));
    assert_eq!(outer.base(), Path::new("/work/src"));
  }

  #[test]
  fn could_contain_matches_overlap() {
    let m = matcher(&["./src/**/*.js"]);
    assert!(m.could_contain_matches("/work"));
    assert!(m.could_contain_matches("/work/src"));
    assert!(m.could_contain_matches("/work/src/sub"));
    assert!(!m.could_contain_matches("/work/out"));
  }
}
