//! Path utilities shared by the matcher, the file entity, and the walker.
//!
//! The engine keeps two kinds of path around: platform-native `Path`s for
//! talking to the filesystem, and logical names that always use `/` no
//! matter the host. The helpers here convert between the two and answer the
//! prefix questions the matcher and watcher keep asking.

use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR};

/// Whether path comparison on this host ignores case.
///
/// Mirrors the platform separator rule: a `\` separator host compares
/// case-insensitively.
pub const CASE_INSENSITIVE: bool = MAIN_SEPARATOR == '\\';

/// Normalize a path by resolving `.` and `..` components without touching
/// the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
  let mut components = Vec::new();

  for component in path.components() {
    match component {
      Component::ParentDir => {
        match components.last() {
          Some(Component::Normal(_)) => {
            components.pop();
          }
          Some(Component::RootDir) | Some(Component::Prefix(_)) => {
            // `..` above the root stays at the root
          }
          _ => components.push(component),
        }
      }
      Component::CurDir => {}
      other => components.push(other),
    }
  }

  components.iter().collect()
}

/// Resolve `path` against `base`, then normalize.
///
/// Absolute paths ignore `base`.
pub fn resolve_path<B: AsRef<Path>, P: AsRef<Path>>(base: B, path: P) -> PathBuf {
  let path = path.as_ref();
  if path.is_absolute() {
    normalize_path(path)
  } else {
    normalize_path(&base.as_ref().join(path))
  }
}

/// Compute the path of `to` relative to the directory `from`, using `/`
/// separators.
///
/// Falls back to the slash form of `to` when the two share no prefix (for
/// example different Windows drives).
pub fn relative_path<F: AsRef<Path>, T: AsRef<Path>>(from: F, to: T) -> String {
  let from = normalize_path(from.as_ref());
  let to = normalize_path(to.as_ref());

  let from_parts: Vec<Component<'_>> = from.components().collect();
  let to_parts: Vec<Component<'_>> = to.components().collect();

  let mut shared = 0;
  while shared < from_parts.len()
    && shared < to_parts.len()
    && component_eq(&from_parts[shared], &to_parts[shared])
  {
    shared += 1;
  }

  if shared == 0 && from.is_absolute() && to.is_absolute() {
    return to_slash(&to);
  }

  let mut out = Vec::new();
  for _ in shared..from_parts.len() {
    out.push("..".to_string());
  }
  for part in &to_parts[shared..] {
    out.push(part.as_os_str().to_string_lossy().into_owned());
  }

  if out.is_empty() {
    ".".to_string()
  } else {
    out.join("/")
  }
}

/// The longest directory shared by `a` and `b`, ending on a component
/// boundary. `None` when the paths share nothing (or either is relative
/// while the other is absolute).
pub fn common_dir<A: AsRef<Path>, B: AsRef<Path>>(a: A, b: B) -> Option<PathBuf> {
  let a = normalize_path(a.as_ref());
  let b = normalize_path(b.as_ref());

  let mut out = PathBuf::new();
  let mut shared = 0;
  for (ca, cb) in a.components().zip(b.components()) {
    if !component_eq(&ca, &cb) {
      break;
    }
    out.push(ca.as_os_str());
    shared += 1;
  }

  if shared == 0 {
    None
  } else {
    Some(out)
  }
}

/// True when `child` is `parent` itself or lives somewhere under it.
pub fn in_dir<P: AsRef<Path>, C: AsRef<Path>>(parent: P, child: C) -> bool {
  let parent = normalize_path(parent.as_ref());
  let child = normalize_path(child.as_ref());

  let mut parent_parts = parent.components();
  let mut child_parts = child.components();

  loop {
    match (parent_parts.next(), child_parts.next()) {
      (None, _) => return true,
      (Some(_), None) => return false,
      (Some(p), Some(c)) => {
        if !component_eq(&p, &c) {
          return false;
        }
      }
    }
  }
}

/// Render a path with `/` separators regardless of host.
pub fn to_slash(path: &Path) -> String {
  let text = path.to_string_lossy();
  if MAIN_SEPARATOR == '/' {
    text.into_owned()
  } else {
    text.replace(MAIN_SEPARATOR, "/")
  }
}

/// Split a logical (`/`-separated) name into directory and file name.
/// The directory part is empty for bare names.
pub fn split_name(name: &str) -> (&str, &str) {
  match name.rfind('/') {
    Some(idx) => (&name[..idx], &name[idx + 1..]),
    None => ("", name),
  }
}

/// Split a file name into stem and extension. The extension includes the
/// dot; a leading dot (dotfiles) does not start an extension.
pub fn split_ext(file_name: &str) -> (&str, &str) {
  match file_name.rfind('.') {
    Some(0) | None => (file_name, ""),
    Some(idx) => (&file_name[..idx], &file_name[idx..]),
  }
}

fn component_eq(a: &Component<'_>, b: &Component<'_>) -> bool {
  if CASE_INSENSITIVE {
    a.as_os_str().eq_ignore_ascii_case(b.as_os_str())
  } else {
    a == b
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn normalize_resolves_dots() {
    assert_eq!(normalize_path(Path::new("/foo/bar/../baz")), PathBuf::from("/foo/baz"));
    assert_eq!(normalize_path(Path::new("/foo/./bar")), PathBuf::from("/foo/bar"));
    assert_eq!(normalize_path(Path::new("/foo/bar/../../baz")), PathBuf::from("/baz"));
    assert_eq!(normalize_path(Path::new("/../a")), PathBuf::from("/a"));
  }

  #[test]
  fn resolve_against_base() {
    assert_eq!(resolve_path("/work", "src/a.txt"), PathBuf::from("/work/src/a.txt"));
    assert_eq!(resolve_path("/work", "/etc/hosts"), PathBuf::from("/etc/hosts"));
    assert_eq!(resolve_path("/work/sub", "../a"), PathBuf::from("/work/a"));
  }

  #[test]
  fn relative_basic() {
    assert_eq!(relative_path("/a/b", "/a/b/c/d.txt"), "c/d.txt");
    assert_eq!(relative_path("/a/b/c", "/a/x"), "../../x");
    assert_eq!(relative_path("/a/b", "/a/b"), ".");
  }

  #[test]
  fn relative_resolve_roundtrip() {
    let base = Path::new("/work/site");
    for target in ["/work/site/css/app.css", "/work/other/x", "/top.txt"] {
      let rel = relative_path(base, target);
      assert_eq!(resolve_path(base, rel), PathBuf::from(target));
    }
  }

  #[test]
  fn common_dir_boundary() {
    assert_eq!(common_dir("/a/bc/d", "/a/bx/e"), Some(PathBuf::from("/a")));
    assert_eq!(common_dir("/a/b", "/a/b/c"), Some(PathBuf::from("/a/b")));
    assert_eq!(common_dir("/a", "/b"), Some(PathBuf::from("/")));
  }

  #[test]
  fn in_dir_containment() {
    assert!(in_dir("/a/b", "/a/b/c.txt"));
    assert!(in_dir("/a/b", "/a/b"));
    assert!(!in_dir("/a/b", "/a/bc"));
    assert!(!in_dir("/a/b/c", "/a/b"));
  }

  #[test]
  fn name_splitting() {
    assert_eq!(split_name("sub/dir/file.txt"), ("sub/dir", "file.txt"));
    assert_eq!(split_name("file.txt"), ("", "file.txt"));
    assert_eq!(split_ext("file.tar.gz"), ("file.tar", ".gz"));
    assert_eq!(split_ext("Makefile"), ("Makefile", ""));
    assert_eq!(split_ext(".gitignore"), (".gitignore", ""));
  }
}
