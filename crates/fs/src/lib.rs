//! sluice-fs: the filesystem facade the engine builds on.
//!
//! Every operation here re-attempts transient failures with a short
//! backoff, parks on a process-wide queue when the open-file limit is hit,
//! and creates missing parent directories for writes. Operations exist in
//! async form at the crate root and in sync form under [`sync`], sharing
//! the same error classification.

pub mod backpressure;
pub mod error;
pub mod ops;
pub mod sync;
pub mod walk;

pub use error::FsError;
pub use ops::{
  append_file, copy_file, create_dir, delete_dir, delete_file, delete_file_if_exists, move_file,
  prune_empty_parents, read_dir, read_file, read_file_if_exists, stat, stat_if_exists, write_file, DirEntry,
  FileStat, DEFAULT_TRIES,
};
pub use walk::{walk, WalkCaches, WalkCallbacks};
