//! sluice-core: foundational types for the sluice pipeline engine
//!
//! This crate provides the pieces of the engine that do no I/O:
//! - `path`: normalization, relativization, common-directory computation
//! - `matcher`: glob/regex/predicate patterns compiled into a `Matcher`
//! - `sourcemap`: a Source Map v3 codec (Base64-VLQ) with query and
//!   composition operations
//! - `encoding`: the buffer/text conversions a pipeline file goes through
//! - `mode`: build modes and log levels shared by every engine crate
//!
//! Everything here is synchronous and runtime-agnostic. The `sluice-fs` and
//! `sluice-lib` crates layer I/O and orchestration on top.

pub mod encoding;
pub mod matcher;
pub mod mode;
pub mod path;
pub mod sourcemap;

pub use encoding::Encoding;
pub use matcher::{Matcher, Pattern};
pub use mode::{BuildMode, LogLevel};
pub use sourcemap::{Mapping, SourceMap, SourceMapError};
