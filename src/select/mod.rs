//! Tree selection for treepatch.
//!
//! Walks a source root and keeps the regular files an ordered rule list includes.

pub mod walker;

pub use walker::{SelectedPath, SkipPath, select};
