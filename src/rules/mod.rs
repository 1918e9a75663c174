//! Ordered include/exclude rules for treepatch.
//!
//! This module handles:
//! - Translating filter patterns into segment-aware globs
//! - First-match-wins evaluation of a rule list against relative paths

pub mod matcher;
pub mod pattern;

pub use matcher::{CompiledRule, PathFilter, Rule, RuleKind, RuleSet, decide};
pub use pattern::{PatternShape, compile_pattern};
