//! Treepatch - package a filtered directory tree as one add-only patch document.
//!
//! This library provides the core functionality for treepatch, including:
//! - Include/exclude rule matching with first-match-wins precedence
//! - Deterministic tree selection and snapshot building
//! - Encoding a snapshot as a git-style patch and decoding it back
//! - Applying decoded files under a destination root with staging
//! - Configuration file parsing and cascade discovery
//!
//! # Example
//!
//! ```no_run
//! use treepatch::rules::{Rule, RuleSet};
//! use treepatch::{patch, select, snapshot};
//! use std::path::Path;
//!
//! let rules = RuleSet::compile(&[Rule::exclude("target/"), Rule::include("**")])?;
//! let root = Path::new("my-project");
//!
//! let selected = select::select(root, &rules)?;
//! let snapshot = snapshot::build(&selected, root)?;
//! let document = patch::encode(&snapshot);
//! patch::write_document(&document, Path::new("output.patch"))?;
//!
//! let records = patch::decode(&document)?;
//! treepatch::apply::apply(&records, Path::new("elsewhere"))?;
//! # Ok::<(), treepatch::TreePatchError>(())
//! ```

pub mod apply;
pub mod config;
pub mod error;
pub mod patch;
pub mod rules;
pub mod select;
pub mod snapshot;

pub use error::{Result, TreePatchError};
