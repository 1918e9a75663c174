//! Patch documents for treepatch.
//!
//! This module handles:
//! - Rendering a snapshot as one mailbox-format "new files" commit
//! - Parsing add-only patch documents back into file records
//! - Git-style path quoting and destination-safety checks

pub mod decoder;
pub mod encoder;
pub mod path;

pub use decoder::decode;
pub use encoder::{encode, write_document};
pub use path::check_relative_path;

use crate::error::{Result, TreePatchError};
use std::path::Path;

/// A complete patch document. Produced once by [`encode`], consumed by [`decode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchDocument(Vec<u8>);

impl PatchDocument {
	pub fn from_bytes(bytes: Vec<u8>) -> Self {
		PatchDocument(bytes)
	}

	/// Read a document from disk.
	pub fn read(path: &Path) -> Result<Self> {
		std::fs::read(path)
			.map(PatchDocument)
			.map_err(|source| TreePatchError::ReadError {
				path: path.to_path_buf(),
				source,
			})
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}

	pub fn into_bytes(self) -> Vec<u8> {
		self.0
	}
}
