//! In-memory snapshot of selected files.
//!
//! A [`Snapshot`] is the ordered list of files that will become one synthetic
//! commit, together with the fixed identity stamped on that commit.

use crate::error::{Result, TreePatchError};
use crate::select::SelectedPath;
use std::collections::HashSet;
use std::fs::Metadata;
use std::path::Path;
use tracing::{debug, info};

/// Permission bits used when a source carries none.
pub const DEFAULT_MODE: u32 = 0o644;

/// Authorship and timestamp stamped on every generated patch.
///
/// Fixed so that identical inputs always encode to identical bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
	pub name: &'static str,
	pub email: &'static str,
	pub date: &'static str,
}

pub const SYNTHETIC_IDENTITY: Identity = Identity {
	name: "treepatch",
	email: "treepatch@localhost",
	date: "Thu, 1 Jan 1970 00:00:00 +0000",
};

/// One file: relative `/`-separated path, raw bytes, permission bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
	pub path: String,
	pub content: Vec<u8>,
	pub mode: u32,
}

/// Ordered, immutable set of file records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
	records: Vec<FileRecord>,
	identity: Identity,
}

impl Snapshot {
	/// Wrap records that are already in their final order. Paths must be unique.
	pub fn from_records(records: Vec<FileRecord>) -> Self {
		debug_assert!(
			{
				let mut seen = HashSet::new();
				records.iter().all(|record| seen.insert(record.path.as_str()))
			},
			"snapshot paths must be unique"
		);
		Snapshot {
			records,
			identity: SYNTHETIC_IDENTITY,
		}
	}

	pub fn records(&self) -> &[FileRecord] {
		&self.records
	}

	pub fn identity(&self) -> &Identity {
		&self.identity
	}

	pub fn len(&self) -> usize {
		self.records.len()
	}

	pub fn is_empty(&self) -> bool {
		self.records.is_empty()
	}

	pub fn into_records(self) -> Vec<FileRecord> {
		self.records
	}
}

/// Read every selected file under `root` into a snapshot, in selection order.
///
/// Any file that vanished or became unreadable since selection aborts the whole
/// build. Content is kept byte for byte.
pub fn build(paths: &[SelectedPath], root: &Path) -> Result<Snapshot> {
	let mut records = Vec::with_capacity(paths.len());

	for selected in paths {
		let host_path = selected.under(root);
		let read_error = |source| TreePatchError::ReadError {
			path: host_path.clone(),
			source,
		};

		let metadata = std::fs::metadata(&host_path).map_err(read_error)?;
		let content = std::fs::read(&host_path).map_err(read_error)?;
		let mode = permission_bits(&metadata);

		debug!(
			path = %selected,
			bytes = content.len(),
			mode = %format!("{mode:o}"),
			"read file"
		);
		records.push(FileRecord {
			path: selected.as_str().to_string(),
			content,
			mode,
		});
	}

	info!(files = records.len(), "built snapshot");
	Ok(Snapshot::from_records(records))
}

#[cfg(unix)]
fn permission_bits(metadata: &Metadata) -> u32 {
	use std::os::unix::fs::PermissionsExt;
	metadata.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn permission_bits(metadata: &Metadata) -> u32 {
	if metadata.permissions().readonly() {
		0o444
	} else {
		DEFAULT_MODE
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::rules::{Rule, RuleSet};
	use crate::select::select;
	use std::fs;

	fn select_all(root: &Path) -> Vec<SelectedPath> {
		select(root, &RuleSet::compile(&[Rule::include("**")]).unwrap()).unwrap()
	}

	#[cfg(debug_assertions)]
	#[test]
	#[should_panic(expected = "snapshot paths must be unique")]
	fn test_from_records_rejects_duplicate_paths() {
		let record = FileRecord {
			path: "a.txt".to_string(),
			content: b"a\n".to_vec(),
			mode: DEFAULT_MODE,
		};
		Snapshot::from_records(vec![record.clone(), record]);
	}

	#[test]
	fn test_build_keeps_order_and_bytes() {
		let temp_dir = tempfile::tempdir().unwrap();
		fs::create_dir_all(temp_dir.path().join("src")).unwrap();
		fs::write(temp_dir.path().join("src/a.c"), "int a;\r\n").unwrap();
		fs::write(temp_dir.path().join("README.md"), "no newline").unwrap();

		let snapshot = build(&select_all(temp_dir.path()), temp_dir.path()).unwrap();
		let paths: Vec<_> = snapshot.records().iter().map(|r| r.path.as_str()).collect();
		assert_eq!(paths, vec!["README.md", "src/a.c"]);
		assert_eq!(snapshot.records()[0].content, b"no newline");
		assert_eq!(snapshot.records()[1].content, b"int a;\r\n");
		assert_eq!(snapshot.identity(), &SYNTHETIC_IDENTITY);
	}

	#[cfg(unix)]
	#[test]
	fn test_build_reads_permission_bits() {
		use std::os::unix::fs::PermissionsExt;

		let temp_dir = tempfile::tempdir().unwrap();
		let script = temp_dir.path().join("run.sh");
		fs::write(&script, "#!/bin/sh\n").unwrap();
		fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
		let data = temp_dir.path().join("data.txt");
		fs::write(&data, "x").unwrap();
		fs::set_permissions(&data, fs::Permissions::from_mode(0o600)).unwrap();

		let snapshot = build(&select_all(temp_dir.path()), temp_dir.path()).unwrap();
		assert_eq!(snapshot.records()[0].mode, 0o600);
		assert_eq!(snapshot.records()[1].mode, 0o755);
	}

	#[test]
	fn test_build_aborts_on_vanished_file() {
		let temp_dir = tempfile::tempdir().unwrap();
		fs::write(temp_dir.path().join("a.txt"), "a").unwrap();
		fs::write(temp_dir.path().join("b.txt"), "b").unwrap();

		let selected = select_all(temp_dir.path());
		fs::remove_file(temp_dir.path().join("b.txt")).unwrap();

		match build(&selected, temp_dir.path()).unwrap_err() {
			TreePatchError::ReadError { path, .. } => {
				assert_eq!(path, temp_dir.path().join("b.txt"));
			}
			other => panic!("Expected ReadError, got {other:?}"),
		}
	}
}
