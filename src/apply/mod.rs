//! Materializing decoded files under a destination root.
//!
//! Each file is written and given its permission bits inside a staging
//! directory on the destination's filesystem, then renamed into place. A
//! failure leaves only the files already renamed; the staging directory is
//! removed on every exit path. Existing files at a target path are replaced
//! without backup. Two concurrent runs against one destination are not
//! supported.

use crate::error::{Result, TreePatchError};
use crate::patch::check_relative_path;
use crate::snapshot::FileRecord;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Resolve every record to its target under `destination` without writing anything.
///
/// Fails on the first path that would leave the destination.
pub fn plan(records: &[FileRecord], destination: &Path) -> Result<Vec<PathBuf>> {
	records
		.iter()
		.map(|record| target_path(destination, &record.path))
		.collect()
}

/// Write every record under `destination`, stopping at the first failure.
///
/// Returns the number of files written.
pub fn apply(records: &[FileRecord], destination: &Path) -> Result<usize> {
	let apply_error = |path: &Path, source| TreePatchError::ApplyError {
		path: path.to_path_buf(),
		source,
	};

	fs::create_dir_all(destination).map_err(|e| apply_error(destination, e))?;
	let staging = tempfile::Builder::new()
		.prefix(".treepatch-staging-")
		.tempdir_in(destination)
		.map_err(|e| apply_error(destination, e))?;

	for (index, record) in records.iter().enumerate() {
		let target = target_path(destination, &record.path)?;
		let staged = staging.path().join(index.to_string());

		stage_file(&staged, record).map_err(|e| apply_error(&target, e))?;
		ensure_parent_dirs(destination, &record.path).map_err(|e| apply_error(&target, e))?;
		fs::rename(&staged, &target).map_err(|e| apply_error(&target, e))?;

		debug!(path = %record.path, mode = %format!("{:o}", record.mode), "applied file");
	}

	staging.close().map_err(|e| apply_error(destination, e))?;
	info!(destination = %destination.display(), files = records.len(), "applied patch");
	Ok(records.len())
}

fn target_path(destination: &Path, relative: &str) -> Result<PathBuf> {
	check_relative_path(relative).map_err(|reason| TreePatchError::ApplyError {
		path: PathBuf::from(relative),
		source: io::Error::new(io::ErrorKind::InvalidInput, reason),
	})?;
	Ok(relative
		.split('/')
		.fold(destination.to_path_buf(), |path, segment| path.join(segment)))
}

fn stage_file(staged: &Path, record: &FileRecord) -> io::Result<()> {
	let mut file = File::create(staged)?;
	file.write_all(&record.content)?;
	file.sync_all()?;
	drop(file);
	set_mode(staged, record.mode)
}

/// Create the directories leading to `relative`, refusing to pass through a
/// symlink that could point outside the destination.
fn ensure_parent_dirs(destination: &Path, relative: &str) -> io::Result<()> {
	let mut segments: Vec<&str> = relative.split('/').collect();
	segments.pop();

	let mut dir = destination.to_path_buf();
	for segment in segments {
		dir.push(segment);
		match fs::symlink_metadata(&dir) {
			Ok(meta) if meta.file_type().is_symlink() => {
				return Err(io::Error::other(format!(
					"refusing to write through symlink {}",
					dir.display()
				)));
			}
			Ok(meta) if meta.is_dir() => {}
			Ok(_) => {
				return Err(io::Error::other(format!(
					"{} exists and is not a directory",
					dir.display()
				)));
			}
			Err(e) if e.kind() == io::ErrorKind::NotFound => fs::create_dir(&dir)?,
			Err(e) => return Err(e),
		}
	}
	Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
	use std::os::unix::fs::PermissionsExt;
	fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
	let mut permissions = fs::metadata(path)?.permissions();
	permissions.set_readonly(mode & 0o200 == 0);
	fs::set_permissions(path, permissions)
}
