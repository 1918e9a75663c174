use crate::error::{Result, TreePatchError};
use crate::rules::{PathFilter, RuleKind};
use std::collections::HashSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// A regular file's path relative to the source root, always `/`-separated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SelectedPath(String);

impl SelectedPath {
	/// Build from a path relative to the root. Returns `None` for names that are not
	/// valid UTF-8 or for anything other than plain components.
	pub fn from_relative(relative: &Path) -> Option<Self> {
		let mut segments = Vec::new();
		for component in relative.components() {
			match component {
				Component::Normal(name) => segments.push(name.to_str()?),
				_ => return None,
			}
		}
		if segments.is_empty() {
			return None;
		}
		Some(SelectedPath(segments.join("/")))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Location of this file under `root` on the host.
	pub fn under(&self, root: &Path) -> PathBuf {
		self.0.split('/').fold(root.to_path_buf(), |path, seg| path.join(seg))
	}
}

impl fmt::Display for SelectedPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// A filter that always excludes one file under the root, such as the patch
/// document being written into the tree it packages.
pub struct SkipPath<'a, F: ?Sized> {
	filter: &'a F,
	skipped: Option<SelectedPath>,
}

impl<'a, F: PathFilter + ?Sized> SkipPath<'a, F> {
	/// Skip `path` if it resolves to a location under `root`; otherwise defer to `filter`.
	pub fn new(filter: &'a F, root: &Path, path: &Path) -> Self {
		SkipPath {
			filter,
			skipped: locate_under(root, path),
		}
	}

	pub fn skipped(&self) -> Option<&SelectedPath> {
		self.skipped.as_ref()
	}
}

impl<F: PathFilter + ?Sized> PathFilter for SkipPath<'_, F> {
	fn decide(&self, path: &str) -> RuleKind {
		if self.skipped.as_ref().is_some_and(|skipped| skipped.as_str() == path) {
			debug!(path, "skipping output document");
			return RuleKind::Exclude;
		}
		self.filter.decide(path)
	}
}

/// `path` relative to `root`, resolved through the parent directory since the
/// file itself may not exist yet.
fn locate_under(root: &Path, path: &Path) -> Option<SelectedPath> {
	let root = std::fs::canonicalize(root).ok()?;
	let name = path.file_name()?;
	let parent = match path.parent() {
		Some(parent) if !parent.as_os_str().is_empty() => parent,
		_ => Path::new("."),
	};
	let location = std::fs::canonicalize(parent).ok()?.join(name);
	SelectedPath::from_relative(location.strip_prefix(&root).ok()?)
}

/// Walk `root` and return every regular file the filter includes.
///
/// Traversal is depth-first with siblings sorted by file name, so the result
/// order is stable across runs. Symlinks are followed; a directory reached a
/// second time (through a cycle or a second link) is skipped with a warning.
pub fn select<F: PathFilter + ?Sized>(root: &Path, filter: &F) -> Result<Vec<SelectedPath>> {
	let selection_error = |reason: String| TreePatchError::SelectionError {
		root: root.to_path_buf(),
		reason,
	};

	let metadata = std::fs::metadata(root).map_err(|e| selection_error(e.to_string()))?;
	if !metadata.is_dir() {
		return Err(selection_error("not a directory".to_string()));
	}

	let mut visited_dirs = HashSet::new();
	let mut selected = Vec::new();
	let mut entries = WalkDir::new(root)
		.follow_links(true)
		.sort_by_file_name()
		.into_iter();

	while let Some(entry) = entries.next() {
		let entry = match entry {
			Ok(entry) => entry,
			Err(err) if err.depth() == 0 => return Err(selection_error(err.to_string())),
			Err(err) => {
				if let Some(ancestor) = err.loop_ancestor() {
					warn!(
						path = ?err.path(),
						ancestor = %ancestor.display(),
						"skipping symlink cycle"
					);
				} else {
					warn!(error = %err, "skipping unreadable entry");
				}
				continue;
			}
		};

		if entry.file_type().is_dir() {
			let real = std::fs::canonicalize(entry.path())
				.unwrap_or_else(|_| entry.path().to_path_buf());
			if !visited_dirs.insert(real) {
				warn!(path = %entry.path().display(), "directory already traversed, skipping");
				entries.skip_current_dir();
			}
			continue;
		}

		if !entry.file_type().is_file() {
			debug!(path = %entry.path().display(), "not a regular file, skipping");
			continue;
		}

		let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
		let Some(path) = SelectedPath::from_relative(relative) else {
			warn!(path = %relative.display(), "path is not valid UTF-8, skipping");
			continue;
		};

		if filter.decide(path.as_str()) == RuleKind::Include {
			selected.push(path);
		}
	}

	if selected.is_empty() {
		return Err(TreePatchError::NothingMatched {
			root: root.to_path_buf(),
		});
	}

	info!(root = %root.display(), count = selected.len(), "selected files");
	Ok(selected)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::rules::{Rule, RuleSet};
	use std::fs;

	fn write(root: &Path, relative: &str, content: &str) {
		let path = root.join(relative);
		fs::create_dir_all(path.parent().unwrap()).unwrap();
		fs::write(path, content).unwrap();
	}

	fn names(selected: &[SelectedPath]) -> Vec<&str> {
		selected.iter().map(SelectedPath::as_str).collect()
	}

	fn everything() -> RuleSet {
		RuleSet::compile(&[Rule::include("**")]).unwrap()
	}

	#[test]
	fn test_selected_path_from_relative() {
		let path = SelectedPath::from_relative(Path::new("src").join("a.c").as_path()).unwrap();
		assert_eq!(path.as_str(), "src/a.c");
		assert!(SelectedPath::from_relative(Path::new("../a.c")).is_none());
		assert!(SelectedPath::from_relative(Path::new("")).is_none());
	}

	#[test]
	fn test_skip_path_excludes_output_under_root() {
		let temp_dir = tempfile::tempdir().unwrap();
		write(temp_dir.path(), "a.txt", "a");
		write(temp_dir.path(), "out/output.patch", "old document");

		let rules = everything();
		let filter = SkipPath::new(&rules, temp_dir.path(), &temp_dir.path().join("out/output.patch"));
		assert_eq!(filter.skipped().map(SelectedPath::as_str), Some("out/output.patch"));

		let selected = select(temp_dir.path(), &filter).unwrap();
		assert_eq!(names(&selected), vec!["a.txt"]);
	}

	#[test]
	fn test_skip_path_ignores_output_outside_root() {
		let temp_dir = tempfile::tempdir().unwrap();
		let root = temp_dir.path().join("root");
		write(&root, "a.txt", "a");

		let rules = everything();
		let filter = SkipPath::new(&rules, &root, &temp_dir.path().join("output.patch"));
		assert!(filter.skipped().is_none());
		assert_eq!(filter.decide("a.txt"), RuleKind::Include);
	}

	#[test]
	fn test_selected_path_under_root() {
		let path = SelectedPath("src/a.c".to_string());
		assert_eq!(path.under(Path::new("/tmp/x")), Path::new("/tmp/x/src/a.c"));
	}

	#[test]
	fn test_select_depth_first_sorted() {
		let temp_dir = tempfile::tempdir().unwrap();
		write(temp_dir.path(), "b.txt", "b");
		write(temp_dir.path(), "a/z.txt", "z");
		write(temp_dir.path(), "a.txt", "a");
		write(temp_dir.path(), "a/b/c.txt", "c");

		let selected = select(temp_dir.path(), &everything()).unwrap();
		assert_eq!(names(&selected), vec!["a/b/c.txt", "a/z.txt", "a.txt", "b.txt"]);
	}

	#[test]
	fn test_select_applies_rules() {
		let temp_dir = tempfile::tempdir().unwrap();
		write(temp_dir.path(), "README.md", "# hi\n");
		write(temp_dir.path(), "src/a.c", "int main;\n");
		write(temp_dir.path(), "src/build/obj.o", "obj");

		let rules = RuleSet::compile(&[
			Rule::include("**/*.c"),
			Rule::include("README.md"),
			Rule::exclude("**"),
		])
		.unwrap();

		let selected = select(temp_dir.path(), &rules).unwrap();
		assert_eq!(names(&selected), vec!["README.md", "src/a.c"]);
	}

	#[test]
	fn test_select_hidden_entries_traversed() {
		let temp_dir = tempfile::tempdir().unwrap();
		write(temp_dir.path(), ".config/settings.toml", "x = 1\n");
		write(temp_dir.path(), ".env", "A=1\n");

		let selected = select(temp_dir.path(), &everything()).unwrap();
		assert_eq!(names(&selected), vec![".config/settings.toml", ".env"]);
	}

	#[test]
	fn test_select_never_emits_directories() {
		let temp_dir = tempfile::tempdir().unwrap();
		fs::create_dir_all(temp_dir.path().join("empty/nested")).unwrap();
		write(temp_dir.path(), "file.txt", "x");

		let selected = select(temp_dir.path(), &everything()).unwrap();
		assert_eq!(names(&selected), vec!["file.txt"]);
	}

	#[test]
	fn test_select_nothing_matched() {
		let temp_dir = tempfile::tempdir().unwrap();
		write(temp_dir.path(), "a.txt", "a");

		let rules = RuleSet::compile(&[Rule::include("*.rs")]).unwrap();
		match select(temp_dir.path(), &rules).unwrap_err() {
			TreePatchError::NothingMatched { root } => assert_eq!(root, temp_dir.path()),
			other => panic!("Expected NothingMatched error, got {other:?}"),
		}
	}

	#[test]
	fn test_select_missing_root() {
		let temp_dir = tempfile::tempdir().unwrap();
		let missing = temp_dir.path().join("missing");
		assert!(matches!(
			select(&missing, &everything()),
			Err(TreePatchError::SelectionError { .. })
		));
	}

	#[test]
	fn test_select_root_is_a_file() {
		let temp_dir = tempfile::tempdir().unwrap();
		write(temp_dir.path(), "a.txt", "a");
		match select(&temp_dir.path().join("a.txt"), &everything()).unwrap_err() {
			TreePatchError::SelectionError { reason, .. } => assert_eq!(reason, "not a directory"),
			other => panic!("Expected SelectionError, got {other:?}"),
		}
	}

	#[cfg(unix)]
	#[test]
	fn test_select_survives_symlink_cycle() {
		let temp_dir = tempfile::tempdir().unwrap();
		write(temp_dir.path(), "a/file.txt", "x");
		std::os::unix::fs::symlink(temp_dir.path().join("a"), temp_dir.path().join("a/loop"))
			.unwrap();

		let selected = select(temp_dir.path(), &everything()).unwrap();
		assert_eq!(names(&selected), vec!["a/file.txt"]);
	}

	#[cfg(unix)]
	#[test]
	fn test_select_follows_directory_link_once() {
		let temp_dir = tempfile::tempdir().unwrap();
		write(temp_dir.path(), "real/file.txt", "x");
		std::os::unix::fs::symlink(temp_dir.path().join("real"), temp_dir.path().join("alias"))
			.unwrap();

		let selected = select(temp_dir.path(), &everything()).unwrap();
		assert_eq!(names(&selected), vec!["alias/file.txt"]);
	}

	#[cfg(unix)]
	#[test]
	fn test_select_follows_file_links() {
		let temp_dir = tempfile::tempdir().unwrap();
		write(temp_dir.path(), "target.txt", "x");
		std::os::unix::fs::symlink(
			temp_dir.path().join("target.txt"),
			temp_dir.path().join("link.txt"),
		)
		.unwrap();

		let selected = select(temp_dir.path(), &everything()).unwrap();
		assert_eq!(names(&selected), vec!["link.txt", "target.txt"]);
	}
}
