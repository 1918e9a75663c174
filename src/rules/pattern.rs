use crate::error::{Result, TreePatchError};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

/// Shape of a filter pattern once its anchoring and trailing slash are peeled off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternShape {
	/// The glob actually matched against relative paths.
	pub glob: String,

	/// Set when the pattern ended in `/`: the path and everything below it.
	pub covers_subtree: bool,
}

impl PatternShape {
	/// Parse a filter pattern.
	///
	/// A leading `/` anchors the pattern at the source root. Anything else floats and
	/// may match any trailing run of whole path segments, so `*.o` reaches
	/// `src/build/obj.o` the way a directory-sync filter would.
	pub fn parse(pattern: &str) -> Self {
		let (anchored, body) = match pattern.strip_prefix('/') {
			Some(rest) => (true, rest),
			None => (false, pattern),
		};
		let (covers_subtree, body) = match body.strip_suffix('/') {
			Some(rest) => (true, rest),
			None => (false, body),
		};

		let glob = if body.is_empty() {
			"**".to_string()
		} else if anchored || body.starts_with("**") {
			body.to_string()
		} else {
			format!("**/{}", body)
		};

		PatternShape {
			glob,
			covers_subtree,
		}
	}

	/// Globs that together implement this shape.
	pub fn globs(&self) -> Vec<String> {
		let mut globs = vec![self.glob.clone()];
		if self.covers_subtree && self.glob != "**" {
			globs.push(format!("{}/**", self.glob));
		}
		globs
	}
}

/// Compile a filter pattern into a glob set.
///
/// `*` and `?` stay within one path segment; `**` crosses segments.
pub fn compile_pattern(pattern: &str) -> Result<GlobSet> {
	let invalid = |source| TreePatchError::InvalidPattern {
		pattern: pattern.to_string(),
		source,
	};

	let mut builder = GlobSetBuilder::new();
	for glob in PatternShape::parse(pattern).globs() {
		let glob = GlobBuilder::new(&glob)
			.literal_separator(true)
			.backslash_escape(true)
			.build()
			.map_err(invalid)?;
		builder.add(glob);
	}

	builder.build().map_err(invalid)
}
