use std::path::PathBuf;

/// Library-level structured errors for treepatch.
///
/// Use `thiserror` for structured errors that library consumers can match on.
/// The CLI binary wraps these with `anyhow` for rich context chains.
#[derive(Debug, thiserror::Error)]
pub enum TreePatchError {
	#[error("Cannot select files under {root}: {reason}")]
	SelectionError { root: PathBuf, reason: String },

	#[error("No files matched the selection rules under {root}")]
	NothingMatched { root: PathBuf },

	#[error("Invalid pattern in rule: {pattern}")]
	InvalidPattern {
		pattern: String,
		#[source]
		source: globset::Error,
	},

	#[error("Failed to read selected file: {path}")]
	ReadError {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("Failed to write patch document: {path}")]
	EncodeError {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("Malformed patch at line {line}: {message}")]
	ParseError { line: usize, message: String },

	#[error("Failed to apply {path}")]
	ApplyError {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("Failed to read config file: {path}")]
	ConfigReadError {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("Failed to parse config file: {path}")]
	ConfigParseError {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	#[error("Mutually exclusive options: {option1} and {option2}")]
	MutuallyExclusive { option1: String, option2: String },

	#[error("Rule in {path} needs either `include` or `exclude`")]
	EmptyRule { path: PathBuf },

	#[error("Failed to resolve home directory")]
	HomeDirectoryNotFound,
}

impl TreePatchError {
	/// Shorthand for a decoder failure at a 1-based line number.
	pub fn parse(line: usize, message: impl Into<String>) -> Self {
		TreePatchError::ParseError {
			line,
			message: message.into(),
		}
	}
}

/// Result type alias using TreePatchError.
pub type Result<T> = std::result::Result<T, TreePatchError>;
