use crate::config::types::Config;
use crate::error::{Result, TreePatchError};
use std::path::Path;

/// Parse a config file from the given path.
pub fn parse_config_file(path: &Path) -> Result<Config> {
	let content =
		std::fs::read_to_string(path).map_err(|source| TreePatchError::ConfigReadError {
			path: path.to_path_buf(),
			source,
		})?;

	parse_config_str(&content, path)
}

/// Parse a config from a string (useful for testing).
pub fn parse_config_str(content: &str, path: &Path) -> Result<Config> {
	let config: Config =
		toml::from_str(content).map_err(|source| TreePatchError::ConfigParseError {
			path: path.to_path_buf(),
			source,
		})?;

	// Validate the parsed config
	config.validate(path)?;

	Ok(config)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::rules::Rule;
	use std::path::PathBuf;

	#[test]
	fn test_parse_empty_config() {
		let content = "";
		let path = PathBuf::from("test.toml");
		let config = parse_config_str(content, &path).unwrap();

		assert!(!config.root);
		assert!(config.output.is_none());
		assert!(config.rules.is_empty());
	}

	#[test]
	fn test_parse_basic_config() {
		let content = r#"
root = true
output = "bundle.patch"
"#;
		let path = PathBuf::from("test.toml");
		let config = parse_config_str(content, &path).unwrap();

		assert!(config.root);
		assert_eq!(config.output, Some(PathBuf::from("bundle.patch")));
	}

	#[test]
	fn test_parse_rules_array_of_tables() {
		let content = r#"
[[rules]]
include = "**/*.rs"

[[rules]]
exclude = "target/"
"#;
		let path = PathBuf::from("test.toml");
		let config = parse_config_str(content, &path).unwrap();

		assert_eq!(config.rules.len(), 2);
		assert_eq!(config.rules[0].to_rule(), Some(Rule::include("**/*.rs")));
		assert_eq!(config.rules[1].to_rule(), Some(Rule::exclude("target/")));
	}

	#[test]
	fn test_parse_rules_inline_tables() {
		let content = r#"
rules = [
    { include = "src/" },
    { exclude = "**" },
]
"#;
		let path = PathBuf::from("test.toml");
		let config = parse_config_str(content, &path).unwrap();

		assert_eq!(config.rules.len(), 2);
	}

	#[test]
	fn test_mutually_exclusive_rule_kinds() {
		let content = r#"
[[rules]]
include = "a"
exclude = "b"
"#;
		let path = PathBuf::from("test.toml");
		let result = parse_config_str(content, &path);

		match result.unwrap_err() {
			TreePatchError::MutuallyExclusive { option1, option2 } => {
				assert_eq!(option1, "include");
				assert_eq!(option2, "exclude");
			}
			other => panic!("Expected MutuallyExclusive error, got {other:?}"),
		}
	}

	#[test]
	fn test_empty_rule() {
		let content = "[[rules]]\n";
		let path = PathBuf::from("test.toml");

		match parse_config_str(content, &path).unwrap_err() {
			TreePatchError::EmptyRule { path: source } => assert_eq!(source, path),
			other => panic!("Expected EmptyRule error, got {other:?}"),
		}
	}

	#[test]
	fn test_invalid_toml() {
		let path = PathBuf::from("test.toml");
		let result = parse_config_str("invalid toml [[[", &path);
		assert!(matches!(
			result,
			Err(TreePatchError::ConfigParseError { .. })
		));
	}
}
