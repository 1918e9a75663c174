use crate::error::TreePatchError;
use crate::rules::Rule;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level configuration from a `.treepatch.toml` file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
	/// If true, stop the directory cascade here and jump to ~/.treepatch.toml.
	#[serde(default)]
	pub root: bool,

	/// Default patch document path, relative to the directory holding this file.
	#[serde(default)]
	pub output: Option<PathBuf>,

	/// Selection rules. First matching rule wins.
	#[serde(default)]
	pub rules: Vec<RuleEntry>,
}

/// One rule as written in TOML: exactly one of `include` or `exclude`.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleEntry {
	pub include: Option<String>,
	pub exclude: Option<String>,
}

impl RuleEntry {
	/// Validate that exactly one of `include`/`exclude` is set.
	pub fn validate(&self, source: &Path) -> Result<(), TreePatchError> {
		match (&self.include, &self.exclude) {
			(Some(_), Some(_)) => Err(TreePatchError::MutuallyExclusive {
				option1: "include".to_string(),
				option2: "exclude".to_string(),
			}),
			(None, None) => Err(TreePatchError::EmptyRule {
				path: source.to_path_buf(),
			}),
			_ => Ok(()),
		}
	}

	pub fn to_rule(&self) -> Option<Rule> {
		match (&self.include, &self.exclude) {
			(Some(pattern), None) => Some(Rule::include(pattern.clone())),
			(None, Some(pattern)) => Some(Rule::exclude(pattern.clone())),
			_ => None,
		}
	}
}

impl Config {
	/// Validate all rules in this config.
	pub fn validate(&self, source: &Path) -> Result<(), TreePatchError> {
		for rule in &self.rules {
			rule.validate(source)?;
		}
		Ok(())
	}
}

/// A loaded configuration with its source path for debugging/display.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
	/// The parsed configuration.
	pub config: Config,

	/// The path this config was loaded from.
	pub path: PathBuf,
}

/// Merged configuration from every file in the cascade.
#[derive(Debug, Clone, Default)]
pub struct MergedConfig {
	/// All rules from all configs, in cascade order (first match wins).
	pub rules: Vec<RuleWithSource>,

	/// Output path from the most specific config that sets one, already
	/// resolved against that config's directory.
	pub output: Option<PathBuf>,
}

/// A rule with its source config path for debugging/display.
#[derive(Debug, Clone)]
pub struct RuleWithSource {
	/// The rule itself.
	pub rule: Rule,

	/// The config file this rule came from.
	pub source: PathBuf,
}
