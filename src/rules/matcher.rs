use crate::error::Result;
use crate::rules::pattern::compile_pattern;
use globset::GlobSet;
use tracing::debug;

/// What a rule does with the paths it matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
	Include,
	Exclude,
}

impl RuleKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			RuleKind::Include => "include",
			RuleKind::Exclude => "exclude",
		}
	}
}

/// An include or exclude glob, not yet compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
	pub kind: RuleKind,
	pub pattern: String,
}

impl Rule {
	pub fn include(pattern: impl Into<String>) -> Self {
		Rule {
			kind: RuleKind::Include,
			pattern: pattern.into(),
		}
	}

	pub fn exclude(pattern: impl Into<String>) -> Self {
		Rule {
			kind: RuleKind::Exclude,
			pattern: pattern.into(),
		}
	}
}

/// A compiled rule ready for matching.
#[derive(Debug, Clone)]
pub struct CompiledRule {
	/// The original rule.
	pub rule: Rule,

	/// Position in the rule list (0-based).
	pub order: usize,

	globs: GlobSet,
}

impl CompiledRule {
	pub fn compile(rule: &Rule, order: usize) -> Result<Self> {
		Ok(CompiledRule {
			rule: rule.clone(),
			order,
			globs: compile_pattern(&rule.pattern)?,
		})
	}

	/// Check if this rule matches a slash-separated path relative to the source root.
	pub fn matches(&self, path: &str) -> bool {
		self.globs.is_match(path)
	}
}

/// Decides whether a relative path belongs in the selection.
///
/// [`RuleSet`] does an ordered linear scan; anything that can answer the same
/// question may stand in for it during selection.
pub trait PathFilter {
	fn decide(&self, path: &str) -> RuleKind;
}

/// An ordered list of compiled rules. Order is exactly the order supplied.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
	rules: Vec<CompiledRule>,
}

impl RuleSet {
	/// Compile rules, keeping their order.
	pub fn compile(rules: &[Rule]) -> Result<Self> {
		let rules = rules
			.iter()
			.enumerate()
			.map(|(order, rule)| CompiledRule::compile(rule, order))
			.collect::<Result<Vec<_>>>()?;
		Ok(RuleSet { rules })
	}

	/// Find the first rule matching a path.
	pub fn find_matching_rule(&self, path: &str) -> Option<&CompiledRule> {
		self.rules.iter().find(|rule| rule.matches(path))
	}

	pub fn rules(&self) -> &[CompiledRule] {
		&self.rules
	}

	pub fn is_empty(&self) -> bool {
		self.rules.is_empty()
	}
}

impl PathFilter for RuleSet {
	fn decide(&self, path: &str) -> RuleKind {
		decide(path, self)
	}
}

/// First matching rule wins; a path no rule matches is excluded.
pub fn decide(path: &str, rules: &RuleSet) -> RuleKind {
	match rules.find_matching_rule(path) {
		Some(rule) => {
			debug!(
				path,
				order = rule.order,
				pattern = %rule.rule.pattern,
				verdict = rule.rule.kind.as_str(),
				"rule matched"
			);
			rule.rule.kind
		}
		None => {
			debug!(path, "no rule matched, excluding");
			RuleKind::Exclude
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn rule_set(rules: &[Rule]) -> RuleSet {
		RuleSet::compile(rules).unwrap()
	}

	#[test]
	fn test_rule_matches_path() {
		let compiled = CompiledRule::compile(&Rule::include("**/*.c"), 0).unwrap();
		assert!(compiled.matches("src/a.c"));
		assert!(!compiled.matches("src/a.h"));
	}

	#[test]
	fn test_compile_keeps_order() {
		let rules = rule_set(&[Rule::include("a"), Rule::exclude("b"), Rule::include("c")]);
		let orders: Vec<_> = rules.rules().iter().map(|r| r.order).collect();
		assert_eq!(orders, vec![0, 1, 2]);
		assert_eq!(rules.rules()[1].rule, Rule::exclude("b"));
	}

	#[test]
	fn test_no_rules_excludes_everything() {
		let rules = rule_set(&[]);
		assert!(rules.is_empty());
		assert_eq!(decide("a.txt", &rules), RuleKind::Exclude);
	}

	#[test]
	fn test_unmatched_path_is_excluded() {
		let rules = rule_set(&[Rule::include("*.md")]);
		assert_eq!(decide("README.md", &rules), RuleKind::Include);
		assert_eq!(decide("main.c", &rules), RuleKind::Exclude);
	}

	#[test]
	fn test_first_match_wins() {
		let rules = rule_set(&[Rule::exclude("secrets/"), Rule::include("**")]);
		assert_eq!(decide("a.txt", &rules), RuleKind::Include);
		assert_eq!(decide("secrets/key.txt", &rules), RuleKind::Exclude);
	}

	#[test]
	fn test_order_decides_not_kind() {
		// The same two rules in the opposite order let the include win.
		let rules = rule_set(&[Rule::include("**"), Rule::exclude("secrets/**")]);
		assert_eq!(decide("secrets/key.txt", &rules), RuleKind::Include);
	}

	#[test]
	fn test_trailing_catch_all_exclude() {
		let rules = rule_set(&[
			Rule::include("**/*.c"),
			Rule::include("README.md"),
			Rule::exclude("**"),
		]);
		assert_eq!(decide("README.md", &rules), RuleKind::Include);
		assert_eq!(decide("src/a.c", &rules), RuleKind::Include);
		assert_eq!(decide("src/build/obj.o", &rules), RuleKind::Exclude);
	}

	#[test]
	fn test_find_matching_rule_reports_position() {
		let rules = rule_set(&[Rule::include("*.txt"), Rule::exclude("*")]);
		let matched = rules.find_matching_rule("notes.md").unwrap();
		assert_eq!(matched.order, 1);
		assert_eq!(matched.rule.kind, RuleKind::Exclude);
	}

	#[test]
	fn test_rule_set_as_path_filter() {
		let rules = rule_set(&[Rule::include("*.rs")]);
		let filter: &dyn PathFilter = &rules;
		assert_eq!(filter.decide("src/lib.rs"), RuleKind::Include);
	}
}
