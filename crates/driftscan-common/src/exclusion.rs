//! Exclusion rules for identifiers that are known to be acceptable
//!
//! A rule set is an ordered list of `{mode, pattern}` rules. A candidate is
//! excluded when any rule matches. When a single reason has to be picked,
//! classes are tried in [`MatchMode::PRECEDENCE`] order and, within a class,
//! in declaration order.

use serde::{Deserialize, Serialize};

/// How a rule's pattern is compared against a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Candidate starts with the pattern
    Prefix,
    /// Candidate equals the pattern
    Exact,
    /// Candidate contains the pattern anywhere
    Substring,
}

impl MatchMode {
    /// Order in which classes decide a candidate's placement
    pub const PRECEDENCE: [MatchMode; 3] = [MatchMode::Prefix, MatchMode::Exact, MatchMode::Substring];

    /// Compare `candidate` against `pattern`. Empty patterns never match.
    pub fn matches(self, candidate: &str, pattern: &str) -> bool {
        if pattern.is_empty() {
            return false;
        }
        match self {
            MatchMode::Prefix => candidate.starts_with(pattern),
            MatchMode::Exact => candidate == pattern,
            MatchMode::Substring => candidate.contains(pattern),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MatchMode::Prefix => "prefix",
            MatchMode::Exact => "exact",
            MatchMode::Substring => "substring",
        }
    }
}

/// A single exclusion predicate
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExclusionRule {
    pub mode: MatchMode,
    pub pattern: String,
    /// Compare ASCII case-insensitively
    #[serde(default)]
    pub ignore_case: bool,
}

impl ExclusionRule {
    pub fn prefix(pattern: impl Into<String>) -> Self {
        Self::new(MatchMode::Prefix, pattern)
    }

    pub fn exact(pattern: impl Into<String>) -> Self {
        Self::new(MatchMode::Exact, pattern)
    }

    pub fn substring(pattern: impl Into<String>) -> Self {
        Self::new(MatchMode::Substring, pattern)
    }

    fn new(mode: MatchMode, pattern: impl Into<String>) -> Self {
        Self {
            mode,
            pattern: pattern.into(),
            ignore_case: false,
        }
    }

    /// Make this rule case-insensitive
    pub fn ignoring_case(mut self) -> Self {
        self.ignore_case = true;
        self
    }

    pub fn matches(&self, candidate: &str) -> bool {
        if self.ignore_case {
            self.mode.matches(
                &candidate.to_ascii_lowercase(),
                &self.pattern.to_ascii_lowercase(),
            )
        } else {
            self.mode.matches(candidate, &self.pattern)
        }
    }

    /// Human-readable reason, e.g. `prefix "/aws/ec2"`
    pub fn reason(&self) -> String {
        format!("{} \"{}\"", self.mode.as_str(), self.pattern)
    }
}

/// Ordered collection of exclusion rules (logical OR)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExclusionRuleSet {
    rules: Vec<ExclusionRule>,
}

impl ExclusionRuleSet {
    pub fn new(rules: Vec<ExclusionRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[ExclusionRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn push(&mut self, rule: ExclusionRule) {
        self.rules.push(rule);
    }

    /// True if any rule matches the candidate
    pub fn matches(&self, candidate: &str) -> bool {
        self.rules.iter().any(|r| r.matches(candidate))
    }

    /// Index of the rule that decides the candidate's placement.
    ///
    /// Classes are tried prefix, exact, substring; the first matching rule of
    /// the first matching class wins.
    pub fn first_match(&self, candidate: &str) -> Option<usize> {
        MatchMode::PRECEDENCE.iter().find_map(|mode| {
            self.rules
                .iter()
                .position(|r| r.mode == *mode && r.matches(candidate))
        })
    }

    /// Per-rule count of candidates matching each rule, independent of
    /// any other rule. Indexes line up with [`Self::rules`].
    pub fn match_counts<'a, I>(&self, candidates: I) -> Vec<usize>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut counts = vec![0; self.rules.len()];
        for candidate in candidates {
            for (i, rule) in self.rules.iter().enumerate() {
                if rule.matches(candidate) {
                    counts[i] += 1;
                }
            }
        }
        counts
    }
}

impl FromIterator<ExclusionRule> for ExclusionRuleSet {
    fn from_iter<T: IntoIterator<Item = ExclusionRule>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl Extend<ExclusionRule> for ExclusionRuleSet {
    fn extend<T: IntoIterator<Item = ExclusionRule>>(&mut self, iter: T) {
        self.rules.extend(iter);
    }
}

/// Substring containment shared with the stack/branch audit
pub fn contains_any<'a, I>(candidate: &str, needles: I) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    needles
        .into_iter()
        .any(|n| MatchMode::Substring.matches(candidate, n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_rule() {
        let rule = ExclusionRule::prefix("foo-");
        assert!(rule.matches("foo-bar"));
        assert!(!rule.matches("xfoo-bar"));
    }

    #[test]
    fn test_exact_rule() {
        let rule = ExclusionRule::exact("foo-bar");
        assert!(rule.matches("foo-bar"));
        assert!(!rule.matches("foo-bar-baz"));
        assert!(!rule.matches("xfoo-bar"));
    }

    #[test]
    fn test_substring_rule() {
        let rule = ExclusionRule::substring("oo-b");
        assert!(rule.matches("foo-bar"));
        assert!(rule.matches("xfoo-bar"));
        assert!(!rule.matches("foobar"));
    }

    #[test]
    fn test_empty_pattern_never_matches() {
        for mode in MatchMode::PRECEDENCE {
            assert!(!mode.matches("anything", ""));
            assert!(!mode.matches("", ""));
        }
    }

    #[test]
    fn test_ignore_case() {
        let rule = ExclusionRule::prefix("cms").ignoring_case();
        assert!(rule.matches("CMS-shared"));
        assert!(rule.matches("cms-shared"));
        assert!(!ExclusionRule::prefix("cms").matches("CMS-shared"));
    }

    #[test]
    fn test_set_matches_any() {
        let set: ExclusionRuleSet = [ExclusionRule::exact("a"), ExclusionRule::substring("zz")]
            .into_iter()
            .collect();
        assert!(set.matches("a"));
        assert!(set.matches("buzzer"));
        assert!(!set.matches("b"));
        assert!(!ExclusionRuleSet::default().matches("a"));
    }

    #[test]
    fn test_first_match_uses_class_precedence() {
        // Substring declared first, but prefix wins the placement
        let set = ExclusionRuleSet::new(vec![
            ExclusionRule::substring("bar"),
            ExclusionRule::exact("foo-bar"),
            ExclusionRule::prefix("foo"),
        ]);
        assert_eq!(set.first_match("foo-bar"), Some(2));
        assert_eq!(set.first_match("x-bar"), Some(0));
        assert_eq!(set.first_match("nothing"), None);
    }

    #[test]
    fn test_first_match_declaration_order_within_class() {
        let set = ExclusionRuleSet::new(vec![
            ExclusionRule::prefix("/aws/lambda"),
            ExclusionRule::prefix("/aws"),
        ]);
        assert_eq!(set.first_match("/aws/lambda/fn"), Some(0));
        assert_eq!(set.first_match("/aws/ec2/x"), Some(1));
    }

    #[test]
    fn test_match_counts_overlap() {
        let set = ExclusionRuleSet::new(vec![
            ExclusionRule::substring("prod"),
            ExclusionRule::substring("us-west-2"),
        ]);
        let items = ["app-prod-us-west-2", "app-prod", "app-dev"];
        assert_eq!(set.match_counts(items), vec![2, 1]);
    }

    #[test]
    fn test_contains_any() {
        assert!(contains_any("app-main-db", ["main"]));
        assert!(!contains_any("app-feature-x-db", ["main", ""]));
    }

    #[test]
    fn test_rule_set_serde() {
        let set: ExclusionRuleSet = serde_json::from_str(
            r#"[{"mode": "prefix", "pattern": "cms", "ignore_case": true},
                {"mode": "exact", "pattern": "x"}]"#,
        )
        .unwrap();
        assert_eq!(set.rules().len(), 2);
        assert!(set.rules()[0].ignore_case);
        assert!(!set.rules()[1].ignore_case);
    }
}
