//! Reconciliation of one kind's live inventory against its managed set
//!
//! Placement is single-reason: an item is managed if the managed set holds
//! it, otherwise the first exclusion rule (class precedence prefix, exact,
//! substring) that matches places it, otherwise it is unmanaged. Each rule
//! additionally records how many inventory items it matches overall; that
//! count is informational and may overlap managed items and other rules.

use crate::exclusion::{ExclusionRule, ExclusionRuleSet};
use crate::resource_kind::ResourceKind;
use std::collections::{BTreeMap, HashSet};

/// Counts attributed to one exclusion rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleCount {
    pub rule: ExclusionRule,
    /// Items whose placement this rule decided (partitioning)
    pub placed: usize,
    /// Items of the whole inventory this rule matches (informational)
    pub matched: usize,
}

/// Outcome of reconciling one resource kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationResult {
    pub kind: ResourceKind,
    pub label: String,
    pub total: usize,
    pub managed: usize,
    /// One entry per rule, in rule-set order
    pub excluded: Vec<RuleCount>,
    /// Unmanaged, unexcused identifiers in inventory order
    pub unmanaged: Vec<String>,
}

impl ReconciliationResult {
    /// Number of items placed into an exclusion class
    pub fn excluded_total(&self) -> usize {
        self.excluded.iter().map(|c| c.placed).sum()
    }

    /// Placement counts keyed by rule reason, nonzero only
    pub fn excluded_counts(&self) -> BTreeMap<String, usize> {
        self.excluded
            .iter()
            .filter(|c| c.placed > 0)
            .map(|c| (c.rule.reason(), c.placed))
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.unmanaged.is_empty()
    }
}

/// Reconcile `inventory` against `managed` and `rules`.
///
/// Pure: the caller decides how to present the result.
pub fn reconcile<S>(
    kind: ResourceKind,
    label: impl Into<String>,
    inventory: &[String],
    managed: &HashSet<String, S>,
    rules: &ExclusionRuleSet,
) -> ReconciliationResult
where
    S: std::hash::BuildHasher,
{
    let mut managed_count = 0;
    let mut placed = vec![0usize; rules.rules().len()];
    let mut unmanaged = Vec::new();

    for id in inventory {
        if managed.contains(id) {
            managed_count += 1;
            continue;
        }
        match rules.first_match(id) {
            Some(idx) => placed[idx] += 1,
            None => unmanaged.push(id.clone()),
        }
    }

    let matched = rules.match_counts(inventory.iter().map(String::as_str));
    let excluded = rules
        .rules()
        .iter()
        .zip(placed.into_iter().zip(matched))
        .map(|(rule, (placed, matched))| RuleCount {
            rule: rule.clone(),
            placed,
            matched,
        })
        .collect();

    ReconciliationResult {
        kind,
        label: label.into(),
        total: inventory.len(),
        managed: managed_count,
        excluded,
        unmanaged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_managed_table_scenario() {
        let result = reconcile(
            ResourceKind::DynamodbTable,
            "DynamoDB Tables",
            &ids(&["T1", "T2"]),
            &set(&["T1"]),
            &ExclusionRuleSet::default(),
        );
        assert_eq!(result.total, 2);
        assert_eq!(result.managed, 1);
        assert_eq!(result.unmanaged, vec!["T2".to_string()]);
        assert_eq!(result.excluded_total(), 0);
    }

    #[test]
    fn test_managed_takes_precedence_over_exclusion() {
        let rules = ExclusionRuleSet::new(vec![ExclusionRule::prefix("app-")]);
        let result = reconcile(
            ResourceKind::S3Bucket,
            "S3 Buckets",
            &ids(&["app-a", "app-b", "other"]),
            &set(&["app-a"]),
            &rules,
        );
        assert_eq!(result.managed, 1);
        assert_eq!(result.excluded[0].placed, 1);
        // Informational count still sees the managed item
        assert_eq!(result.excluded[0].matched, 2);
        assert_eq!(result.unmanaged, vec!["other".to_string()]);
    }

    #[test]
    fn test_single_reason_placement() {
        let rules = ExclusionRuleSet::new(vec![
            ExclusionRule::substring("prod"),
            ExclusionRule::prefix("app"),
        ]);
        let result = reconcile(
            ResourceKind::S3Bucket,
            "S3 Buckets",
            &ids(&["app-prod", "x-prod", "y"]),
            &set(&[]),
            &rules,
        );
        // app-prod is placed by the prefix class, not the substring rule
        assert_eq!(result.excluded[0].placed, 1);
        assert_eq!(result.excluded[1].placed, 1);
        assert_eq!(result.excluded[0].matched, 2);
        assert_eq!(result.excluded_total(), 2);
        assert_eq!(result.unmanaged, vec!["y".to_string()]);
    }

    #[test]
    fn test_unmanaged_keeps_inventory_order() {
        let result = reconcile(
            ResourceKind::LambdaFunction,
            "Lambda Functions",
            &ids(&["c", "a", "b"]),
            &set(&[]),
            &ExclusionRuleSet::default(),
        );
        assert_eq!(result.unmanaged, ids(&["c", "a", "b"]));
    }

    #[test]
    fn test_excluded_counts_omits_zero() {
        let rules = ExclusionRuleSet::new(vec![
            ExclusionRule::exact("/aws/apigateway/welcome"),
            ExclusionRule::prefix("/aws/ec2"),
        ]);
        let result = reconcile(
            ResourceKind::LogGroup,
            "CloudWatch Log Groups",
            &ids(&["/aws/ec2/a", "/aws/ec2/b"]),
            &set(&[]),
            &rules,
        );
        let counts = result.excluded_counts();
        assert_eq!(counts.len(), 1);
        assert_eq!(counts.get("prefix \"/aws/ec2\""), Some(&2));
        assert!(result.is_clean());
    }

    #[test]
    fn test_empty_inventory() {
        let result = reconcile(
            ResourceKind::KmsKey,
            "KMS Keys",
            &[],
            &set(&["k"]),
            &ExclusionRuleSet::new(vec![ExclusionRule::prefix("k")]),
        );
        assert_eq!(result.total, 0);
        assert_eq!(result.managed, 0);
        assert_eq!(result.excluded[0].matched, 0);
        assert!(result.is_clean());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn rule_strategy() -> impl Strategy<Value = ExclusionRule> {
            (0usize..3, "[a-c]{0,2}").prop_map(|(mode, pattern)| match mode {
                0 => ExclusionRule::prefix(pattern),
                1 => ExclusionRule::exact(pattern),
                _ => ExclusionRule::substring(pattern),
            })
        }

        proptest! {
            /// managed + placed exclusions + unmanaged always equals total
            #[test]
            fn partition_holds(
                inventory in prop::collection::vec("[a-c]{0,4}", 0..50),
                managed in prop::collection::hash_set("[a-c]{0,4}", 0..10),
                rules in prop::collection::vec(rule_strategy(), 0..6),
            ) {
                let rules = ExclusionRuleSet::new(rules);
                let result = reconcile(ResourceKind::S3Bucket, "S3", &inventory, &managed, &rules);
                prop_assert_eq!(
                    result.managed + result.excluded_total() + result.unmanaged.len(),
                    result.total
                );
                prop_assert_eq!(result.total, inventory.len());
            }

            /// Same inputs give the same result, order included
            #[test]
            fn deterministic(
                inventory in prop::collection::vec("[a-c]{0,4}", 0..50),
                managed in prop::collection::hash_set("[a-c]{0,4}", 0..10),
                rules in prop::collection::vec(rule_strategy(), 0..6),
            ) {
                let rules = ExclusionRuleSet::new(rules);
                let a = reconcile(ResourceKind::S3Bucket, "S3", &inventory, &managed, &rules);
                let b = reconcile(ResourceKind::S3Bucket, "S3", &inventory, &managed, &rules);
                prop_assert_eq!(a, b);
            }

            /// Unmanaged items are neither managed nor matched by any rule
            #[test]
            fn unmanaged_are_unexcused(
                inventory in prop::collection::vec("[a-c]{0,4}", 0..50),
                managed in prop::collection::hash_set("[a-c]{0,4}", 0..10),
                rules in prop::collection::vec(rule_strategy(), 0..6),
            ) {
                let rules = ExclusionRuleSet::new(rules);
                let result = reconcile(ResourceKind::S3Bucket, "S3", &inventory, &managed, &rules);
                for id in &result.unmanaged {
                    prop_assert!(!managed.contains(id));
                    prop_assert!(!rules.matches(id));
                }
            }
        }
    }
}
