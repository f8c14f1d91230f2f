//! Scan profile: which kinds to scan and how to excuse known resources
//!
//! The profile is a JSON document. The indexer allow-list (`managed_types`)
//! lives here as data so the stack indexer stays generic. A default profile
//! reproducing the rules the tool has always shipped with is embedded.

use crate::exclusion::{ExclusionRule, ExclusionRuleSet};
use crate::resource_kind::ResourceKind;
use garde::Validate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

/// Embedded default profile
const DEFAULT_PROFILE: &str = include_str!("../profiles/default.json");

/// Placeholder replaced by the account id when rules are built
pub const ACCOUNT_ID_PLACEHOLDER: &str = "{account_id}";

/// Scan profile loading and validation errors
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Failed to read profile {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse profile: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid profile: {0}")]
    Invalid(#[from] garde::Report),

    #[error("Kind {kind} is enabled but {cfn_type} is missing from managed_types")]
    UnindexedKind {
        kind: ResourceKind,
        cfn_type: &'static str,
    },

    #[error("Kind {0} is listed more than once")]
    DuplicateKind(ResourceKind),
}

/// Exclusion patterns for one kind, grouped by match class
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ExcludeLists {
    #[serde(default)]
    #[garde(inner(length(min = 1)))]
    pub prefix: Vec<String>,

    #[serde(default)]
    #[garde(inner(length(min = 1)))]
    pub exact: Vec<String>,

    #[serde(default)]
    #[garde(inner(length(min = 1)))]
    pub substring: Vec<String>,
}

/// Scan settings for one resource kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct KindProfile {
    #[garde(skip)]
    pub kind: ResourceKind,

    /// Report heading, defaults to the kind's label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(length(min = 1))]
    pub label: Option<String>,

    /// Only identifiers starting with one of these (any case) are reconciled
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[garde(inner(length(min = 1)))]
    pub prefilter: Vec<String>,

    #[serde(default)]
    #[garde(dive)]
    pub exclude: ExcludeLists,
}

impl KindProfile {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            label: None,
            prefilter: Vec::new(),
            exclude: ExcludeLists::default(),
        }
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(self.kind.label())
    }

    /// Build the exclusion rule set, expanding `{account_id}`.
    ///
    /// Patterns that reference the account id are dropped when it is unknown.
    pub fn rule_set(&self, account_id: Option<&str>) -> ExclusionRuleSet {
        let expand = |pattern: &String| -> Option<String> {
            if pattern.contains(ACCOUNT_ID_PLACEHOLDER) {
                account_id.map(|id| pattern.replace(ACCOUNT_ID_PLACEHOLDER, id))
            } else {
                Some(pattern.clone())
            }
        };

        let prefix = self
            .exclude
            .prefix
            .iter()
            .filter_map(expand)
            .map(ExclusionRule::prefix);
        let exact = self
            .exclude
            .exact
            .iter()
            .filter_map(expand)
            .map(ExclusionRule::exact);
        let substring = self
            .exclude
            .substring
            .iter()
            .filter_map(expand)
            .map(ExclusionRule::substring);

        prefix.chain(exact).chain(substring).collect()
    }

    /// Rule set selecting identifiers that pass the prefilter, if any
    pub fn prefilter_rules(&self) -> Option<ExclusionRuleSet> {
        if self.prefilter.is_empty() {
            return None;
        }
        Some(
            self.prefilter
                .iter()
                .map(|p| ExclusionRule::prefix(p.as_str()).ignoring_case())
                .collect(),
        )
    }
}

/// Complete scan profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ScanProfile {
    /// CloudFormation types kept by the managed-resource indexer
    #[garde(length(min = 1), inner(length(min = 1)))]
    pub managed_types: Vec<String>,

    /// Kinds to scan, in report order
    #[garde(length(min = 1), dive)]
    pub kinds: Vec<KindProfile>,
}

impl ScanProfile {
    /// Parse and validate a profile from JSON text
    pub fn from_json(json: &str) -> Result<Self, ProfileError> {
        let profile: ScanProfile = serde_json::from_str(json)?;
        profile.check()?;
        Ok(profile)
    }

    /// The embedded default profile
    pub fn builtin() -> Result<Self, ProfileError> {
        Self::from_json(DEFAULT_PROFILE)
    }

    /// Load a profile from a JSON file
    pub fn load(path: &Path) -> Result<Self, ProfileError> {
        let content = std::fs::read_to_string(path).map_err(|source| ProfileError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Field rules plus cross-checks against the managed-type allow-list
    pub fn check(&self) -> Result<(), ProfileError> {
        self.validate()?;

        let mut seen = BTreeSet::new();
        for k in &self.kinds {
            if !seen.insert(k.kind) {
                return Err(ProfileError::DuplicateKind(k.kind));
            }
            if !self.indexes(k.kind.cfn_type()) {
                return Err(ProfileError::UnindexedKind {
                    kind: k.kind,
                    cfn_type: k.kind.cfn_type(),
                });
            }
        }
        Ok(())
    }

    /// True if the indexer keeps resources of `cfn_type`
    pub fn indexes(&self, cfn_type: &str) -> bool {
        self.managed_types.iter().any(|t| t == cfn_type)
    }

    pub fn kind(&self, kind: ResourceKind) -> Option<&KindProfile> {
        self.kinds.iter().find(|k| k.kind == kind)
    }

    pub fn enabled_kinds(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        self.kinds.iter().map(|k| k.kind)
    }
}
