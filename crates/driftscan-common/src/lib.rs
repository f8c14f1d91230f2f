//! driftscan-common - Shared types and pure reconciliation logic
//!
//! This crate holds everything that can be decided without talking to AWS,
//! so it stays free of SDK dependencies and is cheap to test.
//!
//! ## Modules
//!
//! - [`defaults`]: Default configuration values
//! - [`exclusion`]: Prefix/exact/substring exclusion rules
//! - [`identity`]: Account identity and report file naming
//! - [`profile`]: Scan profile (managed-type allow-list and per-kind rules)
//! - [`reconcile`]: Inventory vs managed-set reconciliation
//! - [`resource_kind`]: Catalogue of scanned resource kinds

pub mod defaults;
pub mod exclusion;
pub mod identity;
pub mod profile;
pub mod reconcile;
pub mod resource_kind;

// Re-export commonly used types
pub use exclusion::{ExclusionRule, ExclusionRuleSet, MatchMode};
pub use identity::AccountIdentity;
pub use profile::{KindProfile, ProfileError, ScanProfile};
pub use reconcile::{ReconciliationResult, RuleCount, reconcile};
pub use resource_kind::ResourceKind;
