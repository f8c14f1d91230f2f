//! AWS access for driftscan
//!
//! This module provides:
//! - context: shared SDK configuration and client construction
//! - error: error-code based classification of SDK failures
//! - paginate: the retrying paginated collector
//! - inventory: one collector per resource kind
//! - stacks: stack listing and the managed-resource index
//! - account: account id and alias lookup
//! - time: SDK timestamp conversion

pub mod account;
pub mod context;
pub mod error;
pub mod inventory;
pub mod paginate;
pub mod stacks;
pub mod time;

pub use account::{get_account_alias, get_current_account_id, resolve_identity};
pub use context::AwsContext;
pub use error::{AwsError, classify_aws_error};
pub use inventory::Inventory;
pub use paginate::{CollectError, Page, Paged, RetryPolicy, Throttling, paginate, paginate_nested};
pub use stacks::{ManagedIndex, StackCatalog, StackInfo, StackResource};
