//! Default configuration values shared across driftscan commands

use std::time::Duration;

/// Default AWS region for all listing calls
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default directory for report files
pub const DEFAULT_OUTPUT_DIR: &str = ".";

/// Initial delay before retrying a rate-limited page
pub const DEFAULT_RETRY_BASE: Duration = Duration::from_secs(1);

/// Cap on the delay between rate-limited retries
pub const DEFAULT_RETRY_MAX: Duration = Duration::from_secs(16);

/// Number of retries of one page before giving up
pub const DEFAULT_MAX_RETRIES: usize = 8;

/// Number of resource kinds collected at once
pub const DEFAULT_KIND_CONCURRENCY: usize = 4;

/// Number of concurrent per-API stage listings
pub const STAGE_FETCH_CONCURRENCY: usize = 8;

/// GitHub organisation owning the audited repositories
pub const DEFAULT_GITHUB_OWNER: &str = "Enterprise-CMCS";

/// Repository name prefix dropped from audit report file names
pub const REPO_NAME_PREFIX: &str = "macpro-mdct-";

/// Stacks starting with this prefix (any case) are never orphans
pub const DEFAULT_EXCLUDED_STACK_PREFIX: &str = "cms";

/// Stack names that are never reported as orphans
pub const DEFAULT_STACK_EXCEPTIONS: &[&str] = &["cbj-delete-snapshot"];

/// Stack name fragments selected by the resource-types command
pub const DEFAULT_RESOURCE_TYPE_STACK_FILTERS: &[&str] = &["main", "master", "val", "prod"];

/// Subdirectory holding resource-types output
pub const RESOURCE_TYPES_DIR: &str = "resource-types";

/// Look-back window for the submissions command, in days
pub const DEFAULT_SUBMISSION_DAYS: i64 = 30;
