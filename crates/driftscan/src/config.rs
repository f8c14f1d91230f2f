//! Configuration types for driftscan commands
//!
//! Built from parsed command-line arguments and validated before any
//! network call is made.

use std::path::PathBuf;
use std::time::Duration;

use driftscan_common::defaults::{
    DEFAULT_KIND_CONCURRENCY, DEFAULT_MAX_RETRIES, DEFAULT_OUTPUT_DIR, DEFAULT_REGION,
    DEFAULT_RETRY_BASE, DEFAULT_RETRY_MAX,
};
use driftscan_common::{ProfileError, ScanProfile};
use thiserror::Error;

use crate::audit::OrphanFilter;
use crate::aws::context::AwsContext;
use crate::aws::paginate::RetryPolicy;
use crate::submissions::App;

/// Startup validation failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Repository name is required")]
    MissingRepo,

    #[error("GITHUB_TOKEN environment variable is required")]
    MissingGithubToken,

    #[error("Environment name is required")]
    MissingEnvironment,

    #[error("Stack name is required")]
    MissingStack,

    #[error("Retry base delay ({base:?}) must be positive and not exceed the maximum delay ({max:?})")]
    InvalidRetry { base: Duration, max: Duration },

    #[error("Look-back window must be at least one day, got {0}")]
    InvalidDays(i64),

    #[error("Concurrency must be at least 1")]
    InvalidConcurrency,

    #[error("Invalid scan profile")]
    Profile(#[from] ProfileError),
}

/// Settings shared by every command
#[derive(Debug, Clone)]
pub struct CommonConfig {
    /// AWS region
    pub region: String,
    /// AWS profile name (overrides default credential resolution)
    pub aws_profile: Option<String>,
    /// Directory for report files
    pub output_dir: PathBuf,
    /// Backoff for rate-limited pages
    pub retry: RetryPolicy,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            aws_profile: None,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            retry: RetryPolicy::default(),
        }
    }
}

impl CommonConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let RetryPolicy {
            base_delay,
            max_delay,
            ..
        } = self.retry;
        if base_delay.is_zero() || base_delay > max_delay {
            return Err(ConfigError::InvalidRetry {
                base: base_delay,
                max: max_delay,
            });
        }
        Ok(())
    }

    pub async fn aws_context(&self) -> AwsContext {
        AwsContext::with_profile(&self.region, self.aws_profile.as_deref()).await
    }
}

/// Retry policy from optional millisecond overrides
pub fn retry_policy(base_ms: Option<u64>, max_ms: Option<u64>, max_retries: Option<usize>) -> RetryPolicy {
    RetryPolicy {
        base_delay: base_ms.map_or(DEFAULT_RETRY_BASE, Duration::from_millis),
        max_delay: max_ms.map_or(DEFAULT_RETRY_MAX, Duration::from_millis),
        max_retries: max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
    }
}

/// Configuration for the unmanaged-resource scan
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub common: CommonConfig,
    /// Scan profile file; the embedded default when unset
    pub profile_path: Option<PathBuf>,
    /// Exit with status 2 when anything unmanaged is reported
    pub fail_on_unmanaged: bool,
    /// Number of kinds collected at once
    pub kind_concurrency: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            common: CommonConfig::default(),
            profile_path: None,
            fail_on_unmanaged: false,
            kind_concurrency: DEFAULT_KIND_CONCURRENCY,
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.common.validate()?;
        if self.kind_concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }
        Ok(())
    }

    /// The profile file if one was given, otherwise the embedded default
    pub fn load_profile(&self) -> Result<ScanProfile, ConfigError> {
        let profile = match &self.profile_path {
            Some(path) => ScanProfile::load(path)?,
            None => ScanProfile::builtin()?,
        };
        Ok(profile)
    }
}

/// Configuration for the stack/branch orphan audit
#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub common: CommonConfig,
    /// Repository whose branches are matched against stack names
    pub repo: String,
    /// GitHub organisation owning the repository
    pub owner: String,
    pub github_token: String,
    /// Stacks starting with this prefix (any case) are never orphans
    pub excluded_prefix: String,
    /// Stack names that are never orphans
    pub exceptions: Vec<String>,
}

impl AuditConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repo.trim().is_empty() {
            return Err(ConfigError::MissingRepo);
        }
        if self.github_token.trim().is_empty() {
            return Err(ConfigError::MissingGithubToken);
        }
        self.common.validate()
    }

    pub fn filter(&self) -> OrphanFilter {
        OrphanFilter {
            excluded_prefix: self.excluded_prefix.clone(),
            exceptions: self.exceptions.clone(),
        }
    }
}

/// Configuration for the per-stack resource type listing
#[derive(Debug, Clone)]
pub struct ResourceTypesConfig {
    pub common: CommonConfig,
    /// Stack name fragments (any case) selecting the stacks to list
    pub stack_filters: Vec<String>,
}

impl ResourceTypesConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.common.validate()
    }
}

/// Configuration for the Lambda package check
#[derive(Debug, Clone)]
pub struct LambdaPackagesConfig {
    pub common: CommonConfig,
    /// Stack whose functions are checked
    pub stack: String,
}

impl LambdaPackagesConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stack.trim().is_empty() {
            return Err(ConfigError::MissingStack);
        }
        self.common.validate()
    }
}

/// Configuration for the recent-submissions query
#[derive(Debug, Clone)]
pub struct SubmissionsConfig {
    pub common: CommonConfig,
    pub app: App,
    /// Environment (branch) name used in table names
    pub environment: String,
    /// Look-back window in days
    pub days: i64,
}

impl SubmissionsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.environment.trim().is_empty() {
            return Err(ConfigError::MissingEnvironment);
        }
        if self.days < 1 {
            return Err(ConfigError::InvalidDays(self.days));
        }
        self.common.validate()
    }
}
