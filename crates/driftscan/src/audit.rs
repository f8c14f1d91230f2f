//! Stack/branch orphan audit
//!
//! A stack is an orphan when no branch of the repository appears in its
//! name, it does not start with the excluded prefix (any case) and it is not
//! a named exception. Orphans are reported oldest first.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use driftscan_common::exclusion::contains_any;
use driftscan_common::{AccountIdentity, ExclusionRule};
use tracing::info;

use crate::aws::stacks::{StackCatalog, StackInfo};
use crate::config::AuditConfig;
use crate::github::GithubClient;
use crate::report::ReportWriter;

/// Source of live CloudFormation stacks
#[allow(async_fn_in_trait)] // Internal use only, Send+Sync bounds on trait are sufficient
#[cfg_attr(test, mockall::automock)]
pub trait StackSource: Send + Sync {
    async fn live_stacks(&self) -> Result<Vec<StackInfo>>;
}

/// Source of a repository's branch names
#[allow(async_fn_in_trait)]
#[cfg_attr(test, mockall::automock)]
pub trait BranchSource: Send + Sync {
    async fn branches(&self, repo: &str) -> Result<Vec<String>>;
}

impl StackSource for StackCatalog {
    async fn live_stacks(&self) -> Result<Vec<StackInfo>> {
        self.list_stacks()
            .await
            .context("Failed to list CloudFormation stacks")
    }
}

impl BranchSource for GithubClient {
    async fn branches(&self, repo: &str) -> Result<Vec<String>> {
        self.list_branches(repo)
            .await
            .with_context(|| format!("Failed to list branches of {repo}"))
    }
}

/// What makes a stack exempt from the audit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanFilter {
    pub excluded_prefix: String,
    pub exceptions: Vec<String>,
}

impl OrphanFilter {
    /// Stacks with no branch in their name and no exemption, oldest first
    pub fn find_orphans(&self, stacks: &[StackInfo], branches: &[String]) -> Vec<StackInfo> {
        let excluded = ExclusionRule::prefix(self.excluded_prefix.as_str()).ignoring_case();

        let mut orphans: Vec<StackInfo> = stacks
            .iter()
            .filter(|s| !contains_any(&s.name, branches.iter().map(String::as_str)))
            .filter(|s| !excluded.matches(&s.name))
            .filter(|s| !self.exceptions.iter().any(|e| *e == s.name))
            .cloned()
            .collect();
        orphans.sort_by_key(|s| s.creation_time);
        orphans
    }
}

/// Counts from one audit run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditSummary {
    pub stacks: usize,
    pub branches: usize,
    pub orphans: Vec<StackInfo>,
}

fn iso(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Run the audit against the given sources, writing the report.
///
/// A branch listing failure is written to the report before it is returned.
pub async fn run_audit(
    stacks: &impl StackSource,
    branches: &impl BranchSource,
    repo: &str,
    filter: &OrphanFilter,
    identity: &AccountIdentity,
    generated: DateTime<Utc>,
    report: &mut ReportWriter,
) -> Result<AuditSummary> {
    report.lines([
        "CloudFormation Stack Audit Report".to_string(),
        format!("Repository: {repo}"),
        format!("Account: {}", identity.file_token()),
        format!("Generated: {}", iso(&generated)),
        String::new(),
    ])?;

    info!("Fetching CloudFormation stacks");
    let stacks = stacks.live_stacks().await?;
    report.line(format!("Total stacks found: {}", stacks.len()))?;

    info!(repo = %repo, "Fetching branches from GitHub");
    let branches = match branches.branches(repo).await {
        Ok(branches) => branches,
        Err(e) => {
            report.line(format!("Failed to fetch branches: {e:#}"))?;
            return Err(e);
        }
    };
    report.line(format!("Total branches found: {}", branches.len()))?;

    report.blank()?;
    report.line("Filtering stacks...")?;
    let orphans = filter.find_orphans(&stacks, &branches);
    report.line(format!(
        "Orphaned stacks (no matching branch): {}",
        orphans.len()
    ))?;
    report.blank()?;

    if orphans.is_empty() {
        report.line("✅ No orphaned stacks found.")?;
    } else {
        report.line("❌ Orphaned stacks:")?;
        for stack in &orphans {
            report.line(format!(
                "- {} (Created: {}, Status: {})",
                stack.name,
                iso(&stack.creation_time),
                stack.status
            ))?;
        }
    }

    report.blank()?;
    report.line(format!("Report saved to: {}", report.path().display()))?;

    Ok(AuditSummary {
        stacks: stacks.len(),
        branches: branches.len(),
        orphans,
    })
}

/// The `audit-stacks` command
pub async fn audit_stacks(config: &AuditConfig) -> Result<AuditSummary> {
    config.validate()?;

    let ctx = config.common.aws_context().await;
    let identity = crate::aws::resolve_identity(&ctx).await;
    let generated = Utc::now();

    let file_name = identity.audit_report_name(&config.repo, &iso(&generated));
    let mut report = ReportWriter::create(&config.common.output_dir, &file_name)?;

    let catalog = StackCatalog::new(&ctx, config.common.retry);
    let github = GithubClient::new(&config.owner, &config.github_token, config.common.retry)?;

    let summary = run_audit(
        &catalog,
        &github,
        &config.repo,
        &config.filter(),
        &identity,
        generated,
        &mut report,
    )
    .await?;

    let path = report.finish()?;
    info!(path = %path.display(), orphans = summary.orphans.len(), "Audit complete");
    Ok(summary)
}
