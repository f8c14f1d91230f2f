//! The unmanaged-resource scan
//!
//! Indexes every live CloudFormation stack while the inventories of all
//! enabled kinds are collected, then reconciles each kind in profile order
//! and writes one report section per kind.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use driftscan_common::defaults::STAGE_FETCH_CONCURRENCY;
use driftscan_common::{KindProfile, ReconciliationResult, ResourceKind, ScanProfile, reconcile};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::aws::error::AwsError;
use crate::aws::inventory::Inventory;
use crate::aws::paginate::CollectError;
use crate::aws::stacks::{ManagedIndex, StackCatalog};
use crate::config::ScanConfig;
use crate::report::{ReportWriter, failure_section, scan_section};

/// Outcome of listing one kind's inventory
pub type InventoryResult = Result<Vec<String>, CollectError<AwsError>>;

/// Source of REST API stage names
#[allow(async_fn_in_trait)]
#[cfg_attr(test, mockall::automock)]
pub trait StageSource: Send + Sync {
    async fn stages(&self, rest_api_id: &str) -> Result<Vec<String>, CollectError<AwsError>>;
}

impl StageSource for Inventory {
    async fn stages(&self, rest_api_id: &str) -> Result<Vec<String>, CollectError<AwsError>> {
        self.rest_api_stages(rest_api_id).await
    }
}

/// What a scan found
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub report_path: PathBuf,
    pub results: Vec<ReconciliationResult>,
    /// Kinds whose inventory could not be listed
    pub failed: Vec<ResourceKind>,
}

impl ScanOutcome {
    pub fn unmanaged_total(&self) -> usize {
        self.results.iter().map(|r| r.unmanaged.len()).sum()
    }
}

/// Reconciled and failed kinds of one report
#[derive(Debug, Clone, Default)]
pub struct ScanTally {
    pub results: Vec<ReconciliationResult>,
    pub failed: Vec<ResourceKind>,
}

/// Report lines and result for one successfully listed kind
#[derive(Debug, Clone)]
pub struct KindReport {
    pub lines: Vec<String>,
    pub result: ReconciliationResult,
}

/// Apply the prefilter, reconcile, and format one kind.
pub fn reconcile_kind(
    profile: &KindProfile,
    inventory: Vec<String>,
    managed: &HashSet<String>,
    account_id: Option<&str>,
) -> KindReport {
    let mut lines = Vec::new();
    let inventory = match profile.prefilter_rules() {
        Some(keep) => {
            lines.push(format!("All {}: {}", profile.label(), inventory.len()));
            inventory.into_iter().filter(|id| keep.matches(id)).collect()
        }
        None => inventory,
    };

    let result = reconcile(
        profile.kind,
        profile.label(),
        &inventory,
        managed,
        &profile.rule_set(account_id),
    );
    lines.extend(scan_section(&result));
    KindReport { lines, result }
}

/// Log groups that count as managed.
///
/// Declared log groups, the `/aws/lambda/<fn>` group of every managed
/// function, and the execution log group of every stage of a managed API.
pub fn derived_log_groups(index: &ManagedIndex, api_stages: &[(String, Vec<String>)]) -> HashSet<String> {
    let mut managed = index.for_kind(ResourceKind::LogGroup).clone();
    managed.extend(
        index
            .for_kind(ResourceKind::LambdaFunction)
            .iter()
            .map(|function| format!("/aws/lambda/{function}")),
    );
    for (api_id, stages) in api_stages {
        managed.extend(
            stages
                .iter()
                .map(|stage| format!("API-Gateway-Execution-Logs_{api_id}/{stage}")),
        );
    }
    managed
}

/// Stages of every managed REST API, skipping APIs whose listing fails
async fn managed_api_stages(
    source: &impl StageSource,
    index: &ManagedIndex,
) -> Vec<(String, Vec<String>)> {
    let mut api_ids: Vec<&String> = index.for_kind(ResourceKind::RestApi).iter().collect();
    api_ids.sort();

    let mut stages: Vec<(String, Vec<String>)> = stream::iter(api_ids)
        .map(move |api_id| async move {
            match source.stages(api_id).await {
                Ok(stages) => Some((api_id.clone(), stages)),
                Err(e) => {
                    warn!(rest_api = %api_id, error = %e, "Failed to list stages, skipping");
                    None
                }
            }
        })
        .buffer_unordered(STAGE_FETCH_CONCURRENCY)
        .filter_map(std::future::ready)
        .collect()
        .await;
    stages.sort();
    stages
}

/// Collect the inventories of `kinds`, at most `concurrency` at a time
async fn collect_inventories(
    inventory: &Inventory,
    kinds: Vec<ResourceKind>,
    concurrency: usize,
) -> HashMap<ResourceKind, InventoryResult> {
    stream::iter(kinds)
        .map(move |kind| async move {
            info!(kind = %kind, "Collecting inventory");
            (kind, inventory.collect_all(kind).await)
        })
        .buffer_unordered(concurrency)
        .collect()
        .await
}

/// Reconcile every listed kind and write its section, then the summary.
///
/// A failed stack index aborts before any kind section is written. A kind
/// whose inventory failed gets a failure section and the others go on.
pub async fn write_kind_sections(
    profile: &ScanProfile,
    index: Result<ManagedIndex, CollectError<AwsError>>,
    mut inventories: HashMap<ResourceKind, InventoryResult>,
    stages: &impl StageSource,
    account_id: Option<&str>,
    report: &mut ReportWriter,
) -> Result<ScanTally> {
    let index = index.context("Failed to index CloudFormation stacks")?;

    let log_groups = if profile.kind(ResourceKind::LogGroup).is_some() {
        let api_stages = managed_api_stages(stages, &index).await;
        derived_log_groups(&index, &api_stages)
    } else {
        HashSet::new()
    };

    let mut tally = ScanTally::default();
    for kind_profile in &profile.kinds {
        let kind = kind_profile.kind;
        let Some(listed) = inventories.remove(&kind) else {
            continue;
        };
        match listed {
            Ok(ids) => {
                let managed = match kind {
                    ResourceKind::LogGroup => &log_groups,
                    _ => index.for_kind(kind),
                };
                let KindReport { lines, result } =
                    reconcile_kind(kind_profile, ids, managed, account_id);
                report.lines(lines)?;
                tally.results.push(result);
            }
            Err(e) => {
                warn!(kind = %kind, error = %e, "Inventory collection failed");
                report.lines(failure_section(kind_profile.label(), &e))?;
                tally.failed.push(kind);
            }
        }
    }

    let unmanaged: usize = tally.results.iter().map(|r| r.unmanaged.len()).sum();
    report.line(format!(
        "Summary: {unmanaged} unmanaged resource(s) across {} kind(s), {} kind(s) could not be listed",
        tally.results.len(),
        tally.failed.len()
    ))?;
    report.line(format!("Report saved to: {}", report.path().display()))?;
    Ok(tally)
}

/// The `scan` command
pub async fn scan(config: &ScanConfig) -> Result<ScanOutcome> {
    config.validate()?;
    let profile = config.load_profile()?;

    let ctx = config.common.aws_context().await;
    let identity = crate::aws::resolve_identity(&ctx).await;
    let account_id = identity.account_id.as_deref().map(String::as_str);

    let mut report = ReportWriter::create(&config.common.output_dir, &identity.scan_report_name())?;
    report.lines([
        "Unmanaged Resource Report".to_string(),
        format!("Account: {}", identity.display_name()),
        format!(
            "Generated: {}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
        ),
        String::new(),
    ])?;

    let catalog = StackCatalog::new(&ctx, config.common.retry);
    let inventory = Inventory::new(&ctx, config.common.retry);
    let kinds: Vec<ResourceKind> = profile.enabled_kinds().collect();

    info!(kinds = kinds.len(), "Indexing stacks and collecting inventories");
    let (index, inventories) = tokio::join!(
        ManagedIndex::build(&catalog, &profile.managed_types),
        collect_inventories(&inventory, kinds, config.kind_concurrency),
    );
    let tally =
        write_kind_sections(&profile, index, inventories, &inventory, account_id, &mut report)
            .await?;
    let report_path = report.finish()?;

    let outcome = ScanOutcome {
        report_path,
        results: tally.results,
        failed: tally.failed,
    };
    info!(
        unmanaged = outcome.unmanaged_total(),
        failed = outcome.failed.len(),
        path = %outcome.report_path.display(),
        "Scan complete"
    );
    Ok(outcome)
}
