//! Resource types declared by selected stacks
//!
//! Writes one file per stack under `<output>/resource-types/`, holding the
//! sorted distinct CloudFormation types of that stack. Useful when deciding
//! which types the scan profile should index.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use driftscan_common::defaults::RESOURCE_TYPES_DIR;
use driftscan_common::identity::sanitize_file_component;
use driftscan_common::{AccountIdentity, ExclusionRule, ExclusionRuleSet};
use tracing::{info, warn};

use crate::aws::stacks::StackCatalog;
use crate::config::ResourceTypesConfig;
use crate::report::ReportWriter;

/// Stack names and their declared types
#[allow(async_fn_in_trait)]
#[cfg_attr(test, mockall::automock)]
pub trait StackTypeSource: Send + Sync {
    async fn stack_names(&self) -> Result<Vec<String>>;
    async fn types_of(&self, stack: &str) -> Result<BTreeSet<String>>;
}

impl StackTypeSource for StackCatalog {
    async fn stack_names(&self) -> Result<Vec<String>> {
        let stacks = self
            .list_stacks()
            .await
            .context("Failed to list CloudFormation stacks")?;
        Ok(stacks.into_iter().map(|s| s.name).collect())
    }

    async fn types_of(&self, stack: &str) -> Result<BTreeSet<String>> {
        self.resource_types(stack)
            .await
            .with_context(|| format!("Failed to list resources of {stack}"))
    }
}

/// Stacks whose name contains any filter, ignoring case
pub fn select_stacks(names: Vec<String>, filters: &[String]) -> Vec<String> {
    let wanted: ExclusionRuleSet = filters
        .iter()
        .map(|f| ExclusionRule::substring(f.as_str()).ignoring_case())
        .collect();
    names.into_iter().filter(|n| wanted.matches(n)).collect()
}

/// `<account>-<sanitized stack>.txt`
pub fn types_file_name(identity: &AccountIdentity, stack: &str) -> String {
    let account = identity
        .account_id
        .as_ref()
        .map_or_else(|| identity.file_token(), |id| id.to_string());
    format!("{account}-{}.txt", sanitize_file_component(stack))
}

/// Files written by one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceTypesSummary {
    pub written: Vec<PathBuf>,
    /// Stacks whose resources could not be listed
    pub failed: Vec<String>,
}

/// Write the type list of every selected stack into `dir`.
///
/// A stack whose resources cannot be listed is logged and skipped.
pub async fn write_resource_types(
    source: &impl StackTypeSource,
    filters: &[String],
    identity: &AccountIdentity,
    dir: &std::path::Path,
) -> Result<ResourceTypesSummary> {
    let stacks = select_stacks(source.stack_names().await?, filters);
    info!(stacks = stacks.len(), "Selected stacks");

    let mut summary = ResourceTypesSummary::default();
    for stack in stacks {
        let types = match source.types_of(&stack).await {
            Ok(types) => types,
            Err(e) => {
                warn!(stack = %stack, error = %format!("{e:#}"), "Skipping stack");
                summary.failed.push(stack);
                continue;
            }
        };

        let mut file = ReportWriter::create(dir, &types_file_name(identity, &stack))?.quiet();
        file.lines(&types)?;
        let path = file.finish()?;
        info!(stack = %stack, types = types.len(), path = %path.display(), "Wrote resource types");
        summary.written.push(path);
    }
    Ok(summary)
}

/// The `resource-types` command
pub async fn list_resource_types(config: &ResourceTypesConfig) -> Result<ResourceTypesSummary> {
    config.validate()?;

    let ctx = config.common.aws_context().await;
    let identity = crate::aws::resolve_identity(&ctx).await;
    let catalog = StackCatalog::new(&ctx, config.common.retry);
    let dir = config.common.output_dir.join(RESOURCE_TYPES_DIR);

    let summary = write_resource_types(&catalog, &config.stack_filters, &identity, &dir).await?;
    info!(
        written = summary.written.len(),
        failed = summary.failed.len(),
        dir = %dir.display(),
        "Resource type listing complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftscan_common::identity::AccountId;
    use tempfile::TempDir;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn identity() -> AccountIdentity {
        AccountIdentity::new(Some(AccountId::new("123456789012")), Some("mdct-dev".to_string()))
    }

    #[test]
    fn test_select_stacks_ignores_case() {
        let selected = select_stacks(
            names(&["seds-MAIN-app", "qmr-feature-x", "carts-prod", "mfp-val-ui"]),
            &names(&["main", "prod", "val"]),
        );
        assert_eq!(selected, names(&["seds-MAIN-app", "carts-prod", "mfp-val-ui"]));
    }

    #[test]
    fn test_types_file_name() {
        assert_eq!(
            types_file_name(&identity(), "seds/main app"),
            "123456789012-seds-main-app.txt"
        );
        let no_account = AccountIdentity::new(None, Some("mdct-dev".to_string()));
        assert_eq!(
            types_file_name(&no_account, "seds-main"),
            "mdct-dev-seds-main.txt"
        );
    }

    #[tokio::test]
    async fn test_writes_one_file_per_stack() {
        let tmp = TempDir::new().unwrap();
        let mut source = MockStackTypeSource::new();
        source
            .expect_stack_names()
            .returning(|| Ok(names(&["seds-main", "seds-feature", "qmr-prod"])));
        source.expect_types_of().returning(|stack| {
            if stack == "qmr-prod" {
                anyhow::bail!("access denied");
            }
            Ok(["AWS::S3::Bucket", "AWS::IAM::Role", "AWS::S3::Bucket"]
                .iter()
                .map(|s| s.to_string())
                .collect())
        });

        let summary = write_resource_types(&source, &names(&["main", "prod"]), &identity(), tmp.path())
            .await
            .unwrap();

        assert_eq!(summary.written, vec![tmp.path().join("123456789012-seds-main.txt")]);
        assert_eq!(summary.failed, names(&["qmr-prod"]));
        assert_eq!(
            std::fs::read_to_string(&summary.written[0]).unwrap(),
            "AWS::IAM::Role\nAWS::S3::Bucket\n"
        );
    }

    #[tokio::test]
    async fn test_stack_listing_failure_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let mut source = MockStackTypeSource::new();
        source
            .expect_stack_names()
            .returning(|| Err(anyhow::anyhow!("throttled")));
        source.expect_types_of().never();

        let result = write_resource_types(&source, &names(&["main"]), &identity(), tmp.path()).await;
        assert!(result.is_err());
    }
}
