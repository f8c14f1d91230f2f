//! CloudFormation stacks and the managed-resource index

use std::collections::{BTreeSet, HashMap, HashSet};

use aws_sdk_cloudformation::types::StackStatus;
use chrono::{DateTime, Utc};
use driftscan_common::ResourceKind;
use futures::TryStreamExt;
use tracing::{debug, info, warn};

use crate::aws::context::AwsContext;
use crate::aws::error::AwsError;
use crate::aws::paginate::{CollectError, Page, Paged, RetryPolicy, next_cursor, paginate};
use crate::aws::time::to_chrono;

/// A live (not DELETE_COMPLETE) stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackInfo {
    pub name: String,
    pub creation_time: DateTime<Utc>,
    pub status: String,
}

/// One resource declared by a stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackResource {
    pub resource_type: String,
    pub physical_id: Option<String>,
}

/// Stack and stack-resource listings
#[derive(Debug, Clone)]
pub struct StackCatalog {
    client: aws_sdk_cloudformation::Client,
    policy: RetryPolicy,
}

impl StackCatalog {
    pub fn new(ctx: &AwsContext, policy: RetryPolicy) -> Self {
        Self {
            client: ctx.cloudformation_client(),
            policy,
        }
    }

    /// Every stack in any status except DELETE_COMPLETE
    pub fn stacks(&self) -> Paged<'static, StackInfo, AwsError> {
        let client = self.client.clone();
        paginate("cloudformation:ListStacks", self.policy, move |token| {
            stack_page(client.clone(), token)
        })
    }

    pub async fn list_stacks(&self) -> Result<Vec<StackInfo>, CollectError<AwsError>> {
        let stacks: Vec<StackInfo> = self.stacks().try_collect().await?;
        info!(count = stacks.len(), "Listed CloudFormation stacks");
        Ok(stacks)
    }

    pub fn resources(&self, stack_name: &str) -> Paged<'static, StackResource, AwsError> {
        let client = self.client.clone();
        let stack = stack_name.to_string();
        paginate(
            format!("cloudformation:ListStackResources({stack_name})"),
            self.policy,
            move |token| resource_page(client.clone(), stack.clone(), token),
        )
    }

    /// Sorted distinct resource types declared by one stack
    pub async fn resource_types(
        &self,
        stack_name: &str,
    ) -> Result<BTreeSet<String>, CollectError<AwsError>> {
        self.resources(stack_name)
            .map_ok(|r| r.resource_type)
            .try_collect()
            .await
    }
}

fn live_statuses() -> Vec<StackStatus> {
    StackStatus::values()
        .iter()
        .filter(|s| **s != StackStatus::DeleteComplete.as_str())
        .map(|s| StackStatus::from(*s))
        .collect()
}

async fn stack_page(
    client: aws_sdk_cloudformation::Client,
    token: Option<String>,
) -> Result<Page<StackInfo, String>, AwsError> {
    let out = client
        .list_stacks()
        .set_stack_status_filter(Some(live_statuses()))
        .set_next_token(token)
        .send()
        .await
        .map_err(AwsError::from_sdk)?;

    let stacks = out
        .stack_summaries()
        .iter()
        .filter_map(|s| {
            Some(StackInfo {
                name: s.stack_name().to_string(),
                creation_time: to_chrono(s.creation_time())?,
                status: s.stack_status().as_str().to_string(),
            })
        })
        .collect();
    Ok(Page::new(stacks, next_cursor(out.next_token())))
}

async fn resource_page(
    client: aws_sdk_cloudformation::Client,
    stack_name: String,
    token: Option<String>,
) -> Result<Page<StackResource, String>, AwsError> {
    let out = client
        .list_stack_resources()
        .stack_name(stack_name)
        .set_next_token(token)
        .send()
        .await
        .map_err(AwsError::from_sdk)?;

    let resources = out
        .stack_resource_summaries()
        .iter()
        .map(|r| StackResource {
            resource_type: r.resource_type().to_string(),
            physical_id: r.physical_resource_id().map(str::to_string),
        })
        .collect();
    Ok(Page::new(resources, next_cursor(out.next_token())))
}

/// Whether a resource listing failed because its stack no longer exists.
///
/// CloudFormation reports a deleted stack as a `ValidationError` whose
/// message says the stack "does not exist".
fn stack_vanished(error: &AwsError) -> bool {
    match error {
        AwsError::NotFound { .. } => true,
        AwsError::Malformed { message } => message.contains("does not exist"),
        _ => false,
    }
}

/// CloudFormation type -> physical ids declared by live stacks.
///
/// Built once per run and shared read-only by every reconciliation.
#[derive(Debug, Clone, Default)]
pub struct ManagedIndex {
    by_type: HashMap<String, HashSet<String>>,
    stacks: usize,
    empty: HashSet<String>,
}

impl ManagedIndex {
    /// Index every live stack, keeping only `managed_types`.
    ///
    /// Stacks are walked one after another. A stack deleted between the
    /// listing and its resource walk is skipped.
    pub async fn build(
        catalog: &StackCatalog,
        managed_types: &[String],
    ) -> Result<Self, CollectError<AwsError>> {
        let stacks = catalog.list_stacks().await?;
        Self::index_stacks(&stacks, managed_types, |name| catalog.resources(name)).await
    }

    async fn index_stacks<F>(
        stacks: &[StackInfo],
        managed_types: &[String],
        resources: F,
    ) -> Result<Self, CollectError<AwsError>>
    where
        F: Fn(&str) -> Paged<'static, StackResource, AwsError>,
    {
        let allowed: HashSet<&str> = managed_types.iter().map(String::as_str).collect();

        let mut index = ManagedIndex::default();
        for stack in stacks {
            let listed: Vec<StackResource> = match resources(&stack.name).try_collect().await {
                Ok(listed) => listed,
                Err(CollectError::Upstream { source, .. }) if stack_vanished(&source) => {
                    warn!(stack = %stack.name, error = %source, "Stack disappeared during indexing, skipping");
                    continue;
                }
                Err(e) => return Err(e),
            };
            index.stacks += 1;
            index.extend(
                listed
                    .into_iter()
                    .filter(|r| allowed.contains(r.resource_type.as_str())),
            );
        }

        info!(
            stacks = index.stacks,
            resources = index.len(),
            "Built managed resource index"
        );
        Ok(index)
    }

    /// Index from already-listed resources
    pub fn from_resources(resources: impl IntoIterator<Item = StackResource>) -> Self {
        let mut index = ManagedIndex::default();
        index.extend(resources);
        index
    }

    fn extend(&mut self, resources: impl IntoIterator<Item = StackResource>) {
        for resource in resources {
            let Some(physical_id) = resource.physical_id else {
                debug!(resource_type = %resource.resource_type, "Resource has no physical id yet");
                continue;
            };
            self.by_type
                .entry(resource.resource_type)
                .or_default()
                .insert(physical_id);
        }
    }

    /// Managed ids of one CloudFormation type (empty when none)
    pub fn for_type(&self, cfn_type: &str) -> &HashSet<String> {
        self.by_type.get(cfn_type).unwrap_or(&self.empty)
    }

    pub fn for_kind(&self, kind: ResourceKind) -> &HashSet<String> {
        self.for_type(kind.cfn_type())
    }

    /// Total indexed ids across all types
    pub fn len(&self) -> usize {
        self.by_type.values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stack_count(&self) -> usize {
        self.stacks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::error::classify_aws_error;
    use chrono::TimeZone;
    use driftscan_test_utils::{PagedBackend, SimulatedError, TokenStyle};
    use std::sync::Arc;

    fn stack(name: &str) -> StackInfo {
        StackInfo {
            name: name.to_string(),
            creation_time: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
            status: "CREATE_COMPLETE".to_string(),
        }
    }

    /// Resource listing of one stack served by `backend`, whose denied pages
    /// fail with a CloudFormation error built from `code` and `message`
    fn listing(
        backend: Arc<PagedBackend>,
        code: &'static str,
        message: &'static str,
    ) -> Paged<'static, StackResource, AwsError> {
        paginate("cloudformation:ListStackResources", RetryPolicy::default(), move |cursor: Option<String>| {
            let backend = Arc::clone(&backend);
            async move {
                let page = backend.fetch(cursor.as_deref()).map_err(|e| match e {
                    SimulatedError::Denied(_) => classify_aws_error(Some(code), Some(message)),
                    other => classify_aws_error(None, Some(&other.to_string())),
                })?;
                let resources = page
                    .items
                    .into_iter()
                    .map(|id| res("AWS::DynamoDB::Table", Some(&id)))
                    .collect();
                Ok(Page::new(resources, page.next))
            }
        })
    }

    fn managed_types() -> Vec<String> {
        vec!["AWS::DynamoDB::Table".to_string()]
    }

    #[tokio::test]
    async fn test_deleted_stack_is_skipped() {
        let live = Arc::new(PagedBackend::new(&["T1", "T2"], &[1, 1], TokenStyle::NextToken));
        let deleted =
            Arc::new(PagedBackend::new(&["T3", "T4"], &[1, 1], TokenStyle::NextToken).deny_page(1));

        let index = ManagedIndex::index_stacks(
            &[stack("app-main"), stack("app-gone")],
            &managed_types(),
            |name| match name {
                "app-main" => listing(Arc::clone(&live), "ValidationError", "unused"),
                _ => listing(
                    Arc::clone(&deleted),
                    "ValidationError",
                    "Stack with id app-gone does not exist",
                ),
            },
        )
        .await
        .unwrap();

        assert_eq!(index.stack_count(), 1);
        let tables = index.for_kind(ResourceKind::DynamodbTable);
        assert!(tables.contains("T1") && tables.contains("T2"));
        assert!(!tables.contains("T3"));
    }

    #[tokio::test]
    async fn test_other_validation_errors_fail_the_index() {
        let broken =
            Arc::new(PagedBackend::new(&["T1", "T2"], &[1, 1], TokenStyle::NextToken).deny_page(1));

        let err = ManagedIndex::index_stacks(&[stack("app-main")], &managed_types(), |_| {
            listing(Arc::clone(&broken), "ValidationError", "Invalid NextToken")
        })
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            CollectError::Upstream { source: AwsError::Malformed { .. }, .. }
        ));
    }

    #[test]
    fn test_stack_vanished() {
        let gone = classify_aws_error(Some("ValidationError"), Some("Stack with id x does not exist"));
        assert!(stack_vanished(&gone));
        assert!(stack_vanished(&classify_aws_error(Some("ResourceNotFoundException"), Some("gone"))));
        assert!(!stack_vanished(&classify_aws_error(Some("ValidationError"), Some("1 validation error"))));
        assert!(!stack_vanished(&classify_aws_error(Some("AccessDenied"), Some("does not exist"))));
    }

    fn res(resource_type: &str, id: Option<&str>) -> StackResource {
        StackResource {
            resource_type: resource_type.to_string(),
            physical_id: id.map(str::to_string),
        }
    }

    #[test]
    fn test_index_groups_by_type() {
        let index = ManagedIndex::from_resources([
            res("AWS::DynamoDB::Table", Some("T1")),
            res("AWS::DynamoDB::Table", Some("T3")),
            res("AWS::S3::Bucket", Some("bucket-a")),
            res("AWS::Lambda::Function", None),
        ]);

        assert_eq!(index.len(), 3);
        assert!(index.for_kind(ResourceKind::DynamodbTable).contains("T1"));
        assert!(index.for_type("AWS::S3::Bucket").contains("bucket-a"));
        assert!(index.for_kind(ResourceKind::LambdaFunction).is_empty());
        assert!(index.for_type("AWS::SQS::Queue").is_empty());
    }

    #[test]
    fn test_duplicate_ids_collapse() {
        let index = ManagedIndex::from_resources([
            res("AWS::IAM::Role", Some("role-a")),
            res("AWS::IAM::Role", Some("role-a")),
        ]);
        assert_eq!(index.for_kind(ResourceKind::IamRole).len(), 1);
    }

    #[test]
    fn test_live_statuses_exclude_delete_complete() {
        let statuses = live_statuses();
        assert!(!statuses.contains(&StackStatus::DeleteComplete));
        assert!(statuses.contains(&StackStatus::CreateComplete));
        assert!(statuses.contains(&StackStatus::DeleteFailed));
    }

    #[test]
    fn test_empty_index() {
        let index = ManagedIndex::default();
        assert!(index.is_empty());
        assert_eq!(index.stack_count(), 0);
    }
}
