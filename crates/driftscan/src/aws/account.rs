//! AWS account identity

use crate::aws::context::AwsContext;
use crate::aws::error::AwsError;
use driftscan_common::identity::{AccountId, AccountIdentity};
use tracing::{debug, info, warn};

/// Fetch the current AWS account ID from credentials via STS GetCallerIdentity
pub async fn get_current_account_id(ctx: &AwsContext) -> Result<AccountId, AwsError> {
    let identity = ctx
        .sts_client()
        .get_caller_identity()
        .send()
        .await
        .map_err(AwsError::from_sdk)?;

    let account = identity.account().ok_or_else(|| AwsError::Malformed {
        message: "No account ID returned from STS GetCallerIdentity".to_string(),
    })?;

    info!(account_id = %account, "AWS account validated");
    Ok(AccountId::new(account))
}

/// First IAM account alias, if one is set
pub async fn get_account_alias(ctx: &AwsContext) -> Result<Option<String>, AwsError> {
    let aliases = ctx
        .iam_client()
        .list_account_aliases()
        .send()
        .await
        .map_err(AwsError::from_sdk)?;
    Ok(aliases.account_aliases().first().cloned())
}

/// Resolve who this run reports on.
///
/// Never fails: a missing account id or alias only changes the display name.
pub async fn resolve_identity(ctx: &AwsContext) -> AccountIdentity {
    let (account_id, alias) = tokio::join!(get_current_account_id(ctx), get_account_alias(ctx));

    let account_id = account_id
        .inspect_err(|e| warn!(error = %e, "Could not determine AWS account ID"))
        .ok();
    let alias = alias
        .inspect_err(|e| debug!(error = %e, "Could not list account aliases"))
        .ok()
        .flatten();

    AccountIdentity::new(account_id, alias)
}
