//! Shared AWS configuration context
//!
//! Provides `AwsContext` for loading AWS SDK configuration once and
//! creating every service client the scan needs from the same config.

use aws_config::{BehaviorVersion, Region, SdkConfig};
use driftscan_common::defaults::DEFAULT_REGION;
use std::sync::Arc;

/// Shared AWS configuration context for creating service clients.
#[derive(Clone)]
pub struct AwsContext {
    config: Arc<SdkConfig>,
    region: String,
}

impl AwsContext {
    /// Load AWS configuration for the specified region.
    ///
    /// Credentials come from the default chain (environment, config files,
    /// SSO, instance roles).
    pub async fn new(region: &str) -> Self {
        Self::with_profile(region, None).await
    }

    /// Load AWS configuration, optionally pinned to a named profile
    pub async fn with_profile(region: &str, profile: Option<&str>) -> Self {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_string()));
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        let config = loader.load().await;

        Self {
            config: Arc::new(config),
            region: region.to_string(),
        }
    }

    /// Wrap an already loaded SDK config
    pub fn from_sdk_config(config: SdkConfig) -> Self {
        let region = config
            .region()
            .map(|r| r.to_string())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        Self {
            config: Arc::new(config),
            region,
        }
    }

    /// Get the underlying SDK config for direct client construction.
    pub fn sdk_config(&self) -> &SdkConfig {
        &self.config
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn apigateway_client(&self) -> aws_sdk_apigateway::Client {
        aws_sdk_apigateway::Client::new(self.sdk_config())
    }

    pub fn cloudformation_client(&self) -> aws_sdk_cloudformation::Client {
        aws_sdk_cloudformation::Client::new(self.sdk_config())
    }

    pub fn cloudfront_client(&self) -> aws_sdk_cloudfront::Client {
        aws_sdk_cloudfront::Client::new(self.sdk_config())
    }

    pub fn logs_client(&self) -> aws_sdk_cloudwatchlogs::Client {
        aws_sdk_cloudwatchlogs::Client::new(self.sdk_config())
    }

    pub fn cognito_identity_client(&self) -> aws_sdk_cognitoidentity::Client {
        aws_sdk_cognitoidentity::Client::new(self.sdk_config())
    }

    pub fn cognito_idp_client(&self) -> aws_sdk_cognitoidentityprovider::Client {
        aws_sdk_cognitoidentityprovider::Client::new(self.sdk_config())
    }

    pub fn dynamodb_client(&self) -> aws_sdk_dynamodb::Client {
        aws_sdk_dynamodb::Client::new(self.sdk_config())
    }

    pub fn ec2_client(&self) -> aws_sdk_ec2::Client {
        aws_sdk_ec2::Client::new(self.sdk_config())
    }

    pub fn eventbridge_client(&self) -> aws_sdk_eventbridge::Client {
        aws_sdk_eventbridge::Client::new(self.sdk_config())
    }

    pub fn iam_client(&self) -> aws_sdk_iam::Client {
        aws_sdk_iam::Client::new(self.sdk_config())
    }

    pub fn kms_client(&self) -> aws_sdk_kms::Client {
        aws_sdk_kms::Client::new(self.sdk_config())
    }

    pub fn lambda_client(&self) -> aws_sdk_lambda::Client {
        aws_sdk_lambda::Client::new(self.sdk_config())
    }

    pub fn s3_client(&self) -> aws_sdk_s3::Client {
        aws_sdk_s3::Client::new(self.sdk_config())
    }

    pub fn sts_client(&self) -> aws_sdk_sts::Client {
        aws_sdk_sts::Client::new(self.sdk_config())
    }

    /// WAFv2 client for REGIONAL web ACLs in the context's region
    pub fn wafv2_client(&self) -> aws_sdk_wafv2::Client {
        aws_sdk_wafv2::Client::new(self.sdk_config())
    }

    /// WAFv2 client for CLOUDFRONT web ACLs, which only exist in us-east-1
    pub fn wafv2_global_client(&self) -> aws_sdk_wafv2::Client {
        let config = aws_sdk_wafv2::config::Builder::from(self.sdk_config())
            .region(Region::new(DEFAULT_REGION))
            .build();
        aws_sdk_wafv2::Client::from_conf(config)
    }
}

impl std::fmt::Debug for AwsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsContext")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires AWS credentials"]
    async fn test_context_creation() {
        let ctx = AwsContext::new("us-east-1").await;
        assert_eq!(ctx.region(), "us-east-1");
    }

    #[tokio::test]
    #[ignore = "requires AWS credentials"]
    async fn test_context_clone() {
        let ctx1 = AwsContext::new("us-west-2").await;
        let ctx2 = ctx1.clone();
        assert_eq!(ctx1.region(), ctx2.region());
        assert_eq!(ctx2.wafv2_global_client().config().region().map(|r| r.as_ref()), Some("us-east-1"));
    }
}
