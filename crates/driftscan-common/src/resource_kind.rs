//! Catalogue of resource kinds that driftscan inventories
//!
//! Each kind knows the CloudFormation type that declares it, so the managed
//! index (keyed by CloudFormation type) can be looked up per kind.

use serde::{Deserialize, Serialize};

/// Types of AWS resources driftscan can inventory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// API Gateway REST API (identified by API id)
    RestApi,
    /// CloudFront distribution
    CloudfrontDistribution,
    /// CloudFront response headers policy (custom policies only)
    ResponseHeadersPolicy,
    /// CloudFront cache policy (custom policies only)
    CachePolicy,
    /// CloudFront origin access control
    OriginAccessControl,
    /// S3 bucket (identified by name)
    S3Bucket,
    /// CloudWatch Logs log group (identified by name)
    LogGroup,
    /// Lambda function (identified by name)
    LambdaFunction,
    /// Lambda layer version (identified by version ARN)
    LambdaLayerVersion,
    /// DynamoDB table (identified by name)
    DynamodbTable,
    /// IAM role (identified by name)
    IamRole,
    /// Customer managed IAM policy (identified by ARN)
    IamManagedPolicy,
    /// Cognito user pool
    CognitoUserPool,
    /// Cognito identity pool
    CognitoIdentityPool,
    /// WAFv2 web ACL, identified by the `name|id|scope` composite CloudFormation uses
    WafWebAcl,
    /// EventBridge rule (identified by name)
    EventRule,
    /// KMS key (identified by key id)
    KmsKey,
    /// EC2 security group (identified by group id)
    SecurityGroup,
}

impl ResourceKind {
    /// Every kind, in catalogue order
    pub const ALL: [ResourceKind; 18] = [
        ResourceKind::RestApi,
        ResourceKind::CloudfrontDistribution,
        ResourceKind::ResponseHeadersPolicy,
        ResourceKind::CachePolicy,
        ResourceKind::OriginAccessControl,
        ResourceKind::S3Bucket,
        ResourceKind::LogGroup,
        ResourceKind::LambdaFunction,
        ResourceKind::LambdaLayerVersion,
        ResourceKind::DynamodbTable,
        ResourceKind::IamRole,
        ResourceKind::IamManagedPolicy,
        ResourceKind::CognitoUserPool,
        ResourceKind::CognitoIdentityPool,
        ResourceKind::WafWebAcl,
        ResourceKind::EventRule,
        ResourceKind::KmsKey,
        ResourceKind::SecurityGroup,
    ];

    /// CloudFormation resource type that declares this kind
    pub fn cfn_type(self) -> &'static str {
        match self {
            ResourceKind::RestApi => "AWS::ApiGateway::RestApi",
            ResourceKind::CloudfrontDistribution => "AWS::CloudFront::Distribution",
            ResourceKind::ResponseHeadersPolicy => "AWS::CloudFront::ResponseHeadersPolicy",
            ResourceKind::CachePolicy => "AWS::CloudFront::CachePolicy",
            ResourceKind::OriginAccessControl => "AWS::CloudFront::OriginAccessControl",
            ResourceKind::S3Bucket => "AWS::S3::Bucket",
            ResourceKind::LogGroup => "AWS::Logs::LogGroup",
            ResourceKind::LambdaFunction => "AWS::Lambda::Function",
            ResourceKind::LambdaLayerVersion => "AWS::Lambda::LayerVersion",
            ResourceKind::DynamodbTable => "AWS::DynamoDB::Table",
            ResourceKind::IamRole => "AWS::IAM::Role",
            ResourceKind::IamManagedPolicy => "AWS::IAM::ManagedPolicy",
            ResourceKind::CognitoUserPool => "AWS::Cognito::UserPool",
            ResourceKind::CognitoIdentityPool => "AWS::Cognito::IdentityPool",
            ResourceKind::WafWebAcl => "AWS::WAFv2::WebACL",
            ResourceKind::EventRule => "AWS::Events::Rule",
            ResourceKind::KmsKey => "AWS::KMS::Key",
            ResourceKind::SecurityGroup => "AWS::EC2::SecurityGroup",
        }
    }

    /// Look a kind up by its CloudFormation type
    pub fn from_cfn_type(cfn_type: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.cfn_type() == cfn_type)
    }

    /// Section heading used in reports
    pub fn label(self) -> &'static str {
        match self {
            ResourceKind::RestApi => "API Gateway REST APIs",
            ResourceKind::CloudfrontDistribution => "CloudFront Distributions",
            ResourceKind::ResponseHeadersPolicy => "CloudFront Custom Response Headers Policies",
            ResourceKind::CachePolicy => "CloudFront Custom Cache Policies",
            ResourceKind::OriginAccessControl => "CloudFront Origin Access Controls",
            ResourceKind::S3Bucket => "S3 Buckets",
            ResourceKind::LogGroup => "CloudWatch Log Groups",
            ResourceKind::LambdaFunction => "Lambda Functions",
            ResourceKind::LambdaLayerVersion => "Lambda LayerVersions",
            ResourceKind::DynamodbTable => "DynamoDB Tables",
            ResourceKind::IamRole => "IAM Roles",
            ResourceKind::IamManagedPolicy => "IAM Customer Managed Policies",
            ResourceKind::CognitoUserPool => "Cognito User Pools",
            ResourceKind::CognitoIdentityPool => "Cognito Identity Pools",
            ResourceKind::WafWebAcl => "WAFv2 WebACLs (REGIONAL & CLOUDFRONT)",
            ResourceKind::EventRule => "Event Rules",
            ResourceKind::KmsKey => "KMS Keys",
            ResourceKind::SecurityGroup => "EC2 Security Groups",
        }
    }

    /// Short machine name, matching the serde representation
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::RestApi => "rest_api",
            ResourceKind::CloudfrontDistribution => "cloudfront_distribution",
            ResourceKind::ResponseHeadersPolicy => "response_headers_policy",
            ResourceKind::CachePolicy => "cache_policy",
            ResourceKind::OriginAccessControl => "origin_access_control",
            ResourceKind::S3Bucket => "s3_bucket",
            ResourceKind::LogGroup => "log_group",
            ResourceKind::LambdaFunction => "lambda_function",
            ResourceKind::LambdaLayerVersion => "lambda_layer_version",
            ResourceKind::DynamodbTable => "dynamodb_table",
            ResourceKind::IamRole => "iam_role",
            ResourceKind::IamManagedPolicy => "iam_managed_policy",
            ResourceKind::CognitoUserPool => "cognito_user_pool",
            ResourceKind::CognitoIdentityPool => "cognito_identity_pool",
            ResourceKind::WafWebAcl => "waf_web_acl",
            ResourceKind::EventRule => "event_rule",
            ResourceKind::KmsKey => "kms_key",
            ResourceKind::SecurityGroup => "security_group",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
