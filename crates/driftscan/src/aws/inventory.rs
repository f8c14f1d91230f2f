//! Live inventory collectors, one per resource kind
//!
//! Each collector maps one AWS listing call onto the paginated collector and
//! yields the identifier CloudFormation uses as the physical resource id for
//! that kind, so inventory and managed index can be compared directly.

use aws_sdk_cloudfront::types::{CachePolicyType, ResponseHeadersPolicyType};
use aws_sdk_iam::types::PolicyScopeType;
use aws_sdk_wafv2::types::Scope;
use driftscan_common::ResourceKind;
use futures::stream::{StreamExt, TryStreamExt};
use tracing::debug;

use crate::aws::context::AwsContext;
use crate::aws::error::AwsError;
use crate::aws::paginate::{
    CollectError, Page, Paged, RetryPolicy, next_cursor, paginate, paginate_nested,
};
use crate::cache::LoadOnceCache;

/// Lazy stream of resource identifiers
pub type IdStream = Paged<'static, String, AwsError>;

/// Result of a single collector page fetch
type IdPage = Result<Page<String, String>, AwsError>;

/// Clients for every inventoried service, created once per run
///
/// Clones share one stage cache, so a REST API's stages are fetched at most
/// once per run.
#[derive(Clone, Debug)]
pub struct Inventory {
    apigateway: aws_sdk_apigateway::Client,
    cloudfront: aws_sdk_cloudfront::Client,
    s3: aws_sdk_s3::Client,
    logs: aws_sdk_cloudwatchlogs::Client,
    lambda: aws_sdk_lambda::Client,
    dynamodb: aws_sdk_dynamodb::Client,
    iam: aws_sdk_iam::Client,
    cognito_idp: aws_sdk_cognitoidentityprovider::Client,
    cognito_identity: aws_sdk_cognitoidentity::Client,
    wafv2: aws_sdk_wafv2::Client,
    wafv2_global: aws_sdk_wafv2::Client,
    events: aws_sdk_eventbridge::Client,
    kms: aws_sdk_kms::Client,
    ec2: aws_sdk_ec2::Client,
    policy: RetryPolicy,
    stages: LoadOnceCache<String, Vec<String>>,
}

impl Inventory {
    pub fn new(ctx: &AwsContext, policy: RetryPolicy) -> Self {
        Self {
            apigateway: ctx.apigateway_client(),
            cloudfront: ctx.cloudfront_client(),
            s3: ctx.s3_client(),
            logs: ctx.logs_client(),
            lambda: ctx.lambda_client(),
            dynamodb: ctx.dynamodb_client(),
            iam: ctx.iam_client(),
            cognito_idp: ctx.cognito_idp_client(),
            cognito_identity: ctx.cognito_identity_client(),
            wafv2: ctx.wafv2_client(),
            wafv2_global: ctx.wafv2_global_client(),
            events: ctx.eventbridge_client(),
            kms: ctx.kms_client(),
            ec2: ctx.ec2_client(),
            policy,
            stages: LoadOnceCache::new(),
        }
    }

    /// Identifier stream for `kind`
    pub fn collect(&self, kind: ResourceKind) -> IdStream {
        match kind {
            ResourceKind::RestApi => self.rest_apis(),
            ResourceKind::CloudfrontDistribution => self.distributions(),
            ResourceKind::ResponseHeadersPolicy => self.response_headers_policies(),
            ResourceKind::CachePolicy => self.cache_policies(),
            ResourceKind::OriginAccessControl => self.origin_access_controls(),
            ResourceKind::S3Bucket => self.buckets(),
            ResourceKind::LogGroup => self.log_groups(),
            ResourceKind::LambdaFunction => self.functions(),
            ResourceKind::LambdaLayerVersion => self.layer_versions(),
            ResourceKind::DynamodbTable => self.tables(),
            ResourceKind::IamRole => self.roles(),
            ResourceKind::IamManagedPolicy => self.managed_policies(),
            ResourceKind::CognitoUserPool => self.user_pools(),
            ResourceKind::CognitoIdentityPool => self.identity_pools(),
            ResourceKind::WafWebAcl => self.web_acls(),
            ResourceKind::EventRule => self.event_rules(),
            ResourceKind::KmsKey => self.kms_keys(),
            ResourceKind::SecurityGroup => self.security_groups(),
        }
    }

    /// Collect every identifier of `kind` into a list
    pub async fn collect_all(&self, kind: ResourceKind) -> Result<Vec<String>, CollectError<AwsError>> {
        let ids: Vec<String> = self.collect(kind).try_collect().await?;
        debug!(kind = %kind, count = ids.len(), "Collected inventory");
        Ok(ids)
    }

    pub fn rest_apis(&self) -> IdStream {
        let client = self.apigateway.clone();
        paginate("apigateway:GetRestApis", self.policy, move |position| {
            rest_api_page(client.clone(), position)
        })
    }

    /// Stage names of one REST API, fetched once and then served from cache
    pub async fn rest_api_stages(&self, rest_api_id: &str) -> Result<Vec<String>, CollectError<AwsError>> {
        let client = self.apigateway.clone();
        let api_id = rest_api_id.to_string();
        let policy = self.policy;
        self.stages
            .get_or_try_load(api_id.clone(), || async move {
                debug!(rest_api = %api_id, "Fetching stages");
                paginate("apigateway:GetStages", policy, move |_: Option<String>| {
                    stage_page(client.clone(), api_id.clone())
                })
                .try_collect()
                .await
            })
            .await
    }

    pub fn distributions(&self) -> IdStream {
        let client = self.cloudfront.clone();
        paginate("cloudfront:ListDistributions", self.policy, move |marker| {
            distribution_page(client.clone(), marker)
        })
    }

    /// Custom response headers policies only
    pub fn response_headers_policies(&self) -> IdStream {
        let client = self.cloudfront.clone();
        paginate("cloudfront:ListResponseHeadersPolicies", self.policy, move |marker| {
            response_headers_policy_page(client.clone(), marker)
        })
    }

    /// Custom cache policies only
    pub fn cache_policies(&self) -> IdStream {
        let client = self.cloudfront.clone();
        paginate("cloudfront:ListCachePolicies", self.policy, move |marker| {
            cache_policy_page(client.clone(), marker)
        })
    }

    pub fn origin_access_controls(&self) -> IdStream {
        let client = self.cloudfront.clone();
        paginate("cloudfront:ListOriginAccessControls", self.policy, move |marker| {
            origin_access_control_page(client.clone(), marker)
        })
    }

    pub fn buckets(&self) -> IdStream {
        let client = self.s3.clone();
        paginate("s3:ListBuckets", self.policy, move |token| {
            bucket_page(client.clone(), token)
        })
    }

    pub fn log_groups(&self) -> IdStream {
        let client = self.logs.clone();
        paginate("logs:DescribeLogGroups", self.policy, move |token| {
            log_group_page(client.clone(), token)
        })
    }

    pub fn functions(&self) -> IdStream {
        let client = self.lambda.clone();
        paginate("lambda:ListFunctions", self.policy, move |marker| {
            function_page(client.clone(), marker)
        })
    }

    /// Every version ARN of every layer
    pub fn layer_versions(&self) -> IdStream {
        let client = self.lambda.clone();
        let layers = paginate("lambda:ListLayers", self.policy, move |marker| {
            layer_page(client.clone(), marker)
        });

        let client = self.lambda.clone();
        let policy = self.policy;
        paginate_nested(layers, move |layer: String| {
            let client = client.clone();
            paginate(
                format!("lambda:ListLayerVersions({layer})"),
                policy,
                move |marker| layer_version_page(client.clone(), layer.clone(), marker),
            )
        })
    }

    pub fn tables(&self) -> IdStream {
        let client = self.dynamodb.clone();
        paginate("dynamodb:ListTables", self.policy, move |start| {
            table_page(client.clone(), start)
        })
    }

    pub fn roles(&self) -> IdStream {
        let client = self.iam.clone();
        paginate("iam:ListRoles", self.policy, move |marker| {
            role_page(client.clone(), marker)
        })
    }

    /// Customer managed policies (Local scope), by ARN
    pub fn managed_policies(&self) -> IdStream {
        let client = self.iam.clone();
        paginate("iam:ListPolicies", self.policy, move |marker| {
            managed_policy_page(client.clone(), marker)
        })
    }

    pub fn user_pools(&self) -> IdStream {
        let client = self.cognito_idp.clone();
        paginate("cognito-idp:ListUserPools", self.policy, move |token| {
            user_pool_page(client.clone(), token)
        })
    }

    pub fn identity_pools(&self) -> IdStream {
        let client = self.cognito_identity.clone();
        paginate("cognito-identity:ListIdentityPools", self.policy, move |token| {
            identity_pool_page(client.clone(), token)
        })
    }

    /// REGIONAL then CLOUDFRONT web ACLs as `name|id|SCOPE`
    pub fn web_acls(&self) -> IdStream {
        let regional = self.web_acls_in(self.wafv2.clone(), Scope::Regional);
        let cloudfront = self.web_acls_in(self.wafv2_global.clone(), Scope::Cloudfront);
        regional.chain(cloudfront).boxed()
    }

    fn web_acls_in(&self, client: aws_sdk_wafv2::Client, scope: Scope) -> IdStream {
        paginate(
            format!("wafv2:ListWebACLs({})", scope.as_str()),
            self.policy,
            move |marker| web_acl_page(client.clone(), scope.clone(), marker),
        )
    }

    pub fn event_rules(&self) -> IdStream {
        let client = self.events.clone();
        paginate("events:ListRules", self.policy, move |token| {
            event_rule_page(client.clone(), token)
        })
    }

    pub fn kms_keys(&self) -> IdStream {
        let client = self.kms.clone();
        paginate("kms:ListKeys", self.policy, move |marker| {
            kms_key_page(client.clone(), marker)
        })
    }

    pub fn security_groups(&self) -> IdStream {
        let client = self.ec2.clone();
        paginate("ec2:DescribeSecurityGroups", self.policy, move |token| {
            security_group_page(client.clone(), token)
        })
    }
}

async fn rest_api_page(client: aws_sdk_apigateway::Client, position: Option<String>) -> IdPage {
    let out = client
        .get_rest_apis()
        .limit(500)
        .set_position(position)
        .send()
        .await
        .map_err(AwsError::from_sdk)?;
    let ids = out.items().iter().filter_map(|api| api.id()).map(str::to_string).collect();
    Ok(Page::new(ids, next_cursor(out.position())))
}

async fn stage_page(client: aws_sdk_apigateway::Client, rest_api_id: String) -> IdPage {
    let out = client
        .get_stages()
        .rest_api_id(rest_api_id)
        .send()
        .await
        .map_err(AwsError::from_sdk)?;
    let stages = out.item().iter().filter_map(|s| s.stage_name()).map(str::to_string).collect();
    Ok(Page::last(stages))
}

async fn distribution_page(client: aws_sdk_cloudfront::Client, marker: Option<String>) -> IdPage {
    let out = client
        .list_distributions()
        .set_marker(marker)
        .send()
        .await
        .map_err(AwsError::from_sdk)?;
    let Some(list) = out.distribution_list() else {
        return Ok(Page::last(Vec::new()));
    };
    let ids = list.items().iter().map(|d| d.id().to_string()).collect();
    Ok(Page::new(ids, next_cursor(list.next_marker())))
}

async fn response_headers_policy_page(
    client: aws_sdk_cloudfront::Client,
    marker: Option<String>,
) -> IdPage {
    let out = client
        .list_response_headers_policies()
        .r#type(ResponseHeadersPolicyType::Custom)
        .set_marker(marker)
        .send()
        .await
        .map_err(AwsError::from_sdk)?;
    let Some(list) = out.response_headers_policy_list() else {
        return Ok(Page::last(Vec::new()));
    };
    let ids = list
        .items()
        .iter()
        .filter_map(|s| s.response_headers_policy())
        .map(|p| p.id().to_string())
        .collect();
    Ok(Page::new(ids, next_cursor(list.next_marker())))
}

async fn cache_policy_page(client: aws_sdk_cloudfront::Client, marker: Option<String>) -> IdPage {
    let out = client
        .list_cache_policies()
        .r#type(CachePolicyType::Custom)
        .set_marker(marker)
        .send()
        .await
        .map_err(AwsError::from_sdk)?;
    let Some(list) = out.cache_policy_list() else {
        return Ok(Page::last(Vec::new()));
    };
    let ids = list
        .items()
        .iter()
        .filter_map(|s| s.cache_policy())
        .map(|p| p.id().to_string())
        .collect();
    Ok(Page::new(ids, next_cursor(list.next_marker())))
}

async fn origin_access_control_page(
    client: aws_sdk_cloudfront::Client,
    marker: Option<String>,
) -> IdPage {
    let out = client
        .list_origin_access_controls()
        .set_marker(marker)
        .send()
        .await
        .map_err(AwsError::from_sdk)?;
    let Some(list) = out.origin_access_control_list() else {
        return Ok(Page::last(Vec::new()));
    };
    let ids = list.items().iter().map(|o| o.id().to_string()).collect();
    Ok(Page::new(ids, next_cursor(list.next_marker())))
}

async fn bucket_page(client: aws_sdk_s3::Client, token: Option<String>) -> IdPage {
    let out = client
        .list_buckets()
        .max_buckets(1000)
        .set_continuation_token(token)
        .send()
        .await
        .map_err(AwsError::from_sdk)?;
    let names = out.buckets().iter().filter_map(|b| b.name()).map(str::to_string).collect();
    Ok(Page::new(names, next_cursor(out.continuation_token())))
}

async fn log_group_page(client: aws_sdk_cloudwatchlogs::Client, token: Option<String>) -> IdPage {
    let out = client
        .describe_log_groups()
        .set_next_token(token)
        .send()
        .await
        .map_err(AwsError::from_sdk)?;
    let names = out
        .log_groups()
        .iter()
        .filter_map(|g| g.log_group_name())
        .map(str::to_string)
        .collect();
    Ok(Page::new(names, next_cursor(out.next_token())))
}

async fn function_page(client: aws_sdk_lambda::Client, marker: Option<String>) -> IdPage {
    let out = client
        .list_functions()
        .set_marker(marker)
        .send()
        .await
        .map_err(AwsError::from_sdk)?;
    let names = out
        .functions()
        .iter()
        .filter_map(|f| f.function_name())
        .map(str::to_string)
        .collect();
    Ok(Page::new(names, next_cursor(out.next_marker())))
}

async fn layer_page(client: aws_sdk_lambda::Client, marker: Option<String>) -> IdPage {
    let out = client
        .list_layers()
        .set_marker(marker)
        .send()
        .await
        .map_err(AwsError::from_sdk)?;
    let names = out.layers().iter().filter_map(|l| l.layer_name()).map(str::to_string).collect();
    Ok(Page::new(names, next_cursor(out.next_marker())))
}

async fn layer_version_page(
    client: aws_sdk_lambda::Client,
    layer: String,
    marker: Option<String>,
) -> IdPage {
    let out = client
        .list_layer_versions()
        .layer_name(layer)
        .set_marker(marker)
        .send()
        .await
        .map_err(AwsError::from_sdk)?;
    let arns = out
        .layer_versions()
        .iter()
        .filter_map(|v| v.layer_version_arn())
        .map(str::to_string)
        .collect();
    Ok(Page::new(arns, next_cursor(out.next_marker())))
}

async fn table_page(client: aws_sdk_dynamodb::Client, start: Option<String>) -> IdPage {
    let out = client
        .list_tables()
        .set_exclusive_start_table_name(start)
        .send()
        .await
        .map_err(AwsError::from_sdk)?;
    Ok(Page::new(
        out.table_names().to_vec(),
        next_cursor(out.last_evaluated_table_name()),
    ))
}

async fn role_page(client: aws_sdk_iam::Client, marker: Option<String>) -> IdPage {
    let out = client
        .list_roles()
        .set_marker(marker)
        .send()
        .await
        .map_err(AwsError::from_sdk)?;
    let names = out.roles().iter().map(|r| r.role_name().to_string()).collect();
    let next = if out.is_truncated() { next_cursor(out.marker()) } else { None };
    Ok(Page::new(names, next))
}

async fn managed_policy_page(client: aws_sdk_iam::Client, marker: Option<String>) -> IdPage {
    let out = client
        .list_policies()
        .scope(PolicyScopeType::Local)
        .set_marker(marker)
        .send()
        .await
        .map_err(AwsError::from_sdk)?;
    let arns = out.policies().iter().filter_map(|p| p.arn()).map(str::to_string).collect();
    let next = if out.is_truncated() { next_cursor(out.marker()) } else { None };
    Ok(Page::new(arns, next))
}

async fn user_pool_page(
    client: aws_sdk_cognitoidentityprovider::Client,
    token: Option<String>,
) -> IdPage {
    let out = client
        .list_user_pools()
        .max_results(60)
        .set_next_token(token)
        .send()
        .await
        .map_err(AwsError::from_sdk)?;
    let ids = out.user_pools().iter().filter_map(|p| p.id()).map(str::to_string).collect();
    Ok(Page::new(ids, next_cursor(out.next_token())))
}

async fn identity_pool_page(
    client: aws_sdk_cognitoidentity::Client,
    token: Option<String>,
) -> IdPage {
    let out = client
        .list_identity_pools()
        .max_results(60)
        .set_next_token(token)
        .send()
        .await
        .map_err(AwsError::from_sdk)?;
    let ids = out
        .identity_pools()
        .iter()
        .filter_map(|p| p.identity_pool_id())
        .map(str::to_string)
        .collect();
    Ok(Page::new(ids, next_cursor(out.next_token())))
}

async fn web_acl_page(client: aws_sdk_wafv2::Client, scope: Scope, marker: Option<String>) -> IdPage {
    let out = client
        .list_web_acls()
        .scope(scope.clone())
        .limit(100)
        .set_next_marker(marker)
        .send()
        .await
        .map_err(AwsError::from_sdk)?;
    let ids: Vec<String> = out
        .web_acls()
        .iter()
        .filter_map(|acl| Some(web_acl_id(acl.name()?, acl.id()?, &scope)))
        .collect();
    // WAF can hand out a marker that leads to an empty page
    let next = if out.web_acls().is_empty() { None } else { next_cursor(out.next_marker()) };
    Ok(Page::new(ids, next))
}

/// Composite physical id CloudFormation reports for a web ACL
pub fn web_acl_id(name: &str, id: &str, scope: &Scope) -> String {
    format!("{name}|{id}|{}", scope.as_str())
}

async fn event_rule_page(client: aws_sdk_eventbridge::Client, token: Option<String>) -> IdPage {
    let out = client
        .list_rules()
        .set_next_token(token)
        .send()
        .await
        .map_err(AwsError::from_sdk)?;
    let names = out.rules().iter().filter_map(|r| r.name()).map(str::to_string).collect();
    Ok(Page::new(names, next_cursor(out.next_token())))
}

async fn kms_key_page(client: aws_sdk_kms::Client, marker: Option<String>) -> IdPage {
    let out = client
        .list_keys()
        .set_marker(marker)
        .send()
        .await
        .map_err(AwsError::from_sdk)?;
    let ids = out.keys().iter().filter_map(|k| k.key_id()).map(str::to_string).collect();
    Ok(Page::new(ids, next_cursor(out.next_marker())))
}

async fn security_group_page(client: aws_sdk_ec2::Client, token: Option<String>) -> IdPage {
    let out = client
        .describe_security_groups()
        .set_next_token(token)
        .send()
        .await
        .map_err(AwsError::from_sdk)?;
    let ids = out
        .security_groups()
        .iter()
        .filter_map(|g| g.group_id())
        .map(str::to_string)
        .collect();
    Ok(Page::new(ids, next_cursor(out.next_token())))
}
