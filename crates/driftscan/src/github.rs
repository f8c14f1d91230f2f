//! GitHub branch listing over the REST API

use std::time::Duration;

use futures::TryStreamExt;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::aws::paginate::{CollectError, Page, RetryPolicy, Throttling, paginate};

const GITHUB_API: &str = "https://api.github.com";

/// Branches requested per page (GitHub's maximum)
pub const BRANCHES_PER_PAGE: usize = 100;

/// GitHub API failures
#[derive(Debug, Error)]
pub enum GithubError {
    /// 429, or 403 with the rate limit exhausted
    #[error("GitHub rate limit exceeded (HTTP {status})")]
    RateLimited { status: u16 },

    #[error("GitHub returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("GitHub request failed")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected GitHub response: {0}")]
    Decode(String),
}

impl Throttling for GithubError {
    fn is_throttled(&self) -> bool {
        matches!(self, GithubError::RateLimited { .. })
    }
}

#[derive(Debug, Deserialize)]
struct Branch {
    name: String,
}

/// Lists branches of repositories in one organisation
#[derive(Debug, Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    base_url: String,
    owner: String,
    token: String,
    policy: RetryPolicy,
}

impl GithubClient {
    pub fn new(owner: &str, token: &str, policy: RetryPolicy) -> Result<Self, GithubError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("driftscan/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: GITHUB_API.to_string(),
            owner: owner.to_string(),
            token: token.to_string(),
            policy,
        })
    }

    /// Point the client at another API root (GitHub Enterprise)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Every branch name of `repo`, across all pages
    pub async fn list_branches(&self, repo: &str) -> Result<Vec<String>, CollectError<GithubError>> {
        let url = format!("{}/repos/{}/{}/branches", self.base_url, self.owner, repo);
        let client = self.clone();
        let branches: Vec<String> = paginate(
            format!("github:ListBranches({}/{repo})", self.owner),
            self.policy,
            move |page: Option<u32>| {
                let client = client.clone();
                let url = url.clone();
                async move { client.branch_page(&url, page.unwrap_or(1)).await }
            },
        )
        .try_collect()
        .await?;

        debug!(repo = %repo, count = branches.len(), "Listed branches");
        Ok(branches)
    }

    async fn branch_page(&self, url: &str, page: u32) -> Result<Page<String, u32>, GithubError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .query(&[("per_page", BRANCHES_PER_PAGE as u32), ("page", page)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let rate_limit_exhausted = response
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v == "0");
            if is_rate_limited(status, rate_limit_exhausted) {
                return Err(GithubError::RateLimited {
                    status: status.as_u16(),
                });
            }
            let body = response.text().await.unwrap_or_default();
            return Err(GithubError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let branches: Vec<Branch> = response
            .json()
            .await
            .map_err(|e| GithubError::Decode(e.to_string()))?;
        let next = (branches.len() == BRANCHES_PER_PAGE).then_some(page + 1);
        Ok(Page::new(branches.into_iter().map(|b| b.name).collect(), next))
    }
}

fn is_rate_limited(status: StatusCode, rate_limit_exhausted: bool) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN && rate_limit_exhausted)
}
