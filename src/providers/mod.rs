//! Forge adapters: fetch a PR and post comments, one adapter per platform.
//!
//! The platform set is closed, so dispatch is a tagged enum rather than a
//! trait object: [`Adapter::for_target`] is an exhaustive match over
//! [`ResolvedTarget`] and an unknown platform cannot reach it by
//! construction.

pub mod azure;
pub mod bitbucket;
pub mod gitea;
pub mod github;
pub mod gitlab;
mod http;
mod raw_diff;

use std::time::Duration;

use crate::error::{Error, Result};
use crate::link::ResolvedTarget;
use crate::types::PullRequestRecord;

/// Default per-call network timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything an adapter call needs: the PR URL, the credential for its
/// host, and the timeout. Built fresh per call; nothing is cached.
#[derive(Debug, Clone)]
pub struct ProviderContext {
    pub pr_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl ProviderContext {
    pub fn new(pr_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            pr_url: pr_url.into(),
            token,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub(crate) fn client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("prbot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::from)
    }

    /// The token, or the platform's auth error.
    pub(crate) fn require_token(&self, platform: &str, host: &str, hint: &str) -> Result<&str> {
        self.token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::auth(platform, host, hint))
    }
}

/// One variant per supported forge.
#[derive(Debug, Clone, Copy)]
pub enum Adapter {
    Github(github::GithubAdapter),
    Gitlab(gitlab::GitlabAdapter),
    Bitbucket(bitbucket::BitbucketAdapter),
    Azure(azure::AzureAdapter),
    Gitea(gitea::GiteaAdapter),
}

impl Adapter {
    pub fn for_target(target: &ResolvedTarget) -> Self {
        match target {
            ResolvedTarget::Github { .. } => Self::Github(github::GithubAdapter),
            ResolvedTarget::Gitlab { .. } => Self::Gitlab(gitlab::GitlabAdapter),
            ResolvedTarget::Bitbucket { .. } => Self::Bitbucket(bitbucket::BitbucketAdapter),
            ResolvedTarget::Azure { .. } => Self::Azure(azure::AzureAdapter),
            ResolvedTarget::Gitea { .. } => Self::Gitea(gitea::GiteaAdapter),
        }
    }

    /// Fetch and normalize the PR. All-or-nothing: any upstream failure
    /// surfaces as an error, never a partial record.
    pub async fn fetch_pr(&self, ctx: &ProviderContext) -> Result<PullRequestRecord> {
        match self {
            Self::Github(a) => a.fetch_pr(ctx).await,
            Self::Gitlab(a) => a.fetch_pr(ctx).await,
            Self::Bitbucket(a) => a.fetch_pr(ctx).await,
            Self::Azure(a) => a.fetch_pr(ctx).await,
            Self::Gitea(a) => a.fetch_pr(ctx).await,
        }
    }

    /// Post a general (non-inline) markdown comment. Returns a URL or id
    /// locating the created comment when the forge provides one.
    pub async fn post_comment(&self, ctx: &ProviderContext, body_markdown: &str) -> Result<String> {
        match self {
            Self::Github(a) => a.post_comment(ctx, body_markdown).await,
            Self::Gitlab(a) => a.post_comment(ctx, body_markdown).await,
            Self::Bitbucket(a) => a.post_comment(ctx, body_markdown).await,
            Self::Azure(a) => a.post_comment(ctx, body_markdown).await,
            Self::Gitea(a) => a.post_comment(ctx, body_markdown).await,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
