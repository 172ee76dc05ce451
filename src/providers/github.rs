//! GitHub (and GitHub Enterprise) adapter.
//!
//! Changed files come from the REST files endpoint, which carries each
//! file's unified patch verbatim; discussion is the union of issue-level
//! conversation comments and inline review comments. All listings page at
//! 100 items and stop at the first short page or the page cap.

use serde_json::{json, Value};
use url::Url;

use super::http::{expect_json, opt_str_of, str_of};
use super::ProviderContext;
use crate::error::{Error, Result};
use crate::link::{resolve, ResolvedTarget};
use crate::types::{ChangedFile, CommentKind, DiscussionComment, PullRequestRecord};

const PLATFORM: &str = "github";
const PAGE_SIZE: usize = 100;
const MAX_FILE_PAGES: u32 = 20;
const MAX_COMMENT_PAGES: u32 = 10;
const ACCEPT: &str = "application/vnd.github+json";

#[derive(Debug, Clone, Copy)]
pub struct GithubAdapter;

struct Endpoints {
    host: String,
    api_base: String,
    owner: String,
    repo: String,
    number: u64,
}

fn endpoints(pr_url: &str) -> Result<Endpoints> {
    let (host, owner, repo, number) = match resolve(pr_url) {
        Ok(ResolvedTarget::Github {
            host,
            owner,
            repo,
            number,
        }) => (host, owner, repo, number),
        _ => return Err(Error::Provider("invalid GitHub PR link".into())),
    };
    let scheme = Url::parse(pr_url)
        .map(|u| u.scheme().to_string())
        .unwrap_or_else(|_| "https".into());
    // github.com uses the dedicated API host; Enterprise serves under /api/v3.
    let api_base = if host == "github.com" {
        "https://api.github.com".to_string()
    } else {
        format!("{scheme}://{host}/api/v3")
    };
    Ok(Endpoints {
        host,
        api_base,
        owner,
        repo,
        number,
    })
}

impl GithubAdapter {
    pub async fn fetch_pr(&self, ctx: &ProviderContext) -> Result<PullRequestRecord> {
        let ep = endpoints(&ctx.pr_url)?;
        let token = ctx.require_token(PLATFORM, &ep.host, "GitHub token required for this PR/repo.")?;
        let client = ctx.client()?;
        let repo_base = format!("{}/repos/{}/{}", ep.api_base, ep.owner, ep.repo);

        let pr = expect_json(
            client
                .get(format!("{repo_base}/pulls/{}", ep.number))
                .header("Accept", ACCEPT)
                .bearer_auth(token),
            PLATFORM,
            &ep.host,
        )
        .await?;

        let files = get_paged(
            &client,
            &format!("{repo_base}/pulls/{}/files", ep.number),
            token,
            &ep.host,
            MAX_FILE_PAGES,
        )
        .await?;
        let issue_comments = get_paged(
            &client,
            &format!("{repo_base}/issues/{}/comments", ep.number),
            token,
            &ep.host,
            MAX_COMMENT_PAGES,
        )
        .await?;
        let review_comments = get_paged(
            &client,
            &format!("{repo_base}/pulls/{}/comments", ep.number),
            token,
            &ep.host,
            MAX_COMMENT_PAGES,
        )
        .await?;

        let changed_files: Vec<ChangedFile> = files
            .iter()
            .map(|f| ChangedFile {
                path: f
                    .get("filename")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
                patch: opt_str_of(f, "patch"),
            })
            .collect();

        let mut discussion: Vec<DiscussionComment> = Vec::new();
        for c in &issue_comments {
            discussion.push(comment_of(c, CommentKind::IssueComment, false));
        }
        for c in &review_comments {
            discussion.push(comment_of(c, CommentKind::ReviewComment, true));
        }

        Ok(PullRequestRecord {
            platform: PLATFORM.into(),
            host: ep.host,
            url: ctx.pr_url.clone(),
            title: str_of(&pr, "title"),
            description: str_of(&pr, "body"),
            raw: json!({
                "pr": pr,
                "files_count": changed_files.len(),
                "issue_comments_count": issue_comments.len(),
                "review_comments_count": review_comments.len(),
            }),
            changed_files,
            discussion,
        })
    }

    pub async fn post_comment(&self, ctx: &ProviderContext, body_markdown: &str) -> Result<String> {
        let ep = endpoints(&ctx.pr_url)?;
        let token = ctx.require_token(PLATFORM, &ep.host, "GitHub token required to post PR comments.")?;
        let client = ctx.client()?;

        // Posting to the issue comments endpoint creates a conversation
        // comment on the PR.
        let url = format!(
            "{}/repos/{}/{}/issues/{}/comments",
            ep.api_base, ep.owner, ep.repo, ep.number
        );
        let created = expect_json(
            client
                .post(url)
                .header("Accept", ACCEPT)
                .bearer_auth(token)
                .json(&json!({ "body": body_markdown })),
            PLATFORM,
            &ep.host,
        )
        .await?;
        Ok(opt_str_of(&created, "html_url")
            .or_else(|| opt_str_of(&created, "url"))
            .unwrap_or_default())
    }
}

fn comment_of(c: &Value, kind: CommentKind, with_path: bool) -> DiscussionComment {
    DiscussionComment {
        author: c
            .get("user")
            .and_then(|u| u.get("login"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        body: str_of(c, "body"),
        url: opt_str_of(c, "html_url").or_else(|| opt_str_of(c, "url")),
        file_path: if with_path { opt_str_of(c, "path") } else { None },
        created_at: opt_str_of(c, "created_at"),
        kind,
    }
}

/// Page through a GitHub list endpoint: 100 per page, stop at the first
/// empty or short page, never fetch past `max_pages`.
async fn get_paged(
    client: &reqwest::Client,
    url: &str,
    token: &str,
    host: &str,
    max_pages: u32,
) -> Result<Vec<Value>> {
    let mut out = Vec::new();
    for page in 1..=max_pages {
        let body = expect_json(
            client
                .get(url)
                .header("Accept", ACCEPT)
                .bearer_auth(token)
                .query(&[("per_page", PAGE_SIZE.to_string()), ("page", page.to_string())]),
            PLATFORM,
            host,
        )
        .await?;
        let items = body.as_array().cloned().unwrap_or_default();
        if items.is_empty() {
            break;
        }
        let short = items.len() < PAGE_SIZE;
        out.extend(items);
        if short {
            break;
        }
    }
    Ok(out)
}

// ── Tests ────────────────────────────────────────────────────────
