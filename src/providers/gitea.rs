//! Gitea adapter (self-hosted instances).
//!
//! Gitea models a PR as a numbered issue (PRs and issues share one
//! numbering sequence), so the discussion lives on the issue comments
//! endpoint. File diffs come from the combined `.diff` resource and are
//! split per file the same way as Bitbucket's.

use serde_json::{json, Value};
use url::Url;

use super::http::{expect_json, expect_text, opt_str_of, str_of};
use super::raw_diff::split_by_file;
use super::ProviderContext;
use crate::error::{Error, Result};
use crate::link::{resolve, ResolvedTarget};
use crate::types::{ChangedFile, CommentKind, DiscussionComment, PullRequestRecord};

const PLATFORM: &str = "gitea";

/// Placeholder path when the diff has no recognizable file headers.
const WHOLE_DIFF_PATH: &str = "(diff)";

#[derive(Debug, Clone, Copy)]
pub struct GiteaAdapter;

struct Endpoints {
    host: String,
    api_base: String,
    owner: String,
    repo: String,
    number: u64,
}

fn endpoints(pr_url: &str) -> Result<Endpoints> {
    let (host, owner, repo, number) = match resolve(pr_url) {
        Ok(ResolvedTarget::Gitea {
            host,
            owner,
            repo,
            number,
        }) => (host, owner, repo, number),
        _ => return Err(Error::Provider("invalid Gitea PR link".into())),
    };
    let scheme = Url::parse(pr_url)
        .map(|u| u.scheme().to_string())
        .unwrap_or_else(|_| "https".into());
    Ok(Endpoints {
        api_base: format!("{scheme}://{host}/api/v1"),
        host,
        owner,
        repo,
        number,
    })
}

impl GiteaAdapter {
    pub async fn fetch_pr(&self, ctx: &ProviderContext) -> Result<PullRequestRecord> {
        let ep = endpoints(&ctx.pr_url)?;
        let token = ctx.require_token(PLATFORM, &ep.host, "Gitea token required for this PR/repo.")?;
        let client = ctx.client()?;
        let repo_base = format!("{}/repos/{}/{}", ep.api_base, ep.owner, ep.repo);
        let auth = format!("token {token}");

        let pr = expect_json(
            client
                .get(format!("{repo_base}/pulls/{}", ep.number))
                .header("Authorization", &auth),
            PLATFORM,
            &ep.host,
        )
        .await?;
        let diff_text = expect_text(
            client
                .get(format!("{repo_base}/pulls/{}.diff", ep.number))
                .header("Authorization", &auth),
            PLATFORM,
            &ep.host,
        )
        .await?;
        let comments = expect_json(
            client
                .get(format!("{repo_base}/issues/{}/comments", ep.number))
                .header("Authorization", &auth),
            PLATFORM,
            &ep.host,
        )
        .await?;

        let per_file = split_by_file(&diff_text);
        let changed_files: Vec<ChangedFile> = if per_file.is_empty() {
            vec![ChangedFile {
                path: WHOLE_DIFF_PATH.into(),
                patch: Some(diff_text.clone()),
            }]
        } else {
            per_file
                .into_iter()
                .map(|(path, patch)| ChangedFile {
                    path,
                    patch: Some(patch),
                })
                .collect()
        };

        let discussion: Vec<DiscussionComment> = comments
            .as_array()
            .map(|list| {
                list.iter()
                    .map(|c| DiscussionComment {
                        author: c
                            .get("user")
                            .and_then(|u| u.get("login"))
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        body: str_of(c, "body"),
                        url: opt_str_of(c, "html_url"),
                        file_path: None,
                        created_at: opt_str_of(c, "created_at"),
                        kind: CommentKind::Comment,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(PullRequestRecord {
            platform: PLATFORM.into(),
            host: ep.host,
            url: ctx.pr_url.clone(),
            title: str_of(&pr, "title"),
            description: str_of(&pr, "body"),
            raw: json!({
                "pr": pr,
                "files_count": changed_files.len(),
                "comments_count": discussion.len(),
            }),
            changed_files,
            discussion,
        })
    }

    pub async fn post_comment(&self, ctx: &ProviderContext, body_markdown: &str) -> Result<String> {
        let ep = endpoints(&ctx.pr_url)?;
        let token = ctx.require_token(PLATFORM, &ep.host, "Gitea token required to post PR comments.")?;
        let client = ctx.client()?;

        // PRs are issues in Gitea; the PR number doubles as the issue index.
        let url = format!(
            "{}/repos/{}/{}/issues/{}/comments",
            ep.api_base, ep.owner, ep.repo, ep.number
        );
        let created = expect_json(
            client
                .post(url)
                .header("Authorization", format!("token {token}"))
                .json(&json!({ "body": body_markdown })),
            PLATFORM,
            &ep.host,
        )
        .await?;
        Ok(str_of(&created, "html_url"))
    }
}

// ── Tests ────────────────────────────────────────────────────────
