//! Bitbucket Cloud adapter.
//!
//! Cloud only. Server/Data Center paths never reach here because the link
//! resolver requires a `bitbucket.org` host. There is no per-file patch
//! endpoint: the diffstat lists the changed paths and one combined raw diff
//! is split back into per-file patches by header scanning.
//!
//! Authentication is HTTP Basic with the stored token in the form
//! `username:app_password`; a token without `:` is a configuration error,
//! not an auth failure.

use serde_json::{json, Value};

use super::http::{expect_json, expect_text, opt_str_of, str_of};
use super::raw_diff::split_by_file;
use super::ProviderContext;
use crate::error::{Error, Result};
use crate::link::{resolve, ResolvedTarget};
use crate::types::{ChangedFile, CommentKind, DiscussionComment, PullRequestRecord};

const PLATFORM: &str = "bitbucket";
const API_BASE: &str = "https://api.bitbucket.org/2.0";

/// Placeholder path when the diffstat yields nothing to key on.
const WHOLE_DIFF_PATH: &str = "(diff)";

#[derive(Debug, Clone, Copy)]
pub struct BitbucketAdapter;

struct Target {
    host: String,
    workspace: String,
    repo: String,
    number: u64,
}

fn target_of(pr_url: &str) -> Result<Target> {
    match resolve(pr_url) {
        Ok(ResolvedTarget::Bitbucket {
            host,
            workspace,
            repo,
            number,
        }) => Ok(Target {
            host,
            workspace,
            repo,
            number,
        }),
        _ => Err(Error::Provider("invalid Bitbucket Cloud PR link".into())),
    }
}

fn basic_auth(ctx: &ProviderContext, host: &str) -> Result<(String, String)> {
    let token = ctx.require_token(
        PLATFORM,
        host,
        "Bitbucket app password required. Use username:app_password as the token value.",
    )?;
    match token.split_once(':') {
        Some((user, pass)) => Ok((user.to_string(), pass.to_string())),
        None => Err(Error::Provider(
            "Bitbucket token must be in the form username:app_password".into(),
        )),
    }
}

impl BitbucketAdapter {
    pub async fn fetch_pr(&self, ctx: &ProviderContext) -> Result<PullRequestRecord> {
        self.fetch_with_base(ctx, API_BASE).await
    }

    pub(crate) async fn fetch_with_base(
        &self,
        ctx: &ProviderContext,
        api_base: &str,
    ) -> Result<PullRequestRecord> {
        let t = target_of(&ctx.pr_url)?;
        let (user, pass) = basic_auth(ctx, &t.host)?;
        let client = ctx.client()?;
        let pr_base = format!(
            "{api_base}/repositories/{}/{}/pullrequests/{}",
            t.workspace, t.repo, t.number
        );

        let pr = expect_json(
            client.get(&pr_base).basic_auth(&user, Some(&pass)),
            PLATFORM,
            &t.host,
        )
        .await?;
        let diffstat = expect_json(
            client
                .get(format!("{pr_base}/diffstat"))
                .basic_auth(&user, Some(&pass)),
            PLATFORM,
            &t.host,
        )
        .await?;
        let diff_text = expect_text(
            client
                .get(format!("{pr_base}/diff"))
                .basic_auth(&user, Some(&pass)),
            PLATFORM,
            &t.host,
        )
        .await?;
        let comments = expect_json(
            client
                .get(format!("{pr_base}/comments"))
                .basic_auth(&user, Some(&pass)),
            PLATFORM,
            &t.host,
        )
        .await?;

        let paths = diffstat_paths(&diffstat);
        let per_file = split_by_file(&diff_text);
        let mut changed_files: Vec<ChangedFile> = paths
            .iter()
            .map(|p| ChangedFile {
                path: p.clone(),
                patch: per_file
                    .iter()
                    .find(|(fp, _)| fp == p)
                    .map(|(_, patch)| patch.clone()),
            })
            .collect();
        if changed_files.is_empty() {
            changed_files = vec![ChangedFile {
                path: WHOLE_DIFF_PATH.into(),
                patch: Some(diff_text.clone()),
            }];
        }

        let discussion: Vec<DiscussionComment> = comments
            .get("values")
            .and_then(Value::as_array)
            .map(|list| list.iter().map(comment_of).collect())
            .unwrap_or_default();

        Ok(PullRequestRecord {
            platform: PLATFORM.into(),
            host: t.host,
            url: ctx.pr_url.clone(),
            title: str_of(&pr, "title"),
            description: str_of(&pr, "description"),
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
        self.post_with_base(ctx, API_BASE, body_markdown).await
    }

    pub(crate) async fn post_with_base(
        &self,
        ctx: &ProviderContext,
        api_base: &str,
        body_markdown: &str,
    ) -> Result<String> {
        let t = target_of(&ctx.pr_url)?;
        let (user, pass) = basic_auth(ctx, &t.host)?;
        let client = ctx.client()?;

        let url = format!(
            "{api_base}/repositories/{}/{}/pullrequests/{}/comments",
            t.workspace, t.repo, t.number
        );
        let created = expect_json(
            client
                .post(url)
                .basic_auth(&user, Some(&pass))
                .json(&json!({ "content": { "raw": body_markdown } })),
            PLATFORM,
            &t.host,
        )
        .await?;
        let links = created.get("links").cloned().unwrap_or(Value::Null);
        Ok(links
            .get("html")
            .and_then(|l| l.get("href"))
            .or_else(|| links.get("self").and_then(|l| l.get("href")))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }
}

/// Changed paths from the diffstat listing, deduped in first-seen order.
fn diffstat_paths(diffstat: &Value) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let values = diffstat
        .get("values")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for v in values {
        let path = v
            .get("new")
            .and_then(|n| n.get("path"))
            .and_then(Value::as_str)
            .or_else(|| v.get("old").and_then(|o| o.get("path")).and_then(Value::as_str))
            .unwrap_or("unknown")
            .to_string();
        if !out.contains(&path) {
            out.push(path);
        }
    }
    out
}

fn comment_of(c: &Value) -> DiscussionComment {
    let user = c.get("user").cloned().unwrap_or(Value::Null);
    DiscussionComment {
        author: opt_str_of(&user, "nickname")
            .or_else(|| opt_str_of(&user, "display_name"))
            .unwrap_or_default(),
        body: c
            .get("content")
            .and_then(|content| content.get("raw"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        url: c
            .get("links")
            .and_then(|l| l.get("html"))
            .and_then(|h| h.get("href"))
            .and_then(Value::as_str)
            .map(str::to_string),
        file_path: None,
        created_at: opt_str_of(c, "created_on"),
        kind: CommentKind::Comment,
    }
}

// ── Tests ────────────────────────────────────────────────────────
