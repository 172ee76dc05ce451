//! GitLab adapter.
//!
//! The project is addressed by its URL-encoded full namespace path (GitLab
//! accepts that anywhere a numeric project id fits). One `/changes` call
//! returns every file diff already split; one `/notes` call returns the
//! flat discussion.

use serde_json::{json, Value};
use url::Url;

use super::http::{expect_json, opt_str_of, str_of};
use super::ProviderContext;
use crate::error::{Error, Result};
use crate::link::{resolve, ResolvedTarget};
use crate::types::{ChangedFile, CommentKind, DiscussionComment, PullRequestRecord};

const PLATFORM: &str = "gitlab";

#[derive(Debug, Clone, Copy)]
pub struct GitlabAdapter;

struct Endpoints {
    host: String,
    api_base: String,
    /// URL-encoded namespace path ("group%2Fsub%2Fproj").
    project_id: String,
    number: u64,
}

fn endpoints(pr_url: &str) -> Result<Endpoints> {
    let (host, namespace_path, number) = match resolve(pr_url) {
        Ok(ResolvedTarget::Gitlab {
            host,
            namespace_path,
            number,
        }) => (host, namespace_path, number),
        _ => return Err(Error::Provider("invalid GitLab MR link".into())),
    };
    let scheme = Url::parse(pr_url)
        .map(|u| u.scheme().to_string())
        .unwrap_or_else(|_| "https".into());
    Ok(Endpoints {
        api_base: format!("{scheme}://{host}/api/v4"),
        project_id: urlencoding::encode(&namespace_path).into_owned(),
        host,
        number,
    })
}

impl GitlabAdapter {
    pub async fn fetch_pr(&self, ctx: &ProviderContext) -> Result<PullRequestRecord> {
        let ep = endpoints(&ctx.pr_url)?;
        let token =
            ctx.require_token(PLATFORM, &ep.host, "GitLab token required for this MR/project.")?;
        let client = ctx.client()?;
        let mr_base = format!(
            "{}/projects/{}/merge_requests/{}",
            ep.api_base, ep.project_id, ep.number
        );

        let mr = expect_json(
            client.get(&mr_base).header("PRIVATE-TOKEN", token),
            PLATFORM,
            &ep.host,
        )
        .await?;
        let changes = expect_json(
            client
                .get(format!("{mr_base}/changes"))
                .header("PRIVATE-TOKEN", token),
            PLATFORM,
            &ep.host,
        )
        .await?;
        let notes = expect_json(
            client
                .get(format!("{mr_base}/notes"))
                .header("PRIVATE-TOKEN", token),
            PLATFORM,
            &ep.host,
        )
        .await?;

        let changed_files: Vec<ChangedFile> = changes
            .get("changes")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .map(|c| ChangedFile {
                        path: opt_str_of(c, "new_path")
                            .or_else(|| opt_str_of(c, "old_path"))
                            .unwrap_or_else(|| "unknown".into()),
                        patch: opt_str_of(c, "diff"),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let discussion: Vec<DiscussionComment> = notes
            .as_array()
            .map(|list| {
                list.iter()
                    .map(|n| DiscussionComment {
                        author: n
                            .get("author")
                            .map(|a| {
                                opt_str_of(a, "username")
                                    .or_else(|| opt_str_of(a, "name"))
                                    .unwrap_or_default()
                            })
                            .unwrap_or_default(),
                        body: str_of(n, "body"),
                        url: opt_str_of(n, "web_url").or_else(|| opt_str_of(n, "url")),
                        file_path: None,
                        created_at: opt_str_of(n, "created_at"),
                        kind: CommentKind::Comment,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(PullRequestRecord {
            platform: PLATFORM.into(),
            host: ep.host,
            url: ctx.pr_url.clone(),
            title: str_of(&mr, "title"),
            description: str_of(&mr, "description"),
            raw: json!({
                "mr": mr,
                "changes_count": changed_files.len(),
                "notes_count": discussion.len(),
            }),
            changed_files,
            discussion,
        })
    }

    pub async fn post_comment(&self, ctx: &ProviderContext, body_markdown: &str) -> Result<String> {
        let ep = endpoints(&ctx.pr_url)?;
        let token =
            ctx.require_token(PLATFORM, &ep.host, "GitLab token required to post MR comments.")?;
        let client = ctx.client()?;

        let url = format!(
            "{}/projects/{}/merge_requests/{}/notes",
            ep.api_base, ep.project_id, ep.number
        );
        let created = expect_json(
            client
                .post(url)
                .header("PRIVATE-TOKEN", token)
                .json(&json!({ "body": body_markdown })),
            PLATFORM,
            &ep.host,
        )
        .await?;
        Ok(opt_str_of(&created, "web_url")
            .or_else(|| opt_str_of(&created, "url"))
            .unwrap_or_default())
    }
}

// ── Tests ────────────────────────────────────────────────────────
