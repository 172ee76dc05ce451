//! Azure DevOps adapter.
//!
//! No Azure endpoint returns ready-made per-file patches, so the fetch is a
//! pipeline of stages, each one testable with canned payloads:
//!
//! 1. list PR iterations, take the highest numeric id
//! 2. page that iteration's change entries, dedupe the changed paths
//! 3. fetch each path's blob at the target commit (old side) and at the
//!    source commit (new side); fetches are independent, so they run
//!    concurrently
//! 4. synthesize a 3-context-line unified diff per path
//!
//! Org/project/repo appear as URL path segments and may contain spaces;
//! segments are decoded and re-encoded so pre-escaped callers are not
//! double-encoded. A PAT rides as the password of HTTP Basic auth with an
//! empty username. Azure answers missing/invalid auth with a 200 HTML login
//! page more often than with a 401, and the JSON helpers treat that as an auth
//! failure.

use futures_util::future::join_all;
use serde_json::{json, Value};
use similar::TextDiff;
use url::Url;

use super::http::{
    content_type_of, deep_str, expect_json, looks_like_html, opt_str_of, str_of, truncate,
};
use super::ProviderContext;
use crate::error::{Error, Result};
use crate::link::{resolve, ResolvedTarget};
use crate::types::{ChangedFile, CommentKind, DiscussionComment, PullRequestRecord};

const PLATFORM: &str = "azure";
const API_VERSION: &str = "7.1-preview.1";

/// Change-entry page size and the row cap that bounds the paging loop.
const CHANGES_PAGE_SIZE: usize = 500;
const MAX_CHANGE_ROWS: usize = 5000;

/// Blob contents are only fetched for this many changed paths.
const MAX_DIFF_FILES: usize = 30;

/// A single synthesized diff is cut off past this many characters.
const MAX_DIFF_CHARS: usize = 200_000;
const TRUNCATION_MARKER: &str = "\n... (diff truncated)\n";

const DIFF_CONTEXT_LINES: usize = 3;

#[derive(Debug, Clone, Copy)]
pub struct AzureAdapter;

struct Target {
    host: String,
    org: String,
    project: String,
    repo: String,
    number: u64,
}

fn target_of(pr_url: &str) -> Result<Target> {
    match resolve(pr_url) {
        Ok(ResolvedTarget::Azure {
            host,
            org,
            project,
            repo,
            number,
        }) => Ok(Target {
            host,
            org,
            project,
            repo,
            number,
        }),
        _ => Err(Error::Provider("invalid Azure DevOps PR link".into())),
    }
}

/// Percent-encode one URL path segment without double-encoding: a raw
/// "OTA Tool" and a pre-escaped "OTA%20Tool" both come out as "OTA%20Tool".
fn encode_segment(segment: &str) -> String {
    let decoded = urlencoding::decode(segment)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    urlencoding::encode(&decoded).into_owned()
}

/// Collection base URL: dev.azure.com carries the org in the path, the
/// legacy *.visualstudio.com hosts carry it as the subdomain.
fn api_base(target: &Target, scheme: &str) -> String {
    let project_seg = encode_segment(&target.project);
    if target.host.ends_with("dev.azure.com") {
        let org_seg = encode_segment(&target.org);
        format!("{scheme}://{}/{org_seg}/{project_seg}", target.host)
    } else {
        format!("{scheme}://{}/{project_seg}", target.host)
    }
}

impl AzureAdapter {
    pub async fn fetch_pr(&self, ctx: &ProviderContext) -> Result<PullRequestRecord> {
        let t = target_of(&ctx.pr_url)?;
        let scheme = Url::parse(&ctx.pr_url)
            .map(|u| u.scheme().to_string())
            .unwrap_or_else(|_| "https".into());
        let base = api_base(&t, &scheme);
        self.fetch_with_base(ctx, &base).await
    }

    pub(crate) async fn fetch_with_base(
        &self,
        ctx: &ProviderContext,
        base: &str,
    ) -> Result<PullRequestRecord> {
        let t = target_of(&ctx.pr_url)?;
        let pat = ctx.require_token(PLATFORM, &t.host, "Azure DevOps PAT required for this PR/repo.")?;
        let client = ctx.client()?;
        let repo_seg = encode_segment(&t.repo);
        let pr_base = format!("{base}/_apis/git/repositories/{repo_seg}/pullRequests/{}", t.number);

        let pr = expect_json(
            client
                .get(&pr_base)
                .basic_auth("", Some(pat))
                .query(&[("api-version", API_VERSION)]),
            PLATFORM,
            &t.host,
        )
        .await?;

        let mut source_commit = deep_str(&pr, &["lastMergeSourceCommit", "commitId"]).map(str::to_string);
        let mut target_commit = deep_str(&pr, &["lastMergeTargetCommit", "commitId"]).map(str::to_string);
        if source_commit.is_none() || target_commit.is_none() {
            source_commit = source_commit.or_else(|| opt_str_of(&pr, "sourceRefName"));
            target_commit = target_commit.or_else(|| opt_str_of(&pr, "targetRefName"));
        }

        let iteration_id = latest_iteration_id(&client, &pr_base, pat, &t.host).await?;
        let entries = iteration_change_entries(&client, &pr_base, iteration_id, pat, &t.host).await?;
        let paths = change_entry_paths(&entries);

        let changed_files = match (&source_commit, &target_commit) {
            (Some(source), Some(target)) => {
                // Old side is the target branch, new side is the PR source.
                let (repo_seg, host) = (repo_seg.as_str(), t.host.as_str());
                let (source, target) = (source.as_str(), target.as_str());
                let fetches = paths.iter().take(MAX_DIFF_FILES).map(|path| {
                    let client = client.clone();
                    async move {
                        let before =
                            get_item_content(&client, base, repo_seg, path, target, pat, host)
                                .await?;
                        let after =
                            get_item_content(&client, base, repo_seg, path, source, pat, host)
                                .await?;
                        Ok::<ChangedFile, Error>(ChangedFile {
                            path: path.clone(),
                            patch: synthesize_diff(path, before.as_deref(), after.as_deref()),
                        })
                    }
                });
                join_all(fetches).await.into_iter().collect::<Result<Vec<_>>>()?
            }
            // Without both commit ids there is nothing to diff against.
            _ => paths
                .iter()
                .take(MAX_DIFF_FILES)
                .map(|p| ChangedFile {
                    path: p.clone(),
                    patch: None,
                })
                .collect(),
        };

        let threads = expect_json(
            client
                .get(format!("{pr_base}/threads"))
                .basic_auth("", Some(pat))
                .query(&[("api-version", API_VERSION)]),
            PLATFORM,
            &t.host,
        )
        .await?;
        let discussion = flatten_threads(&threads);

        Ok(PullRequestRecord {
            platform: PLATFORM.into(),
            host: t.host,
            url: ctx.pr_url.clone(),
            title: str_of(&pr, "title"),
            description: str_of(&pr, "description"),
            raw: json!({
                "pr": pr,
                "iteration_id": iteration_id,
                "files_count": changed_files.len(),
                "threads_count": discussion.len(),
            }),
            changed_files,
            discussion,
        })
    }

    pub async fn post_comment(&self, ctx: &ProviderContext, body_markdown: &str) -> Result<String> {
        let t = target_of(&ctx.pr_url)?;
        let scheme = Url::parse(&ctx.pr_url)
            .map(|u| u.scheme().to_string())
            .unwrap_or_else(|_| "https".into());
        let base = api_base(&t, &scheme);
        self.post_with_base(ctx, &base, body_markdown).await
    }

    pub(crate) async fn post_with_base(
        &self,
        ctx: &ProviderContext,
        base: &str,
        body_markdown: &str,
    ) -> Result<String> {
        let t = target_of(&ctx.pr_url)?;
        let pat =
            ctx.require_token(PLATFORM, &t.host, "Azure DevOps PAT required to post PR comments.")?;
        let client = ctx.client()?;
        let repo_seg = encode_segment(&t.repo);

        let url = format!(
            "{base}/_apis/git/repositories/{repo_seg}/pullRequests/{}/threads",
            t.number
        );
        let payload = json!({
            "comments": [{
                "parentCommentId": 0,
                "content": body_markdown,
                "commentType": 1,
            }],
            "status": 1,
        });
        let created = expect_json(
            client
                .post(url)
                .basic_auth("", Some(pat))
                .query(&[("api-version", API_VERSION)])
                .json(&payload),
            PLATFORM,
            &t.host,
        )
        .await?;
        // Thread deep links vary per host; the thread id still locates it.
        Ok(created
            .get("id")
            .map(|id| id.to_string())
            .unwrap_or_else(|| ctx.pr_url.clone()))
    }
}

// ── Pipeline stages ──────────────────────────────────────────────

/// Stage 1: highest numeric iteration id, defaulting to 1 for an empty list.
async fn latest_iteration_id(
    client: &reqwest::Client,
    pr_base: &str,
    pat: &str,
    host: &str,
) -> Result<i64> {
    let body = expect_json(
        client
            .get(format!("{pr_base}/iterations"))
            .basic_auth("", Some(pat))
            .query(&[("api-version", API_VERSION)]),
        PLATFORM,
        host,
    )
    .await?;
    let max = body
        .get("value")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|it| numeric_id(it.get("id")))
                .max()
                .unwrap_or(1)
        })
        .unwrap_or(1);
    Ok(max)
}

fn numeric_id(v: Option<&Value>) -> Option<i64> {
    let v = v?;
    v.as_i64()
        .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

/// Stage 2: page through the iteration's change entries.
async fn iteration_change_entries(
    client: &reqwest::Client,
    pr_base: &str,
    iteration_id: i64,
    pat: &str,
    host: &str,
) -> Result<Vec<Value>> {
    let mut all = Vec::new();
    let mut skip = 0usize;
    loop {
        let body = expect_json(
            client
                .get(format!("{pr_base}/iterations/{iteration_id}/changes"))
                .basic_auth("", Some(pat))
                .query(&[
                    ("api-version", API_VERSION.to_string()),
                    ("$top", CHANGES_PAGE_SIZE.to_string()),
                    ("$skip", skip.to_string()),
                ]),
            PLATFORM,
            host,
        )
        .await?;
        let entries = body
            .get("changeEntries")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let count = entries.len();
        all.extend(entries);
        if count < CHANGES_PAGE_SIZE {
            break;
        }
        skip += CHANGES_PAGE_SIZE;
        if skip > MAX_CHANGE_ROWS {
            break;
        }
    }
    Ok(all)
}

/// Changed paths from the entries, leading slash stripped, deduped in
/// first-seen order.
fn change_entry_paths(entries: &[Value]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for entry in entries {
        let Some(path) = deep_str(entry, &["item", "path"]) else {
            continue;
        };
        let path = path.strip_prefix('/').unwrap_or(path).to_string();
        if !out.contains(&path) {
            out.push(path);
        }
    }
    out
}

/// Stage 3: blob text at one commit. `includeContent=true` returns the raw
/// text for text files; binary/LFS cases come back as a JSON wrapper with a
/// `content` field, so the branch is on the declared content type. 404 means
/// the file does not exist on that side (added or deleted file).
async fn get_item_content(
    client: &reqwest::Client,
    base: &str,
    repo_seg: &str,
    path: &str,
    commit: &str,
    pat: &str,
    host: &str,
) -> Result<Option<String>> {
    let resp = client
        .get(format!("{base}/_apis/git/repositories/{repo_seg}/items"))
        .basic_auth("", Some(pat))
        .query(&[
            ("path", format!("/{path}")),
            ("includeContent", "true".to_string()),
            ("resolveLfs", "true".to_string()),
            ("versionDescriptor.version", commit.to_string()),
            ("versionDescriptor.versionType", "commit".to_string()),
            ("api-version", API_VERSION.to_string()),
        ])
        .send()
        .await?;

    let status = resp.status();
    if status.as_u16() == 404 {
        return Ok(None);
    }
    let content_type = content_type_of(&resp);
    let body = resp.text().await?;
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(Error::auth(
            PLATFORM,
            host,
            format!("azure auth failed ({})", status.as_u16()),
        ));
    }
    if status.as_u16() >= 400 {
        return Err(Error::Provider(format!(
            "azure items error {}: {}",
            status.as_u16(),
            truncate(&body, 500)
        )));
    }

    if content_type.contains("application/json") {
        return match serde_json::from_str::<Value>(&body) {
            Ok(Value::Object(obj)) => Ok(obj.get("content").and_then(Value::as_str).map(str::to_string)),
            Ok(_) => Ok(None),
            Err(_) if looks_like_html(&content_type, &body) => Err(Error::auth(
                PLATFORM,
                host,
                "Azure DevOps returned HTML instead of JSON from the items endpoint; the PAT may be missing or invalid",
            )),
            Err(_) => Err(Error::Provider(format!(
                "azure items returned invalid JSON: {}",
                truncate(&body, 800)
            ))),
        };
    }
    Ok(Some(body))
}

/// Stage 4: unified diff between the two blobs, truncated when enormous.
fn synthesize_diff(path: &str, before: Option<&str>, after: Option<&str>) -> Option<String> {
    if before.is_none() && after.is_none() {
        return None;
    }
    let before = before.unwrap_or("");
    let after = after.unwrap_or("");
    let text = TextDiff::from_lines(before, after)
        .unified_diff()
        .context_radius(DIFF_CONTEXT_LINES)
        .header(&format!("a/{path}"), &format!("b/{path}"))
        .to_string();
    match text.char_indices().nth(MAX_DIFF_CHARS) {
        Some((idx, _)) => Some(format!("{}{TRUNCATION_MARKER}", &text[..idx])),
        None => Some(text),
    }
}

/// Discussion threads flatten into one comment per nested comment; the
/// thread-level file path (when present in thread metadata) is carried onto
/// each of them.
fn flatten_threads(threads: &Value) -> Vec<DiscussionComment> {
    let mut out = Vec::new();
    let Some(items) = threads.get("value").and_then(Value::as_array) else {
        return out;
    };
    for thread in items {
        let file_path = thread_file_path(thread);
        let Some(comments) = thread.get("comments").and_then(Value::as_array) else {
            continue;
        };
        for c in comments {
            let author = c
                .get("author")
                .map(|a| {
                    opt_str_of(a, "displayName")
                        .or_else(|| opt_str_of(a, "uniqueName"))
                        .unwrap_or_default()
                })
                .unwrap_or_default();
            out.push(DiscussionComment {
                author,
                body: str_of(c, "content"),
                url: None,
                file_path: file_path.clone(),
                created_at: opt_str_of(c, "publishedDate")
                    .or_else(|| opt_str_of(c, "lastUpdatedDate")),
                kind: CommentKind::Thread,
            });
        }
    }
    out
}

fn thread_file_path(thread: &Value) -> Option<String> {
    let prop = thread.get("properties")?.get("filePath")?;
    prop.as_str()
        .map(str::to_string)
        // Azure property bags sometimes wrap values as {"$type": ..., "$value": ...}.
        .or_else(|| prop.get("$value").and_then(Value::as_str).map(str::to_string))
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PR_URL: &str = "https://dev.azure.com/org/proj/_git/repo/pullrequest/42";

    #[test]
    fn segment_encoding_never_double_encodes() {
        assert_eq!(encode_segment("OTA Update Path Tool"), "OTA%20Update%20Path%20Tool");
        assert_eq!(encode_segment("OTA%20Update%20Path%20Tool"), "OTA%20Update%20Path%20Tool");
        assert_eq!(encode_segment("plain"), "plain");
    }

    #[test]
    fn api_base_for_both_host_generations() {
        let t = Target {
            host: "dev.azure.com".into(),
            org: "my org".into(),
            project: "OTA Tool".into(),
            repo: "repo".into(),
            number: 1,
        };
        assert_eq!(
            api_base(&t, "https"),
            "https://dev.azure.com/my%20org/OTA%20Tool"
        );

        let legacy = Target {
            host: "myorg.visualstudio.com".into(),
            org: "myorg".into(),
            project: "proj".into(),
            repo: "repo".into(),
            number: 1,
        };
        assert_eq!(api_base(&legacy, "https"), "https://myorg.visualstudio.com/proj");
    }

    #[test]
    fn pre_escaped_pr_link_is_not_double_encoded() {
        // A pasted link whose project segment already carries %20.
        let t = target_of("https://dev.azure.com/org/OTA%20Update%20Path%20Tool/_git/repo/pullrequest/42")
            .unwrap();
        assert_eq!(
            api_base(&t, "https"),
            "https://dev.azure.com/org/OTA%20Update%20Path%20Tool"
        );
    }

    #[test]
    fn change_paths_dedupe_and_strip_leading_slash() {
        let entries = vec![
            json!({ "item": { "path": "/src/main.rs" } }),
            json!({ "item": { "path": "/src/lib.rs" } }),
            json!({ "item": { "path": "/src/main.rs" } }),
            json!({ "other": true }),
        ];
        assert_eq!(change_entry_paths(&entries), vec!["src/main.rs", "src/lib.rs"]);
    }

    #[test]
    fn synthesized_diff_labels_and_hunks() {
        let patch = synthesize_diff("src/main.rs", Some("a\nb\nc\n"), Some("a\nB\nc\n")).unwrap();
        assert!(patch.contains("a/src/main.rs"));
        assert!(patch.contains("b/src/main.rs"));
        assert!(patch.contains("@@"));
        assert!(patch.contains("-b"));
        assert!(patch.contains("+B"));
    }

    #[test]
    fn synthesized_diff_truncates_huge_output() {
        let before = String::new();
        let after = "x\n".repeat(400_000);
        let patch = synthesize_diff("big.txt", Some(&before), Some(&after)).unwrap();
        assert!(patch.ends_with(TRUNCATION_MARKER));
        assert!(patch.chars().count() <= MAX_DIFF_CHARS + TRUNCATION_MARKER.len());
    }

    #[test]
    fn diff_absent_when_both_sides_missing() {
        assert!(synthesize_diff("x", None, None).is_none());
        assert!(synthesize_diff("x", Some("a\n"), None).is_some());
    }

    #[test]
    fn thread_flattening_carries_file_path() {
        let threads = json!({
            "value": [{
                "properties": { "filePath": "/src/main.rs" },
                "comments": [
                    { "author": { "displayName": "Frida" }, "content": "hm", "publishedDate": "2024-03-03" },
                    { "author": { "uniqueName": "g@x" }, "content": "agreed" }
                ]
            }, {
                "comments": [ { "content": "general note" } ]
            }]
        });
        let flat = flatten_threads(&threads);
        assert_eq!(flat.len(), 3);
        assert_eq!(flat[0].author, "Frida");
        assert_eq!(flat[0].file_path.as_deref(), Some("/src/main.rs"));
        assert_eq!(flat[1].file_path.as_deref(), Some("/src/main.rs"));
        assert_eq!(flat[1].kind, CommentKind::Thread);
        assert!(flat[2].file_path.is_none());
    }

    #[tokio::test]
    async fn full_fetch_pipeline_synthesizes_patches() {
        let server = MockServer::start().await;
        let base = format!("{}/org/proj", server.uri());
        let pr_api = "/org/proj/_apis/git/repositories/repo/pullRequests/42";

        Mock::given(method("GET"))
            .and(path(pr_api))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "title": "Rename widget",
                "description": "d",
                "lastMergeSourceCommit": { "commitId": "src123" },
                "lastMergeTargetCommit": { "commitId": "dst456" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{pr_api}/iterations")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{ "id": 1 }, { "id": 3 }, { "id": 2 }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{pr_api}/iterations/3/changes")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "changeEntries": [
                    { "item": { "path": "/src/main.rs" } },
                    { "item": { "path": "/src/main.rs" } }
                ]
            })))
            .mount(&server)
            .await;
        // Old side (target commit) and new side (source commit) blobs.
        Mock::given(method("GET"))
            .and(path("/org/proj/_apis/git/repositories/repo/items"))
            .and(query_param("versionDescriptor.version", "dst456"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("fn main() {}\n")
                    .insert_header("content-type", "text/plain"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/org/proj/_apis/git/repositories/repo/items"))
            .and(query_param("versionDescriptor.version", "src123"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("fn main() { run() }\n")
                    .insert_header("content-type", "text/plain"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{pr_api}/threads")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [] })))
            .mount(&server)
            .await;

        let ctx = ProviderContext::new(PR_URL, Some("pat".into()));
        let record = AzureAdapter.fetch_with_base(&ctx, &base).await.unwrap();

        assert_eq!(record.platform, "azure");
        assert_eq!(record.title, "Rename widget");
        assert_eq!(record.changed_files.len(), 1);
        let patch = record.changed_files[0].patch.as_deref().unwrap();
        assert!(patch.contains("a/src/main.rs"));
        assert!(patch.contains("+fn main() { run() }"));
        assert!(patch.contains("-fn main() {}"));
    }

    #[tokio::test]
    async fn json_wrapped_blob_content_is_unwrapped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/org/proj/_apis/git/repositories/repo/items"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "content": "wrapped text" })),
            )
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let base = format!("{}/org/proj", server.uri());
        let content = get_item_content(&client, &base, "repo", "f.bin", "c1", "pat", "dev.azure.com")
            .await
            .unwrap();
        assert_eq!(content.as_deref(), Some("wrapped text"));
    }

    #[tokio::test]
    async fn missing_blob_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/org/proj/_apis/git/repositories/repo/items"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let base = format!("{}/org/proj", server.uri());
        let content = get_item_content(&client, &base, "repo", "gone.rs", "c1", "pat", "h")
            .await
            .unwrap();
        assert!(content.is_none());
    }

    #[tokio::test]
    async fn disguised_login_page_is_auth_required() {
        let server = MockServer::start().await;
        let base = format!("{}/org/proj", server.uri());
        Mock::given(method("GET"))
            .and(path("/org/proj/_apis/git/repositories/repo/pullRequests/42"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html>Sign in to your account</html>")
                    .insert_header("content-type", "text/html"),
            )
            .mount(&server)
            .await;

        let ctx = ProviderContext::new(PR_URL, Some("pat".into()));
        let err = AzureAdapter.fetch_with_base(&ctx, &base).await.unwrap_err();
        assert!(matches!(err, Error::AuthRequired { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn posts_a_thread_and_returns_its_id() {
        let server = MockServer::start().await;
        let base = format!("{}/org/proj", server.uri());
        Mock::given(method("POST"))
            .and(path("/org/proj/_apis/git/repositories/repo/pullRequests/42/threads"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 77 })))
            .mount(&server)
            .await;

        let ctx = ProviderContext::new(PR_URL, Some("pat".into()));
        let loc = AzureAdapter
            .post_with_base(&ctx, &base, "**INFO** body")
            .await
            .unwrap();
        assert_eq!(loc, "77");
    }
}
