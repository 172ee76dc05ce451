//! Review prompt assembly shared by the LLM engines.

use crate::types::{ChangedFile, DiscussionComment};

/// Existing discussion is context, not the subject; cap it so a noisy PR
/// doesn't blow the token budget.
const MAX_DISCUSSION_ITEMS: usize = 30;
const MAX_DISCUSSION_BODY_CHARS: usize = 800;

/// System prompt demanding the JSON reply envelope the engines parse.
pub(crate) const SYSTEM_PROMPT: &str = "You are a PR review assistant. \
Output MUST be JSON with keys: summary (string), comments (array). \
Each comment: {file_path|null, severity: info|warn|error, message, suggestion|null, code_example|null, start_line|null, end_line|null, line_side|null, related_url|null, kind|null}.\n\
For line numbers: use NEW file line numbers derived from the diff hunks (@@ -a,b +c,d @@). If unsure, set them to null. \
If responding to an existing review comment thread, set kind='discussion_reply' and include related_url pointing to that thread/comment.";

pub fn build_review_prompt(
    language: &str,
    files: &[ChangedFile],
    discussion: &[DiscussionComment],
) -> String {
    let discussion_block = discussion_block(discussion);

    let chunks: Vec<String> = files
        .iter()
        .filter_map(|f| {
            f.patch
                .as_deref()
                .map(|patch| format!("FILE: {}\nPATCH:\n{}", f.path, patch))
        })
        .collect();

    if chunks.is_empty() {
        return format!(
            "You are a senior engineer. Review this PR for {language}. \
             No diffs were available; provide general review guidance and questions to ask.{discussion_block}"
        );
    }

    format!(
        "You are a senior engineer doing a careful PR review for {language}.\n\
         Return a concise review with:\n\
         1) Summary (3-6 bullets)\n\
         2) Issues (with severity: info|warn|error)\n\
         3) Concrete suggestions (prefer actionable edits)\n\
         4) If there are existing review comments and author justifications, evaluate them. \
         If you disagree with the justification, propose a respectful reply suggestion.\n\
         When a suggestion benefits from code, include a short code example (fenced) the dev can paste.\n\
         Be pragmatic and avoid nitpicking.\n\n{}{discussion_block}",
        chunks.join("\n\n")
    )
}

fn discussion_block(discussion: &[DiscussionComment]) -> String {
    if discussion.is_empty() {
        return String::new();
    }
    let items: Vec<String> = discussion
        .iter()
        .take(MAX_DISCUSSION_ITEMS)
        .map(|d| {
            let loc = d
                .file_path
                .as_deref()
                .map(|p| format!(" file={p}"))
                .unwrap_or_default();
            let url = d.url.as_deref().map(|u| format!(" url={u}")).unwrap_or_default();
            let mut body = d.body.trim().to_string();
            if body.chars().count() > MAX_DISCUSSION_BODY_CHARS {
                body = body.chars().take(MAX_DISCUSSION_BODY_CHARS).collect::<String>() + "…";
            }
            format!(
                "- [{}] author={}{loc}{url}\n  {body}",
                kind_label(d),
                d.author
            )
        })
        .collect();
    format!("\n\nEXISTING REVIEW DISCUSSION:\n{}\n", items.join("\n"))
}

fn kind_label(d: &DiscussionComment) -> &'static str {
    use crate::types::CommentKind::*;
    match d.kind {
        IssueComment => "issue_comment",
        ReviewComment => "review_comment",
        Thread => "thread",
        Comment => "comment",
    }
}

// ── Tests ────────────────────────────────────────────────────────
