//! Canonical data model shared by all provider adapters and review engines.
//!
//! Every forge normalizes into [`PullRequestRecord`]; every engine produces a
//! [`ReviewResult`]. Records live for one `review()`/`post_comment()` call
//! and are discarded afterward; nothing here is cached across calls.

use serde::{Deserialize, Serialize};

// ── Changed files ────────────────────────────────────────────────

/// One file touched by the PR, with its unified diff when the forge
/// exposes one (absent for binary/oversized/unavailable files).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangedFile {
    pub path: String,
    pub patch: Option<String>,
}

// ── Existing discussion ──────────────────────────────────────────

/// Which platform-level concept produced a discussion comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentKind {
    /// GitHub issue-level comment on the PR conversation.
    IssueComment,
    /// GitHub inline review comment (carries a file path).
    ReviewComment,
    /// Azure DevOps thread comment.
    Thread,
    /// Flat comment/note (GitLab, Bitbucket, Gitea).
    Comment,
}

/// Existing PR discussion pulled from the forge, kept as context so the
/// review engine can weigh prior comments and author justifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscussionComment {
    pub author: String,
    pub body: String,
    pub url: Option<String>,
    pub file_path: Option<String>,
    pub created_at: Option<String>,
    pub kind: CommentKind,
}

// ── Pull request record ──────────────────────────────────────────

/// A fetched, normalized pull/merge request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestRecord {
    pub platform: String,
    pub host: String,
    pub url: String,
    pub title: String,
    pub description: String,
    pub changed_files: Vec<ChangedFile>,
    pub discussion: Vec<DiscussionComment>,
    /// Opaque bag of platform payloads kept for diagnostics; never
    /// interpreted by the core.
    pub raw: serde_json::Value,
}

// ── Review output ────────────────────────────────────────────────

/// Severity of a review comment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }

    /// Lenient parse for engine output; anything unrecognized is `Info`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "warn" | "warning" => Self::Warn,
            "error" => Self::Error,
            _ => Self::Info,
        }
    }
}

/// Which side of the diff a line range refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineSide {
    /// Line numbers in the new file, after applying the PR changes.
    New,
    /// Line numbers in the old file.
    Old,
}

impl LineSide {
    /// Normalize engine-provided side strings; anything but "old" is `New`.
    pub fn normalize(s: Option<&str>) -> Self {
        match s.map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "old" => Self::Old,
            _ => Self::New,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Old => "old",
        }
    }
}

/// One suggestion from the review engine.
///
/// After sanitization, `start_line`/`end_line` are either both set (and
/// `start_line <= end_line`, inside a real diff hunk) or both `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewComment {
    pub file_path: Option<String>,
    pub severity: Severity,
    pub message: String,
    pub suggestion: Option<String>,
    pub code_example: Option<String>,
    pub start_line: Option<u64>,
    pub end_line: Option<u64>,
    pub line_side: Option<LineSide>,
    /// Link to an existing discussion comment this suggestion responds to.
    pub related_url: Option<String>,
    /// e.g. "code_suggestion" | "discussion_reply"
    pub kind: Option<String>,
}

/// Complete review of one PR.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewResult {
    pub pr_url: String,
    pub language: String,
    pub model: String,
    pub summary: String,
    pub comments: Vec<ReviewComment>,
}

impl ReviewResult {
    /// Render the review as a markdown report for terminal output.
    pub fn as_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str("## PR Review\n\n");
        out.push_str(&format!("- **PR**: {}\n", self.pr_url));
        out.push_str(&format!("- **Language**: {}\n", self.language));
        out.push_str(&format!("- **Model**: {}\n\n", self.model));
        out.push_str("### Summary\n\n");
        out.push_str(self.summary.trim());
        out.push_str("\n\n### Suggestions\n\n");
        if self.comments.is_empty() {
            out.push_str("- No suggestions generated.\n");
            return out;
        }
        for c in &self.comments {
            let loc = c
                .file_path
                .as_deref()
                .map(|p| format!("`{p}`: "))
                .unwrap_or_default();
            out.push_str(&format!("- **{}** {}{}\n", c.severity.label(), loc, c.message));
            if let Some(ref s) = c.suggestion {
                out.push_str(&format!("  - Suggestion: {s}\n"));
            }
        }
        out.push('\n');
        out
    }
}

// ── Tests ────────────────────────────────────────────────────────
