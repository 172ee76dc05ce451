//! Zero-setup fallback reviewer.
//!
//! Not as smart as an LLM, but always available and useful for basic
//! hygiene: flags likely secret material, stray debug output, and
//! unresolved TODO/FIXME markers in the diff.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use super::ReviewEngine;
use crate::error::Result;
use crate::types::{ChangedFile, DiscussionComment, ReviewComment, ReviewResult, Severity};

/// More than this many changed files earns a split-the-PR warning.
const LARGE_PR_FILES: usize = 20;

#[derive(Debug)]
pub struct HeuristicEngine;

fn secret_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)password\s*=|api[_-]?key").unwrap())
}

fn comment(file_path: Option<&str>, severity: Severity, message: &str, suggestion: &str) -> ReviewComment {
    ReviewComment {
        file_path: file_path.map(str::to_string),
        severity,
        message: message.into(),
        suggestion: Some(suggestion.into()),
        code_example: None,
        start_line: None,
        end_line: None,
        line_side: None,
        related_url: None,
        kind: None,
    }
}

#[async_trait]
impl ReviewEngine for HeuristicEngine {
    fn identity(&self) -> String {
        "heuristic".into()
    }

    async fn review(
        &self,
        pr_url: &str,
        language: &str,
        files: &[ChangedFile],
        _discussion: &[DiscussionComment],
    ) -> Result<ReviewResult> {
        let mut comments: Vec<ReviewComment> = Vec::new();
        let total_patch_lines: usize = files
            .iter()
            .map(|f| f.patch.as_deref().map(|p| p.matches('\n').count()).unwrap_or(0))
            .sum();

        let mut summary_bits = vec![format!("Reviewed {} changed file(s).", files.len())];
        if total_patch_lines > 0 {
            summary_bits.push(format!("Diff size ~{total_patch_lines} line(s)."));
        }
        summary_bits.push("Heuristic mode (no external LLM configured).".into());
        let summary = summary_bits
            .iter()
            .map(|b| format!("- {b}"))
            .collect::<Vec<_>>()
            .join("\n");

        for f in files {
            let Some(patch) = f.patch.as_deref() else {
                continue;
            };
            if secret_re().is_match(patch) {
                comments.push(comment(
                    Some(&f.path),
                    Severity::Warn,
                    "Potential secret material detected in diff.",
                    "Confirm no credentials/tokens are committed; use env vars/secret manager.",
                ));
            }
            if patch.contains("TODO") || patch.contains("FIXME") {
                comments.push(comment(
                    Some(&f.path),
                    Severity::Info,
                    "TODO/FIXME present in changes.",
                    "Make sure TODOs are tracked or resolved before merge.",
                ));
            }
            if language == "python" && patch.contains("print(") {
                comments.push(comment(
                    Some(&f.path),
                    Severity::Info,
                    "Debug prints added/modified.",
                    "Consider using structured logging instead of print in production code.",
                ));
            }
            if matches!(language, "javascript" | "typescript") && patch.contains("console.log") {
                comments.push(comment(
                    Some(&f.path),
                    Severity::Info,
                    "console.log added/modified.",
                    "Consider a logger or remove before merge.",
                ));
            }
        }

        // Hygiene notes that apply to every PR.
        comments.push(comment(
            None,
            Severity::Info,
            "Run formatting + tests before merge.",
            "Ensure CI passes; add/adjust tests for new behavior and edge cases.",
        ));
        if files.len() > LARGE_PR_FILES {
            comments.push(comment(
                None,
                Severity::Warn,
                "Large PR (many changed files).",
                "Consider splitting into smaller PRs for easier review/rollback.",
            ));
        }

        Ok(ReviewResult {
            pr_url: pr_url.into(),
            language: language.into(),
            model: self.identity(),
            summary,
            comments,
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, patch: &str) -> ChangedFile {
        ChangedFile {
            path: path.into(),
            patch: Some(patch.into()),
        }
    }

    #[tokio::test]
    async fn flags_secrets_and_todos() {
        let files = vec![file("conf.py", "+API_KEY = 'x'\n+# TODO revisit\n")];
        let result = HeuristicEngine
            .review("u", "python", &files, &[])
            .await
            .unwrap();
        let messages: Vec<&str> = result.comments.iter().map(|c| c.message.as_str()).collect();
        assert!(messages.iter().any(|m| m.contains("secret material")));
        assert!(messages.iter().any(|m| m.contains("TODO/FIXME")));
    }

    #[tokio::test]
    async fn debug_print_rules_are_language_gated() {
        let files = vec![file("a.py", "+print('dbg')\n")];
        let result = HeuristicEngine.review("u", "python", &files, &[]).await.unwrap();
        assert!(result.comments.iter().any(|c| c.message.contains("Debug prints")));

        // Same patch, different language: the rule stays quiet.
        let result = HeuristicEngine.review("u", "rust", &files, &[]).await.unwrap();
        assert!(!result.comments.iter().any(|c| c.message.contains("Debug prints")));
    }

    #[tokio::test]
    async fn warns_on_large_prs() {
        let files: Vec<ChangedFile> = (0..25).map(|i| file(&format!("f{i}.rs"), "+x\n")).collect();
        let result = HeuristicEngine.review("u", "rust", &files, &[]).await.unwrap();
        assert!(result.comments.iter().any(|c| c.message.contains("Large PR")));
    }

    #[tokio::test]
    async fn always_emits_hygiene_note_and_summary() {
        let result = HeuristicEngine.review("u", "general", &[], &[]).await.unwrap();
        assert_eq!(result.model, "heuristic");
        assert!(result.summary.contains("Reviewed 0 changed file(s)."));
        assert_eq!(result.comments.len(), 1);
        assert!(result.comments[0].message.contains("formatting + tests"));
    }
}
