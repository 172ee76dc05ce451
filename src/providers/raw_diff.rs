//! Splitting a combined raw unified diff into per-file patches.
//!
//! Bitbucket Cloud and Gitea only expose one diff for the whole PR; the
//! per-file patches are recovered by scanning for `diff --git a/X b/Y`
//! header lines and grouping everything up to the next header under the
//! `b/` path.

use std::sync::OnceLock;

use regex::Regex;

fn file_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^diff --git a/(.+?) b/(.+?)$").unwrap())
}

/// Best-effort split of a combined diff into `(path, patch)` pairs, in
/// first-seen order. Repeated headers for the same path append to that
/// path's block. Text before the first header is dropped.
pub(crate) fn split_by_file(diff_text: &str) -> Vec<(String, String)> {
    let re = file_header_re();
    let mut blocks: Vec<(String, Vec<&str>)> = Vec::new();
    let mut current: Option<usize> = None;

    for line in diff_text.lines() {
        if let Some(caps) = re.captures(line) {
            let path = caps.get(2).map(|m| m.as_str()).unwrap_or_default().to_string();
            let idx = match blocks.iter().position(|(p, _)| *p == path) {
                Some(i) => i,
                None => {
                    blocks.push((path, Vec::new()));
                    blocks.len() - 1
                }
            };
            blocks[idx].1.push(line);
            current = Some(idx);
            continue;
        }
        if let Some(idx) = current {
            blocks[idx].1.push(line);
        }
    }

    blocks
        .into_iter()
        .map(|(path, lines)| (path, lines.join("\n") + "\n"))
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────
