//! Unified-diff hunk parsing and line-range validation.
//!
//! Review engines hallucinate line numbers. Every line-anchored suggestion
//! is checked against the hunks of the file's actual patch and nulled out
//! unless the full range sits inside one hunk. Partial overlap is rejected
//! because it risks anchoring the comment on the wrong line.

use std::sync::OnceLock;

use regex::Regex;

use crate::types::LineSide;

/// One hunk header from a unified diff: `@@ -old[,len] +new[,len] @@`.
/// Omitted counts default to 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnifiedDiffHunk {
    pub old_start: u64,
    pub old_len: u64,
    pub new_start: u64,
    pub new_len: u64,
}

impl UnifiedDiffHunk {
    /// Inclusive line range on the requested side. A zero-length hunk still
    /// anchors at its start line (a pure deletion keeps its insertion point).
    pub fn range(&self, side: LineSide) -> (u64, u64) {
        let (start, len) = match side {
            LineSide::New => (self.new_start, self.new_len),
            LineSide::Old => (self.old_start, self.old_len),
        };
        if len == 0 {
            (start, start)
        } else {
            (start, start + len - 1)
        }
    }
}

fn hunk_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^@@\s*-(\d+)(?:,(\d+))?\s+\+(\d+)(?:,(\d+))?\s*@@").unwrap())
}

/// Extract hunk headers from a unified diff, in order of appearance.
/// Hunks are not merged or sorted.
pub fn parse_hunks(patch: &str) -> Vec<UnifiedDiffHunk> {
    let re = hunk_header_re();
    patch
        .lines()
        .filter_map(|line| {
            let caps = re.captures(line)?;
            let num = |i: usize, default: u64| {
                caps.get(i)
                    .map(|m| m.as_str().parse().unwrap_or(default))
                    .unwrap_or(default)
            };
            Some(UnifiedDiffHunk {
                old_start: num(1, 1),
                old_len: num(2, 1),
                new_start: num(3, 1),
                new_len: num(4, 1),
            })
        })
        .collect()
}

/// Clip a proposed line range against the patch's hunks.
///
/// Returns the null triple when the patch is absent, either bound is missing
/// or < 1, or the range is not fully contained in any single hunk. Reversed
/// bounds are swapped before validation; `side` normalizes to `new` unless
/// it is exactly `old`.
pub fn validate_line_range(
    patch: Option<&str>,
    start_line: Option<u64>,
    end_line: Option<u64>,
    side: Option<&str>,
) -> (Option<u64>, Option<u64>, Option<LineSide>) {
    let (patch, start, end) = match (patch, start_line, end_line) {
        (Some(p), Some(s), Some(e)) => (p, s, e),
        _ => return (None, None, None),
    };
    if start < 1 || end < 1 {
        return (None, None, None);
    }
    let (start, end) = if end < start { (end, start) } else { (start, end) };

    let hunks = parse_hunks(patch);
    if hunks.is_empty() {
        return (None, None, None);
    }

    let side = LineSide::normalize(side);
    for hunk in &hunks {
        let (hs, he) = hunk.range(side);
        if start >= hs && end <= he {
            return (Some(start), Some(end), Some(side));
        }
    }
    (None, None, None)
}

// ── Tests ────────────────────────────────────────────────────────
