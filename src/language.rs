//! Dominant-language detection for a changed-file set.
//!
//! Counts extension→language matches across the PR's files; the most
//! frequent language wins. Files with no mapping don't vote, and an empty
//! tally falls back to "general".

use std::collections::HashMap;

use crate::types::ChangedFile;

fn language_for_extension(ext: &str) -> Option<&'static str> {
    Some(match ext {
        "py" | "ipynb" => "python",
        "js" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "java" => "java",
        "kt" => "kotlin",
        "go" => "go",
        "rs" => "rust",
        "cs" => "csharp",
        "cpp" | "cc" | "cxx" | "hpp" => "cpp",
        "c" | "h" => "c",
        "php" => "php",
        "rb" => "ruby",
        "swift" => "swift",
        "scala" => "scala",
        "sql" => "sql",
        "yaml" | "yml" => "yaml",
        "tf" => "terraform",
        "md" => "markdown",
        _ => return None,
    })
}

/// Detect the dominant language, or return the normalized override.
pub fn detect_language(changed_files: &[ChangedFile], override_lang: Option<&str>) -> String {
    if let Some(lang) = override_lang {
        let normalized = normalize_language(lang);
        if !normalized.is_empty() {
            return normalized;
        }
    }

    let mut counts: HashMap<&'static str, usize> = HashMap::new();
    for f in changed_files {
        let ext = match f.path.rsplit_once('.') {
            Some((_, e)) => e.to_ascii_lowercase(),
            None => continue,
        };
        if let Some(lang) = language_for_extension(&ext) {
            *counts.entry(lang).or_insert(0) += 1;
        }
    }

    counts
        .into_iter()
        // Tie-break on name so the winner is deterministic.
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(a.0)))
        .map(|(lang, _)| lang.to_string())
        .unwrap_or_else(|| "general".to_string())
}

pub fn normalize_language(lang: &str) -> String {
    lang.trim()
        .to_ascii_lowercase()
        .replace([' ', '-'], "")
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str) -> ChangedFile {
        ChangedFile {
            path: path.into(),
            patch: None,
        }
    }

    #[test]
    fn most_frequent_language_wins() {
        let files = vec![
            file("src/a.rs"),
            file("src/b.rs"),
            file("scripts/run.py"),
        ];
        assert_eq!(detect_language(&files, None), "rust");
    }

    #[test]
    fn unmatched_files_fall_back_to_general() {
        let files = vec![file("Makefile"), file("data.bin")];
        assert_eq!(detect_language(&files, None), "general");
        assert_eq!(detect_language(&[], None), "general");
    }

    #[test]
    fn override_wins_and_is_normalized() {
        let files = vec![file("src/a.rs")];
        assert_eq!(detect_language(&files, Some(" Type-Script ")), "typescript");
    }

    #[test]
    fn extension_case_is_ignored() {
        let files = vec![file("Main.JAVA")];
        assert_eq!(detect_language(&files, None), "java");
    }
}
