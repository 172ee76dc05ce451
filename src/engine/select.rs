//! Engine/model selection for a detected language.
//!
//! Precedence: an exact per-language override wins (its omitted fields fall
//! back to the ambient provider/model); otherwise a built-in language map
//! supplies a default model under the ambient provider; unknown languages
//! get the ambient model or a hardcoded fallback. A non-LLM ambient
//! provider always forces the heuristic engine.

use std::collections::HashMap;

use super::is_llm_backed;
use crate::config::ModelOverride;

/// Fallback model for languages outside the built-in map.
pub const FALLBACK_MODEL: &str = "gpt-4o-mini";

pub const HEURISTIC_PROVIDER: &str = "heuristic";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelChoice {
    pub provider: String,
    pub model: String,
}

impl ModelChoice {
    fn heuristic() -> Self {
        Self {
            provider: HEURISTIC_PROVIDER.into(),
            model: HEURISTIC_PROVIDER.into(),
        }
    }
}

/// Built-in default model per language. "general" maps to the heuristic
/// engine so a PR with no recognizable code never burns tokens by default.
fn builtin_default(language: &str) -> Option<(&'static str, &'static str)> {
    Some(match language {
        "python" | "typescript" | "javascript" | "java" | "go" | "rust" | "csharp" | "cpp" => {
            ("openai", FALLBACK_MODEL)
        }
        "general" => (HEURISTIC_PROVIDER, HEURISTIC_PROVIDER),
        _ => return None,
    })
}

pub fn choose_model(
    language: &str,
    provider: &str,
    default_model: Option<&str>,
    overrides: &HashMap<String, ModelOverride>,
) -> ModelChoice {
    let language = language.to_ascii_lowercase();

    if let Some(o) = overrides.get(&language) {
        return ModelChoice {
            provider: o.provider.clone().unwrap_or_else(|| provider.to_string()),
            model: o
                .model
                .clone()
                .or_else(|| default_model.map(str::to_string))
                .unwrap_or_default(),
        };
    }

    // The active provider is respected; the language map primarily picks
    // the model/deployment name.
    if let Some((_, default)) = builtin_default(&language) {
        if is_llm_backed(provider) {
            return ModelChoice {
                provider: provider.to_string(),
                model: default_model.unwrap_or(default).to_string(),
            };
        }
        return ModelChoice::heuristic();
    }

    if is_llm_backed(provider) {
        return ModelChoice {
            provider: provider.to_string(),
            model: default_model.unwrap_or(FALLBACK_MODEL).to_string(),
        };
    }
    ModelChoice::heuristic()
}

// ── Tests ────────────────────────────────────────────────────────
