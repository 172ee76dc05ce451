//! Review engines.
//!
//! An engine takes the normalized PR content and produces a
//! [`ReviewResult`]. The orchestrator treats engines as collaborators
//! behind the [`ReviewEngine`] trait: an LLM-backed engine when one is
//! configured, otherwise the zero-setup heuristic engine.

pub mod heuristic;
pub mod openai;
pub mod prompt;
pub mod select;

use async_trait::async_trait;

use crate::config::LlmSettings;
use crate::error::{Error, Result};
use crate::types::{ChangedFile, DiscussionComment, ReviewResult};

/// Default API version for AzureOpenAI-compatible gateways.
const DEFAULT_GATEWAY_API_VERSION: &str = "2024-02-15-preview";

/// A review engine collaborator.
#[async_trait]
pub trait ReviewEngine: Send + Sync + std::fmt::Debug {
    /// Identity string recorded into [`ReviewResult::model`],
    /// e.g. "heuristic" or "openai:gpt-4o-mini".
    fn identity(&self) -> String;

    async fn review(
        &self,
        pr_url: &str,
        language: &str,
        files: &[ChangedFile],
        discussion: &[DiscussionComment],
    ) -> Result<ReviewResult>;
}

/// Providers that call out to an LLM rather than running locally.
pub fn is_llm_backed(provider: &str) -> bool {
    matches!(provider, "openai" | "azure_openai")
}

/// Build the engine for a (provider, model) choice.
///
/// In strict mode a misconfiguration (missing key, incomplete gateway
/// settings) is surfaced as [`Error::Config`]; otherwise it silently falls
/// back to the heuristic engine so a review always completes.
pub fn build_engine(
    provider: &str,
    model: &str,
    settings: &LlmSettings,
    strict: bool,
) -> Result<Box<dyn ReviewEngine>> {
    if !is_llm_backed(provider) {
        return Ok(Box::new(heuristic::HeuristicEngine));
    }

    let Some(api_key) = settings.api_key() else {
        if strict {
            return Err(Error::Config(
                "OpenAI selected but no API key is configured. Set openai_api_key in the config or OPENAI_API_KEY in the environment.".into(),
            ));
        }
        tracing::debug!(provider, "no API key configured; falling back to heuristic engine");
        return Ok(Box::new(heuristic::HeuristicEngine));
    };

    if let Some(endpoint) = settings.endpoint() {
        // A configured endpoint means an AzureOpenAI-compatible gateway:
        // api-key header auth and deployment-addressed chat completions.
        let api_version = settings
            .api_version()
            .unwrap_or_else(|| DEFAULT_GATEWAY_API_VERSION.to_string());
        let deployment = settings
            .deployment()
            .or_else(|| Some(model.to_string()).filter(|m| !m.is_empty()))
            .unwrap_or_else(|| "default".to_string());
        match openai::GatewayEngine::new(endpoint, api_key, api_version, deployment) {
            Ok(engine) => return Ok(Box::new(engine)),
            Err(err) if strict => return Err(err),
            Err(err) => {
                tracing::warn!(%err, "gateway engine unavailable; falling back to heuristic engine");
                return Ok(Box::new(heuristic::HeuristicEngine));
            }
        }
    }

    Ok(Box::new(openai::OpenAiEngine::new(api_key, model.to_string())))
}

// ── Tests ────────────────────────────────────────────────────────
