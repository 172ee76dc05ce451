//! LLM-backed review engines speaking the chat-completions protocol.
//!
//! [`OpenAiEngine`] talks to api.openai.com with bearer auth.
//! [`GatewayEngine`] talks to AzureOpenAI-compatible endpoints (including
//! corporate gateways) that accept `api-key` header auth and address a
//! *deployment* rather than a model name.
//!
//! Both demand a JSON reply envelope, but models love wrapping JSON in
//! ``` fences, so the parser strips those. A reply that still isn't JSON
//! degrades to a summary-only result instead of failing the review.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::prompt::{build_review_prompt, SYSTEM_PROMPT};
use super::ReviewEngine;
use crate::error::{Error, Result};
use crate::types::{ChangedFile, DiscussionComment, ReviewComment, ReviewResult, Severity};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const TEMPERATURE: f64 = 0.2;

// ── Direct OpenAI ────────────────────────────────────────────────

#[derive(Debug)]
pub struct OpenAiEngine {
    api_key: String,
    model: String,
    api_base: String,
    client: reqwest::Client,
}

impl OpenAiEngine {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            api_base: OPENAI_API_BASE.to_string(),
            client: reqwest::Client::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

#[async_trait]
impl ReviewEngine for OpenAiEngine {
    fn identity(&self) -> String {
        format!("openai:{}", self.model)
    }

    async fn review(
        &self,
        pr_url: &str,
        language: &str,
        files: &[ChangedFile],
        discussion: &[DiscussionComment],
    ) -> Result<ReviewResult> {
        let payload = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": build_review_prompt(language, files, discussion) },
            ],
            "temperature": TEMPERATURE,
        });
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;
        let content = chat_reply_content(resp).await?;
        Ok(result_from_reply(&content, pr_url, language, self.identity()))
    }
}

// ── AzureOpenAI-compatible gateway ───────────────────────────────

#[derive(Debug)]
pub struct GatewayEngine {
    endpoint: String,
    api_key: String,
    api_version: String,
    deployment: String,
    client: reqwest::Client,
}

impl GatewayEngine {
    pub fn new(
        endpoint: String,
        api_key: String,
        api_version: String,
        deployment: String,
    ) -> Result<Self> {
        let endpoint = endpoint.trim_end_matches('/').to_string();
        if endpoint.is_empty() || api_key.is_empty() || api_version.is_empty() || deployment.is_empty()
        {
            return Err(Error::Config(
                "gateway settings are incomplete (endpoint/api_key/api_version/deployment)".into(),
            ));
        }
        Ok(Self {
            endpoint,
            api_key,
            api_version,
            deployment,
            client: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl ReviewEngine for GatewayEngine {
    fn identity(&self) -> String {
        format!("openai:{}@custom", self.deployment)
    }

    async fn review(
        &self,
        pr_url: &str,
        language: &str,
        files: &[ChangedFile],
        discussion: &[DiscussionComment],
    ) -> Result<ReviewResult> {
        let payload = json!({
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": build_review_prompt(language, files, discussion) },
            ],
            "temperature": TEMPERATURE,
        });
        let url = format!(
            "{}/openai/deployments/{}/chat/completions",
            self.endpoint, self.deployment
        );
        let resp = self
            .client
            .post(url)
            .header("api-key", &self.api_key)
            .query(&[("api-version", &self.api_version)])
            .json(&payload)
            .send()
            .await?;
        let content = chat_reply_content(resp).await?;
        Ok(result_from_reply(&content, pr_url, language, self.identity()))
    }
}

// ── Reply handling ───────────────────────────────────────────────

async fn chat_reply_content(resp: reqwest::Response) -> Result<String> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(Error::Provider(format!(
            "chat completions error {}: {}",
            status.as_u16(),
            body.chars().take(500).collect::<String>()
        )));
    }
    let parsed: Value = serde_json::from_str(&body)
        .map_err(|_| Error::Provider("chat completions returned invalid JSON".into()))?;
    Ok(parsed["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or_default()
        .to_string())
}

fn result_from_reply(content: &str, pr_url: &str, language: &str, model: String) -> ReviewResult {
    let Some(envelope) = parse_json_reply(content) else {
        // Not JSON at all: keep whatever the model said as the summary.
        let summary = content.trim();
        return ReviewResult {
            pr_url: pr_url.into(),
            language: language.into(),
            model,
            summary: if summary.is_empty() {
                "No content returned by model.".into()
            } else {
                summary.into()
            },
            comments: vec![],
        };
    };

    let summary = match envelope.get("summary") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| {
                let s = value_as_trimmed_string(v);
                (!s.is_empty()).then(|| format!("- {s}"))
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Some(v) => value_as_trimmed_string(v),
        None => String::new(),
    };

    let comments = envelope
        .get("comments")
        .and_then(Value::as_array)
        .map(|list| list.iter().map(comment_from_value).collect())
        .unwrap_or_default();

    ReviewResult {
        pr_url: pr_url.into(),
        language: language.into(),
        model,
        summary: if summary.is_empty() { "No summary.".into() } else { summary },
        comments,
    }
}

fn comment_from_value(v: &Value) -> ReviewComment {
    let opt_string = |key: &str| {
        v.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    ReviewComment {
        file_path: opt_string("file_path"),
        severity: Severity::parse(v.get("severity").and_then(Value::as_str).unwrap_or("info")),
        message: v
            .get("message")
            .map(value_as_trimmed_string)
            .unwrap_or_default(),
        suggestion: opt_string("suggestion"),
        code_example: opt_string("code_example"),
        start_line: line_number(v.get("start_line")),
        end_line: line_number(v.get("end_line")),
        line_side: v
            .get("line_side")
            .and_then(Value::as_str)
            .map(|s| crate::types::LineSide::normalize(Some(s))),
        related_url: opt_string("related_url"),
        kind: opt_string("kind").map(|k| k.to_ascii_lowercase()),
    }
}

/// Accept integers and digit strings; anything else (floats, negatives,
/// prose) is treated as absent.
fn line_number(v: Option<&Value>) -> Option<u64> {
    match v? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
                .then(|| s.parse().ok())
                .flatten()
        }
        _ => None,
    }
}

fn value_as_trimmed_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Parse a model reply into a JSON object, tolerating ``` fences and an
/// optional leading "json" language tag.
fn parse_json_reply(content: &str) -> Option<Value> {
    let mut text = content.trim().to_string();
    if text.starts_with("```") {
        let parts: Vec<&str> = text.split("```").collect();
        text = if parts.len() >= 3 {
            parts[1].to_string()
        } else {
            text.trim_matches('`').to_string()
        };
    }
    let text = text.trim();
    let text = text
        .strip_prefix("json\n")
        .or_else(|| text.strip_prefix("json\r\n"))
        .unwrap_or(text)
        .trim();
    serde_json::from_str::<Value>(text)
        .ok()
        .filter(Value::is_object)
}

// ── Tests ────────────────────────────────────────────────────────
