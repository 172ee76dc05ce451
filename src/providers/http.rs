//! Shared HTTP plumbing for the forge adapters.
//!
//! Every adapter funnels responses through these helpers so the failure
//! taxonomy is uniform: 401/403 is an auth failure, a 200 that turns out to
//! be an HTML login page is ALSO an auth failure (several forges answer
//! exactly that when a token is missing or scoped wrong), a declared-JSON
//! body that fails to parse is a provider failure.

use reqwest::header::CONTENT_TYPE;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::Value;

use crate::error::{Error, Result};

/// How much of an upstream error body to carry into the error message.
const ERROR_BODY_SNIPPET: usize = 500;

/// How much of a body to scan for a disguised HTML login page.
const HTML_SNIFF_WINDOW: usize = 800;

pub(crate) fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

pub(crate) fn looks_like_html(content_type: &str, body: &str) -> bool {
    content_type.contains("text/html")
        || truncate(body, HTML_SNIFF_WINDOW).to_ascii_lowercase().contains("<html")
}

fn status_error(status: StatusCode, body: &str, platform: &str, host: &str) -> Option<Error> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Some(Error::auth(
            platform,
            host,
            format!("{platform} auth failed ({})", status.as_u16()),
        ));
    }
    if status.as_u16() >= 400 {
        return Some(Error::Provider(format!(
            "{platform} API error {}: {}",
            status.as_u16(),
            truncate(body, ERROR_BODY_SNIPPET)
        )));
    }
    None
}

/// Send a request whose response must be JSON.
pub(crate) async fn expect_json(req: RequestBuilder, platform: &str, host: &str) -> Result<Value> {
    let resp = req.send().await?;
    let status = resp.status();
    let content_type = content_type_of(&resp);
    let body = resp.text().await?;

    if let Some(err) = status_error(status, &body, platform, host) {
        return Err(err);
    }

    if !content_type.contains("application/json") {
        if looks_like_html(&content_type, &body) {
            return Err(Error::auth(
                platform,
                host,
                format!("{platform} returned HTML instead of JSON; the token may be missing, invalid, or saved under the wrong host"),
            ));
        }
        return Err(Error::Provider(format!(
            "{platform} returned a non-JSON response (content-type: {content_type}): {}",
            truncate(&body, ERROR_BODY_SNIPPET)
        )));
    }

    serde_json::from_str(&body).map_err(|_| {
        Error::Provider(format!(
            "{platform} returned invalid JSON: {}",
            truncate(&body, HTML_SNIFF_WINDOW)
        ))
    })
}

/// Send a request whose response is raw text (diff endpoints). Status codes
/// are policed the same way; the body is returned as-is, since a legitimate
/// diff may well contain "<html".
pub(crate) async fn expect_text(req: RequestBuilder, platform: &str, host: &str) -> Result<String> {
    let resp = req.send().await?;
    let status = resp.status();
    let body = resp.text().await?;
    if let Some(err) = status_error(status, &body, platform, host) {
        return Err(err);
    }
    Ok(body)
}

pub(crate) fn content_type_of(resp: &Response) -> String {
    resp.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase()
}

// ── JSON field helpers ───────────────────────────────────────────

/// String field, empty when missing or non-string.
pub(crate) fn str_of(v: &Value, key: &str) -> String {
    v.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

/// Optional string field.
pub(crate) fn opt_str_of(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Walk a path of object keys, returning the string at the end.
pub(crate) fn deep_str<'a>(v: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut cur = v;
    for key in path {
        cur = cur.get(key)?;
    }
    cur.as_str()
}

// ── Tests ────────────────────────────────────────────────────────
