//! prbot: local pull-request review bot.
//!
//! One PR/MR URL in, one sanitized review out:
//!
//! 1. [`link::resolve`] parses the URL into a typed forge target
//! 2. [`providers::Adapter`] fetches and normalizes the PR (metadata,
//!    per-file unified diffs, existing discussion)
//! 3. an [`engine::ReviewEngine`] (LLM-backed or heuristic) reviews it
//! 4. every line-anchored suggestion is validated against the real diff
//!    hunks ([`diff`]) so hallucinated line numbers never surface
//!
//! Supported forges: GitHub (and Enterprise), GitLab, Bitbucket Cloud,
//! Azure DevOps, Gitea.

pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod language;
pub mod link;
pub mod providers;
pub mod review;
pub mod types;

pub use error::{Error, Result};
