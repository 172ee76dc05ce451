//! Error taxonomy shared across the crate.
//!
//! Three failure classes cross the provider boundary and must stay
//! distinguishable all the way up to the CLI:
//!
//! - [`Error::UnsupportedHost`]: the URL matched no known forge shape
//! - [`Error::AuthRequired`]: missing/rejected credentials, including the
//!   disguised case where a forge answers 200 with an HTML login page
//! - [`Error::Provider`]: any other upstream failure

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The URL has no scheme/host or matches no supported PR/MR path shape.
    #[error("unsupported PR URL: {0} (supported: GitHub, GitLab, Bitbucket Cloud, Azure DevOps, Gitea)")]
    UnsupportedHost(String),

    /// Credentials are missing or were rejected by the forge.
    #[error("authentication required for {platform} at {host}: {message}")]
    AuthRequired {
        platform: String,
        host: String,
        message: String,
    },

    /// Any other upstream failure: HTTP >= 400, declared-JSON bodies that
    /// fail to parse, malformed platform-specific tokens.
    #[error("provider error: {0}")]
    Provider(String),

    /// Review-engine misconfiguration surfaced in strict mode.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn auth(platform: impl Into<String>, host: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AuthRequired {
            platform: platform.into(),
            host: host.into(),
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Provider(err.to_string())
    }
}
