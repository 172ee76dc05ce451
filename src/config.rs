//! File-backed configuration: forge tokens, review-engine settings, and the
//! per-language model map.
//!
//! Stored as TOML under the user config directory. Tokens are keyed by
//! platform then by normalized host, so a pasted "https://dev.azure.com"
//! and a bare "dev.azure.com" resolve to the same credential.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::link::normalize_host;

const CONFIG_FILE: &str = "config.toml";

/// Review-engine settings. Environment variables fill in anything the file
/// leaves blank, so CI setups can avoid writing keys to disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Active engine provider: "heuristic" (default) or "openai".
    pub provider: Option<String>,
    /// Default model/deployment when no per-language override applies.
    pub default_model: Option<String>,
    pub openai_api_key: Option<String>,
    /// When set, requests go to an AzureOpenAI-compatible gateway instead of
    /// api.openai.com.
    pub openai_endpoint: Option<String>,
    pub openai_api_version: Option<String>,
    pub openai_deployment: Option<String>,
}

impl LlmSettings {
    pub fn api_key(&self) -> Option<String> {
        non_empty(self.openai_api_key.clone()).or_else(|| std::env::var("OPENAI_API_KEY").ok())
    }

    pub fn endpoint(&self) -> Option<String> {
        non_empty(self.openai_endpoint.clone()).or_else(|| std::env::var("OPENAI_ENDPOINT").ok())
    }

    pub fn api_version(&self) -> Option<String> {
        non_empty(self.openai_api_version.clone())
    }

    pub fn deployment(&self) -> Option<String> {
        non_empty(self.openai_deployment.clone())
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Per-language engine override. Omitted fields fall back to the ambient
/// provider/model at selection time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelOverride {
    pub provider: Option<String>,
    pub model: Option<String>,
}

/// The whole on-disk configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// platform -> normalized host -> token.
    #[serde(default)]
    pub tokens: HashMap<String, HashMap<String, String>>,
    #[serde(default)]
    pub llm: LlmSettings,
    /// language -> override.
    #[serde(default)]
    pub model_map: HashMap<String, ModelOverride>,
}

impl AppConfig {
    /// Look up the token for a (platform, host) pair. Both the query host
    /// and the stored keys are normalized, so scheme'd or cased entries
    /// still match.
    pub fn token_for(&self, platform: &str, host: &str) -> Option<&str> {
        let hosts = self.tokens.get(&platform.trim().to_ascii_lowercase())?;
        let wanted = normalize_host(host);
        hosts
            .iter()
            .find(|(k, _)| normalize_host(k) == wanted)
            .map(|(_, v)| v.as_str())
    }

    /// Store a token under normalized keys.
    pub fn set_token(&mut self, platform: &str, host: &str, token: &str) {
        let platform = platform.trim().to_ascii_lowercase();
        let host = normalize_host(host);
        self.tokens.entry(platform).or_default().insert(host, token.to_string());
    }
}

/// Loads and saves [`AppConfig`].
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Use the given directory, or the platform config dir for "prbot".
    pub fn new(dir: Option<PathBuf>) -> Result<Self> {
        let dir = match dir {
            Some(d) => d,
            None => ProjectDirs::from("dev", "prbot", "prbot")
                .context("could not determine a config directory")?
                .config_dir()
                .to_path_buf(),
        };
        Ok(Self {
            path: dir.join(CONFIG_FILE),
        })
    }

    pub fn load(&self) -> Result<AppConfig> {
        if !self.path.exists() {
            return Ok(AppConfig::default());
        }
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing {}", self.path.display()))
    }

    /// Atomic write (tmp + rename); the file holds credentials, so it is
    /// chmod 600 on unix.
    pub fn save(&self, cfg: &AppConfig) -> Result<()> {
        let dir = self.path.parent().context("config path has no parent")?;
        fs::create_dir_all(dir)?;
        let text = toml::to_string_pretty(cfg)?;
        let tmp = self.path.with_extension("toml.tmp");
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &self.path)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600));
        }
        Ok(())
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn round_trips_through_disk() {
        let tmp = TempDir::new().unwrap();
        let store = ConfigStore::new(Some(tmp.path().to_path_buf())).unwrap();

        let mut cfg = AppConfig::default();
        cfg.set_token("github", "github.com", "ghp_abc");
        cfg.llm.provider = Some("openai".into());
        cfg.llm.default_model = Some("gpt-4o-mini".into());
        cfg.model_map.insert(
            "python".into(),
            ModelOverride {
                provider: None,
                model: Some("gpt-4o".into()),
            },
        );
        store.save(&cfg).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.token_for("github", "github.com"), Some("ghp_abc"));
        assert_eq!(loaded.llm.provider.as_deref(), Some("openai"));
        assert_eq!(
            loaded.model_map.get("python").unwrap().model.as_deref(),
            Some("gpt-4o")
        );
    }

    #[test]
    fn missing_file_loads_defaults() {
        let tmp = TempDir::new().unwrap();
        let store = ConfigStore::new(Some(tmp.path().to_path_buf())).unwrap();
        let cfg = store.load().unwrap();
        assert!(cfg.tokens.is_empty());
    }

    #[test]
    fn token_lookup_normalizes_hosts() {
        let mut cfg = AppConfig::default();
        cfg.tokens.entry("azure".into()).or_default().insert(
            // un-normalized stored key, as a hand-edited file might contain
            "https://dev.azure.com".into(),
            "pat".into(),
        );
        assert_eq!(cfg.token_for("azure", "dev.azure.com"), Some("pat"));
        assert_eq!(cfg.token_for("azure", "DEV.AZURE.COM/org"), Some("pat"));
        assert_eq!(cfg.token_for("azure", "other.host"), None);
        assert_eq!(cfg.token_for("github", "dev.azure.com"), None);
    }

    #[test]
    fn set_token_normalizes_keys() {
        let mut cfg = AppConfig::default();
        cfg.set_token("GitHub", "HTTPS://GITHUB.COM/", "t");
        assert_eq!(cfg.tokens["github"]["github.com"], "t");
    }

    #[test]
    fn llm_settings_blank_fields_are_none() {
        let settings = LlmSettings {
            openai_api_key: Some("  ".into()),
            openai_deployment: Some("prod".into()),
            ..Default::default()
        };
        // Blank key falls through (possibly to the env var; absent in tests).
        if std::env::var("OPENAI_API_KEY").is_err() {
            assert_eq!(settings.api_key(), None);
        }
        assert_eq!(settings.deployment().as_deref(), Some("prod"));
    }
}
