//! PR/MR link resolution.
//!
//! Turns a pasted pull-request URL into a [`ResolvedTarget`] identifying the
//! forge and its path components. Shapes are mutually exclusive, so the match
//! order below is not load-bearing, except that Gitea's plural "pulls" is
//! the only thing distinguishing it from GitHub's "pull".

use url::Url;

use crate::error::{Error, Result};

/// A PR URL resolved to a forge plus its addressing fields.
///
/// `host` is the bare lowercase network location (hostname, plus `:port`
/// when the URL carries an explicit port); `number` is always > 0 because
/// the path patterns only match digit runs and a leading-zero PR id does
/// not occur on any supported forge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedTarget {
    Github {
        host: String,
        owner: String,
        repo: String,
        number: u64,
    },
    Gitea {
        host: String,
        owner: String,
        repo: String,
        number: u64,
    },
    Gitlab {
        host: String,
        /// Fully-qualified namespace path (group/subgroup/project); may
        /// itself contain `/`.
        namespace_path: String,
        number: u64,
    },
    Bitbucket {
        host: String,
        workspace: String,
        repo: String,
        number: u64,
    },
    Azure {
        host: String,
        org: String,
        project: String,
        repo: String,
        number: u64,
    },
}

impl ResolvedTarget {
    pub fn platform(&self) -> &'static str {
        match self {
            Self::Github { .. } => "github",
            Self::Gitea { .. } => "gitea",
            Self::Gitlab { .. } => "gitlab",
            Self::Bitbucket { .. } => "bitbucket",
            Self::Azure { .. } => "azure",
        }
    }

    pub fn host(&self) -> &str {
        match self {
            Self::Github { host, .. }
            | Self::Gitea { host, .. }
            | Self::Gitlab { host, .. }
            | Self::Bitbucket { host, .. }
            | Self::Azure { host, .. } => host,
        }
    }
}

/// Parse a PR/MR URL into a [`ResolvedTarget`].
///
/// Fails with [`Error::UnsupportedHost`] when the URL has no scheme/host or
/// matches no known path shape.
pub fn resolve(pr_url: &str) -> Result<ResolvedTarget> {
    let url = Url::parse(pr_url).map_err(|_| Error::UnsupportedHost(pr_url.to_string()))?;
    let host = match netloc(&url) {
        Some(h) => h,
        None => return Err(Error::UnsupportedHost(pr_url.to_string())),
    };
    let path = url.path().trim_end_matches('/');
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();

    // GitHub: /{owner}/{repo}/pull/{n}   Gitea: /{owner}/{repo}/pulls/{n}
    if segments.len() == 4 {
        if let Some(number) = pr_number(segments[3]) {
            let (owner, repo) = (segments[0], segments[1]);
            if !owner.is_empty() && !repo.is_empty() {
                match segments[2] {
                    "pull" => {
                        return Ok(ResolvedTarget::Github {
                            host,
                            owner: owner.to_string(),
                            repo: repo.to_string(),
                            number,
                        })
                    }
                    "pulls" => {
                        return Ok(ResolvedTarget::Gitea {
                            host,
                            owner: owner.to_string(),
                            repo: repo.to_string(),
                            number,
                        })
                    }
                    _ => {}
                }
            }
        }
    }

    // GitLab: /{namespace...}/-/merge_requests/{n}
    // Namespace paths can nest, so split on the RIGHTMOST marker occurrence.
    if let Some(idx) = path.rfind("/-/merge_requests/") {
        let namespace_path = path[..idx].trim_start_matches('/');
        let rest = &path[idx + "/-/merge_requests/".len()..];
        if !namespace_path.is_empty() {
            if let Some(number) = pr_number(rest) {
                return Ok(ResolvedTarget::Gitlab {
                    host,
                    namespace_path: namespace_path.to_string(),
                    number,
                });
            }
        }
    }

    // Bitbucket Cloud: /{workspace}/{repo}/pull-requests/{n}
    if segments.len() == 4 && segments[2] == "pull-requests" && host.ends_with("bitbucket.org") {
        if let Some(number) = pr_number(segments[3]) {
            return Ok(ResolvedTarget::Bitbucket {
                host,
                workspace: segments[0].to_string(),
                repo: segments[1].to_string(),
                number,
            });
        }
    }

    // Azure DevOps: /{org}/{project}/_git/{repo}/pullrequest/{n}
    if segments.len() == 6
        && segments[2] == "_git"
        && segments[4] == "pullrequest"
        && host.ends_with("dev.azure.com")
    {
        if let Some(number) = pr_number(segments[5]) {
            return Ok(ResolvedTarget::Azure {
                host,
                org: segments[0].to_string(),
                project: segments[1].to_string(),
                repo: segments[3].to_string(),
                number,
            });
        }
    }

    // Azure legacy: https://{org}.visualstudio.com/{project}/_git/{repo}/pullrequest/{n}
    if segments.len() == 5
        && segments[1] == "_git"
        && segments[3] == "pullrequest"
        && host.ends_with("visualstudio.com")
    {
        if let Some(number) = pr_number(segments[4]) {
            let org = host.split('.').next().unwrap_or_default().to_string();
            return Ok(ResolvedTarget::Azure {
                host,
                org,
                project: segments[0].to_string(),
                repo: segments[2].to_string(),
                number,
            });
        }
    }

    Err(Error::UnsupportedHost(pr_url.to_string()))
}

/// Bare lowercase network location, keeping an explicit `:port` when present.
fn netloc(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    match url.port() {
        Some(port) => Some(format!("{host}:{port}")),
        None => Some(host),
    }
}

fn pr_number(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<u64>().ok().filter(|n| *n > 0)
}

/// Normalize a user-provided host value to a bare lowercase netloc.
///
/// "https://dev.azure.com" -> "dev.azure.com"; "dev.azure.com/foo" ->
/// "dev.azure.com"; "GITHUB.COM" -> "github.com".
pub fn normalize_host(value: &str) -> String {
    let mut v = value.trim();
    if v.is_empty() {
        return String::new();
    }
    if let Some(idx) = v.find("://") {
        v = &v[idx + 3..];
    }
    if let Some(idx) = v.find('/') {
        v = &v[..idx];
    }
    v.to_ascii_lowercase()
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_github() {
        let t = resolve("https://github.com/acme/repo/pull/123").unwrap();
        assert_eq!(
            t,
            ResolvedTarget::Github {
                host: "github.com".into(),
                owner: "acme".into(),
                repo: "repo".into(),
                number: 123,
            }
        );
    }

    #[test]
    fn resolves_gitea_by_plural_pulls() {
        let t = resolve("https://gitea.example.com/acme/repo/pulls/123").unwrap();
        assert_eq!(t.platform(), "gitea");
        assert_eq!(t.host(), "gitea.example.com");
    }

    #[test]
    fn resolves_gitlab_flat_and_nested_namespaces() {
        let t = resolve("https://gitlab.com/acme/repo/-/merge_requests/7").unwrap();
        assert_eq!(
            t,
            ResolvedTarget::Gitlab {
                host: "gitlab.com".into(),
                namespace_path: "acme/repo".into(),
                number: 7,
            }
        );

        let t = resolve("https://gitlab.example.io/group/subgroup/proj/-/merge_requests/9").unwrap();
        assert_eq!(
            t,
            ResolvedTarget::Gitlab {
                host: "gitlab.example.io".into(),
                namespace_path: "group/subgroup/proj".into(),
                number: 9,
            }
        );
    }

    #[test]
    fn gitlab_split_uses_rightmost_marker() {
        // A namespace that itself contains the marker literal: the split
        // point must be the rightmost occurrence.
        let t = resolve("https://gitlab.com/a/-/merge_requests/b/-/merge_requests/3").unwrap();
        assert_eq!(
            t,
            ResolvedTarget::Gitlab {
                host: "gitlab.com".into(),
                namespace_path: "a/-/merge_requests/b".into(),
                number: 3,
            }
        );
    }

    #[test]
    fn resolves_bitbucket_cloud_only() {
        let t = resolve("https://bitbucket.org/acme/repo/pull-requests/9").unwrap();
        assert_eq!(
            t,
            ResolvedTarget::Bitbucket {
                host: "bitbucket.org".into(),
                workspace: "acme".into(),
                repo: "repo".into(),
                number: 9,
            }
        );
        // The same path shape on another host is not Bitbucket.
        assert!(resolve("https://example.com/acme/repo/pull-requests/9").is_err());
    }

    #[test]
    fn resolves_azure_new_and_legacy() {
        let t = resolve("https://dev.azure.com/org/proj/_git/repo/pullrequest/42").unwrap();
        assert_eq!(
            t,
            ResolvedTarget::Azure {
                host: "dev.azure.com".into(),
                org: "org".into(),
                project: "proj".into(),
                repo: "repo".into(),
                number: 42,
            }
        );

        let t = resolve("https://myorg.visualstudio.com/proj/_git/repo/pullrequest/42").unwrap();
        assert_eq!(
            t,
            ResolvedTarget::Azure {
                host: "myorg.visualstudio.com".into(),
                org: "myorg".into(),
                project: "proj".into(),
                repo: "repo".into(),
                number: 42,
            }
        );
    }

    #[test]
    fn keeps_explicit_port_in_host() {
        let t = resolve("https://gitea.example.com:3000/acme/repo/pulls/5").unwrap();
        assert_eq!(t.host(), "gitea.example.com:3000");
    }

    #[test]
    fn trailing_slash_is_tolerated() {
        assert!(resolve("https://github.com/acme/repo/pull/123/").is_ok());
    }

    #[test]
    fn rejects_unsupported_urls() {
        for url in [
            "https://example.com/something",
            "https://github.com/acme/repo/pull/abc",
            "https://github.com/acme/repo/pull/0",
            "not a url",
            "file:///etc/passwd",
            "https://github.com/acme/repo",
        ] {
            assert!(
                matches!(resolve(url), Err(Error::UnsupportedHost(_))),
                "expected UnsupportedHost for {url}"
            );
        }
    }

    #[test]
    fn normalize_host_strips_scheme_and_path() {
        assert_eq!(normalize_host("https://dev.azure.com"), "dev.azure.com");
        assert_eq!(normalize_host("dev.azure.com/foo"), "dev.azure.com");
        assert_eq!(normalize_host("GITHUB.COM"), "github.com");
        assert_eq!(normalize_host("  "), "");
    }
}
