//! Credential and endpoint resolution.
//!
//! Configuration is resolved exactly once at startup into an immutable [`KimaiConfig`] which is
//! then handed to the client adapter. Nothing downstream reads the environment again.

use crate::error::{Result, ToolError};
use std::fmt;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://demo.kimai.org";
pub const DEFAULT_TIMEOUT_SECS: u64 = 8;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 250;
const MIN_TIMEOUT_SECS: u64 = 1;
const MAX_TIMEOUT_SECS: u64 = 60;

pub const ENV_BASE_URL: &str = "KIMAI_BASE_URL";
pub const ENV_TOKEN: &str = "KIMAI_TOKEN";
pub const ENV_TOKEN_ALIAS: &str = "KIMAI_API_TOKEN";
pub const ENV_USER: &str = "KIMAI_USER";
pub const ENV_TIMEOUT_SECS: &str = "KIMAI_TIMEOUT_SECS";
pub const ENV_RETRY_BACKOFF_MS: &str = "KIMAI_RETRY_BACKOFF_MS";

/// How the client authenticates against Kimai.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <token>` (Kimai 2.x API tokens).
    Bearer { token: String },
    /// Legacy `X-AUTH-USER` / `X-AUTH-TOKEN` header pair.
    HeaderPair { username: String, token: String },
}

impl fmt::Debug for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bearer { .. } => f.debug_struct("Bearer").field("token", &"***").finish(),
            Self::HeaderPair { username, .. } => f
                .debug_struct("HeaderPair")
                .field("username", username)
                .field("token", &"***")
                .finish(),
        }
    }
}

/// Resolved upstream credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub base_url: String,
    pub scheme: AuthScheme,
}

impl Credentials {
    #[must_use]
    pub fn bearer(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            scheme: AuthScheme::Bearer {
                token: token.into(),
            },
        }
    }

    #[must_use]
    pub fn header_pair(
        base_url: impl Into<String>,
        username: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            scheme: AuthScheme::HeaderPair {
                username: username.into(),
                token: token.into(),
            },
        }
    }
}

/// Bounded retry policy for idempotent requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
        }
    }
}

/// Everything the client adapter needs, immutable for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KimaiConfig {
    pub credentials: Credentials,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl KimaiConfig {
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        }
    }

    /// Resolve configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Config`] when no complete credential set is present or the base URL
    /// is not a valid `http(s)` URL.
    pub fn from_env() -> Result<Self> {
        resolve_config(|key| std::env::var(key).ok())
    }
}

/// Resolve configuration from an arbitrary key lookup.
///
/// Blank values count as absent. A token alone selects bearer auth; a username plus token selects
/// the header pair. Anything less is a `missing credential` error.
///
/// # Errors
///
/// Returns [`ToolError::Config`] on missing credentials or an invalid base URL.
pub fn resolve_config<F>(lookup: F) -> Result<KimaiConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let read = |key: &str| {
        lookup(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let base_url = normalize_base_url(read(ENV_BASE_URL).as_deref().unwrap_or(DEFAULT_BASE_URL))?;

    let token = read(ENV_TOKEN).or_else(|| read(ENV_TOKEN_ALIAS));
    let username = read(ENV_USER);

    let scheme = match (username, token) {
        (Some(username), Some(token)) => AuthScheme::HeaderPair { username, token },
        (None, Some(token)) => AuthScheme::Bearer { token },
        (_, None) => return Err(ToolError::Config("missing credential".to_string())),
    };

    let timeout_secs = read(ENV_TIMEOUT_SECS)
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(DEFAULT_TIMEOUT_SECS, |v| {
            v.clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS)
        });
    let backoff_ms = read(ENV_RETRY_BACKOFF_MS)
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_BACKOFF_MS);

    Ok(KimaiConfig {
        credentials: Credentials { base_url, scheme },
        timeout: Duration::from_secs(timeout_secs),
        retry: RetryPolicy {
            max_retries: 1,
            backoff: Duration::from_millis(backoff_ms),
        },
    })
}

fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = Url::parse(trimmed)
        .map_err(|e| ToolError::Config(format!("invalid base URL '{trimmed}': {e}")))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ToolError::Config(format!(
            "invalid base URL '{trimmed}': unsupported scheme '{}'",
            url.scheme()
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn token_only_selects_bearer() {
        let cfg = resolve_config(lookup(&[(ENV_TOKEN, "abc")])).expect("config");
        assert_eq!(
            cfg.credentials.scheme,
            AuthScheme::Bearer {
                token: "abc".into()
            }
        );
        assert_eq!(cfg.credentials.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }

    #[test]
    fn user_and_token_select_header_pair() {
        let cfg = resolve_config(lookup(&[
            (ENV_USER, " susan "),
            (ENV_TOKEN, "secret"),
            (ENV_BASE_URL, "https://kimai.example.com/"),
        ]))
        .expect("config");
        assert_eq!(
            cfg.credentials.scheme,
            AuthScheme::HeaderPair {
                username: "susan".into(),
                token: "secret".into()
            }
        );
        assert_eq!(cfg.credentials.base_url, "https://kimai.example.com");
    }

    #[test]
    fn api_token_alias_is_accepted() {
        let cfg = resolve_config(lookup(&[(ENV_TOKEN_ALIAS, "t")])).expect("config");
        assert!(matches!(cfg.credentials.scheme, AuthScheme::Bearer { .. }));
    }

    #[test]
    fn missing_token_fails_fast() {
        let err = resolve_config(lookup(&[(ENV_USER, "susan")])).unwrap_err();
        assert_eq!(err, ToolError::Config("missing credential".into()));

        let err = resolve_config(lookup(&[(ENV_TOKEN, "   ")])).unwrap_err();
        assert_eq!(err, ToolError::Config("missing credential".into()));
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let err =
            resolve_config(lookup(&[(ENV_TOKEN, "t"), (ENV_BASE_URL, "ftp://x")])).unwrap_err();
        assert!(err.to_string().contains("unsupported scheme"));

        let err =
            resolve_config(lookup(&[(ENV_TOKEN, "t"), (ENV_BASE_URL, "not a url")])).unwrap_err();
        assert!(matches!(err, ToolError::Config(_)));
    }

    #[test]
    fn timeout_is_clamped() {
        let cfg = resolve_config(lookup(&[(ENV_TOKEN, "t"), (ENV_TIMEOUT_SECS, "600")]))
            .expect("config");
        assert_eq!(cfg.timeout, Duration::from_secs(60));
    }

    #[test]
    fn debug_output_redacts_tokens() {
        let creds = Credentials::header_pair("http://x", "susan", "hunter2");
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("susan"));
    }
}
