//! Authenticated HTTP client adapter for the Kimai REST API.
//!
//! Classifies every outcome into the [`ToolError`] taxonomy:
//! - 401/403 -> [`ToolError::Auth`] (never retried)
//! - 5xx, timeouts, connection failures -> [`ToolError::Transport`] (retried once, GET only)
//! - other non-2xx -> [`ToolError::Upstream`] (never retried)
//! - undecodable 2xx body -> [`ToolError::Upstream`] with `malformed json`

use crate::config::{AuthScheme, KimaiConfig, RetryPolicy};
use crate::error::{Result, ToolError};
use reqwest::header::ACCEPT;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Query parameters in insertion order. Values are already stringified scalars.
pub type QueryParams = Vec<(&'static str, String)>;

/// Shared, cheaply cloneable client. Immutable after construction.
#[derive(Clone)]
pub struct KimaiClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    base_url: String,
    scheme: AuthScheme,
    http: Client,
    timeout: Duration,
    retry: RetryPolicy,
}

impl KimaiClient {
    /// Build a client from resolved configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Config`] if the underlying HTTP client cannot be built.
    pub fn new(config: KimaiConfig) -> Result<Self> {
        let http = Client::builder()
            .build()
            .map_err(|e| ToolError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            inner: Arc::new(ClientInner {
                base_url: config.credentials.base_url,
                scheme: config.credentials.scheme,
                http,
                timeout: config.timeout,
                retry: config.retry,
            }),
        })
    }

    pub async fn get(&self, path: &str, query: &QueryParams) -> Result<Value> {
        self.request(Method::GET, path, query, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        self.request(Method::POST, path, &QueryParams::new(), Some(body))
            .await
    }

    pub async fn patch(&self, path: &str, body: &Value) -> Result<Value> {
        self.request(Method::PATCH, path, &QueryParams::new(), Some(body))
            .await
    }

    /// Issue one logical request, retrying idempotent methods on transport failures.
    ///
    /// # Errors
    ///
    /// See the module docs for the error classification.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &QueryParams,
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = build_url(&self.inner.base_url, path, query)?;
        let max_retries = if is_idempotent(&method) {
            self.inner.retry.max_retries
        } else {
            0
        };

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.send_once(&method, &url, body).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt <= max_retries => {
                    warn!(
                        method = %method,
                        path = %url.path(),
                        attempt,
                        error = %e,
                        "kimai request failed; retrying"
                    );
                    tokio::time::sleep(self.inner.retry.backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(&self, method: &Method, url: &Url, body: Option<&Value>) -> Result<Value> {
        debug!(method = %method, path = %url.path(), "kimai request");

        let mut request = self
            .inner
            .http
            .request(method.clone(), url.clone())
            .header(ACCEPT, "application/json")
            .timeout(self.inner.timeout);
        request = apply_auth(&self.inner.scheme, request);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(transport_error)?;
        debug!(method = %method, path = %url.path(), status = status.as_u16(), "kimai response");

        classify_response(status, &bytes)
    }
}

fn is_idempotent(method: &Method) -> bool {
    method == Method::GET || method == Method::HEAD
}

fn apply_auth(scheme: &AuthScheme, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    match scheme {
        AuthScheme::Bearer { token } => request.bearer_auth(token),
        AuthScheme::HeaderPair { username, token } => request
            .header("X-AUTH-USER", username)
            .header("X-AUTH-TOKEN", token),
    }
}

fn classify_response(status: StatusCode, bytes: &[u8]) -> Result<Value> {
    let code = status.as_u16();

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ToolError::Auth {
            status: code,
            body: String::from_utf8_lossy(bytes).into_owned(),
        });
    }

    if status.is_server_error() {
        let reason = status.canonical_reason().unwrap_or("Unknown");
        return Err(ToolError::Transport(format!(
            "upstream returned {code} {reason}: {}",
            String::from_utf8_lossy(bytes)
        )));
    }

    if !status.is_success() {
        return Err(ToolError::Upstream {
            status: code,
            body: String::from_utf8_lossy(bytes).into_owned(),
        });
    }

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }

    serde_json::from_slice(bytes).map_err(|_| ToolError::Upstream {
        status: code,
        body: "malformed json".to_string(),
    })
}

fn transport_error(e: reqwest::Error) -> ToolError {
    if e.is_timeout() {
        return ToolError::Transport("timeout".to_string());
    }
    ToolError::Transport(sanitize_reqwest_error(&e))
}

fn build_url(base_url: &str, path: &str, query: &QueryParams) -> Result<Url> {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    let mut url = Url::parse(&format!("{}{path}", base_url.trim_end_matches('/')))
        .map_err(|e| ToolError::Config(format!("invalid URL: {e}")))?;

    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in query {
            pairs.append_pair(key, value);
        }
    }

    Ok(url)
}

/// Drop credentials, query and fragment so error messages never echo secrets or filters.
#[must_use]
pub fn redact_url(url: &Url) -> String {
    let mut u = url.clone();
    let _ = u.set_username("");
    let _ = u.set_password(None);
    u.set_query(None);
    u.set_fragment(None);
    u.to_string()
}

#[must_use]
pub fn sanitize_reqwest_error(e: &reqwest::Error) -> String {
    let mut msg = e.to_string();
    if let Some(u) = e.url() {
        msg = msg.replace(u.as_str(), &redact_url(u));
    }
    msg
}
