//! Test helpers shared by the `kimai-mcp` crates.
//!
//! [`MockUpstream`] is an in-process stand-in for a Kimai server: every request is recorded and
//! answered by a caller-supplied responder.

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// One request as seen by the mock upstream.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Zero-based arrival order.
    pub seq: usize,
    pub method: String,
    pub path: String,
    pub query: Vec<(String, String)>,
    /// Header names are lowercase.
    pub headers: HashMap<String, String>,
    /// Parsed JSON body, `None` when the body was empty or not JSON.
    pub body: Option<Value>,
}

impl RecordedRequest {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    #[must_use]
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn query_keys(&self) -> Vec<&str> {
        self.query.iter().map(|(k, _)| k.as_str()).collect()
    }
}

/// What the mock answers with.
#[derive(Debug, Clone)]
pub enum Reply {
    Json { status: u16, body: Value },
    Raw { status: u16, body: String },
    Delayed { delay: Duration, reply: Box<Reply> },
}

impl Reply {
    #[must_use]
    pub fn json(body: Value) -> Self {
        Self::Json { status: 200, body }
    }

    #[must_use]
    pub fn status(status: u16, body: Value) -> Self {
        Self::Json { status, body }
    }

    #[must_use]
    pub fn raw(status: u16, body: impl Into<String>) -> Self {
        Self::Raw {
            status,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn delayed(self, delay: Duration) -> Self {
        Self::Delayed {
            delay,
            reply: Box::new(self),
        }
    }
}

type Responder = dyn Fn(&RecordedRequest) -> Reply + Send + Sync;

struct MockState {
    requests: Mutex<Vec<RecordedRequest>>,
    responder: Box<Responder>,
}

/// A running mock upstream. Shuts down when dropped.
pub struct MockUpstream {
    base_url: String,
    state: Arc<MockState>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl MockUpstream {
    /// Bind `127.0.0.1:0` and serve every path with `responder`.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound.
    pub async fn start<F>(responder: F) -> Self
    where
        F: Fn(&RecordedRequest) -> Reply + Send + Sync + 'static,
    {
        let state = Arc::new(MockState {
            requests: Mutex::new(Vec::new()),
            responder: Box::new(responder),
        });

        let app = Router::new()
            .fallback(handle_request)
            .with_state(Arc::clone(&state));
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local_addr");

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });
        tokio::spawn(async move {
            let _ = server.await;
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
            shutdown: Some(shutdown_tx),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Snapshot of everything received so far, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().clone()
    }

    #[must_use]
    pub fn request_count(&self) -> usize {
        self.state.requests.lock().len()
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn handle_request(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let recorded = {
        let mut requests = state.requests.lock();
        let recorded = RecordedRequest {
            seq: requests.len(),
            method: method.as_str().to_string(),
            path: uri.path().to_string(),
            query: uri
                .query()
                .map(|q| {
                    url::form_urlencoded::parse(q.as_bytes())
                        .into_owned()
                        .collect()
                })
                .unwrap_or_default(),
            headers: headers
                .iter()
                .filter_map(|(k, v)| {
                    v.to_str()
                        .ok()
                        .map(|v| (k.as_str().to_ascii_lowercase(), v.to_string()))
                })
                .collect(),
            body: serde_json::from_slice(&body).ok(),
        };
        requests.push(recorded.clone());
        recorded
    };

    let mut reply = (state.responder)(&recorded);
    loop {
        match reply {
            Reply::Delayed { delay, reply: inner } => {
                tokio::time::sleep(delay).await;
                reply = *inner;
            }
            Reply::Json { status, body } => {
                return (status_code(status), axum::Json(body)).into_response();
            }
            Reply::Raw { status, body } => {
                return (
                    status_code(status),
                    [(header::CONTENT_TYPE, "application/json")],
                    body,
                )
                    .into_response();
            }
        }
    }
}

fn status_code(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}
