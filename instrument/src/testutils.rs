use crate::identity::{IdentityError, TokenProvider};
use async_trait::async_trait;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use url::Url;

/// A request received by a [`MockUpstream`].
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: Method,
    pub query: HashMap<String, String>,
    /// Header names are lowercase.
    pub headers: HashMap<String, String>,
    pub body: Option<Value>,
}

#[derive(Clone)]
struct MockState {
    status: StatusCode,
    content_type: &'static str,
    body: Bytes,
    delay: Option<Duration>,
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
}

/// In-process HTTP server standing in for CIR, the converter or the metadata
/// server. Answers every request on one path with a fixed response and records
/// what it received.
pub struct MockUpstream {
    pub url: Url,
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: JoinHandle<()>,
}

impl MockUpstream {
    pub async fn spawn(path: &str, status: StatusCode, body: Value) -> Self {
        let body = Bytes::from(serde_json::to_vec(&body).unwrap());
        Self::start(path, status, "application/json", body, None).await
    }

    pub async fn spawn_text(path: &str, status: StatusCode, body: &str) -> Self {
        Self::start(path, status, "text/plain", Bytes::from(body.to_string()), None).await
    }

    /// Like [`MockUpstream::spawn`] but waits `delay` before answering.
    pub async fn spawn_slow(path: &str, delay: Duration, body: Value) -> Self {
        let body = Bytes::from(serde_json::to_vec(&body).unwrap());
        Self::start(path, StatusCode::OK, "application/json", body, Some(delay)).await
    }

    async fn start(
        path: &str,
        status: StatusCode,
        content_type: &'static str,
        body: Bytes,
        delay: Option<Duration>,
    ) -> Self {
        let recorded = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            status,
            content_type,
            body,
            delay,
            recorded: recorded.clone(),
        };

        let app = Router::new().route(path, any(record)).with_state(state);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        MockUpstream {
            url: Url::parse(&format!("http://{addr}")).unwrap(),
            recorded,
            handle,
        }
    }

    pub fn host_and_port(&self) -> String {
        format!(
            "{}:{}",
            self.url.host_str().unwrap(),
            self.url.port().unwrap()
        )
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.recorded.lock().unwrap().clone()
    }

    pub fn hits(&self) -> usize {
        self.recorded.lock().unwrap().len()
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn record(
    State(state): State<MockState>,
    method: Method,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let headers = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    state.recorded.lock().unwrap().push(RecordedRequest {
        method,
        query,
        headers,
        body: serde_json::from_slice(&body).ok(),
    });

    if let Some(delay) = state.delay {
        tokio::time::sleep(delay).await;
    }

    (
        state.status,
        [(CONTENT_TYPE, state.content_type)],
        state.body.clone(),
    )
        .into_response()
}

/// A base URL nothing is listening on.
pub async fn unreachable_url() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Url::parse(&format!("http://{addr}")).unwrap()
}

/// Hands out a fixed token, or fails when constructed without one.
pub struct StaticTokenProvider {
    token: Option<String>,
}

impl StaticTokenProvider {
    pub fn new(token: Option<&str>) -> Self {
        StaticTokenProvider {
            token: token.map(String::from),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn fetch_token(&self, audience: &str) -> Result<String, IdentityError> {
        self.token
            .clone()
            .ok_or_else(|| IdentityError::EmptyToken(audience.to_string()))
    }
}
