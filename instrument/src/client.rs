use crate::config::{CIR_API_BASE_URL, CONVERTER_SERVICE_API_BASE_URL};
use crate::errors::ProxyError;
use crate::identity::TokenProvider;
use crate::metrics_defs::{UPSTREAM_DURATION, UPSTREAM_REQUESTS};
use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;
use shared::{counter, histogram};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// The upstream services the proxy talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Service {
    Cir,
    Converter,
}

impl Service {
    /// Configuration key holding the base URL of this service.
    pub const fn base_url_setting(&self) -> &'static str {
        match self {
            Service::Cir => CIR_API_BASE_URL,
            Service::Converter => CONVERTER_SERVICE_API_BASE_URL,
        }
    }

    /// Metric label for this service.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Service::Cir => "cir",
            Service::Converter => "converter",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Service::Cir => "CIR service",
            Service::Converter => "Converter Service",
        })
    }
}

/// Connection settings for one upstream, borrowed from the loaded config.
#[derive(Clone, Copy, Debug)]
pub struct Upstream<'a> {
    pub service: Service,
    pub base_url: Option<&'a Url>,
    pub audience: Option<&'a str>,
}

impl<'a> Upstream<'a> {
    pub fn new(service: Service, base_url: Option<&'a Url>, audience: Option<&'a str>) -> Self {
        Upstream {
            service,
            base_url,
            audience: audience.filter(|a| !a.is_empty()),
        }
    }

    pub fn require_base_url(&self) -> Result<&'a Url, ProxyError> {
        self.base_url.ok_or_else(|| {
            let setting = self.service.base_url_setting();
            tracing::error!(setting, "Base URL is not configured");
            ProxyError::Configuration(setting)
        })
    }
}

/// Hands out HTTP clients for upstream services.
///
/// All clients share one connection pool and one request deadline. A client
/// for an upstream with an identity audience carries a bearer token fetched
/// when the client is acquired.
pub struct ClientFactory {
    http: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
}

impl ClientFactory {
    pub fn new(timeout: Duration, tokens: Arc<dyn TokenProvider>) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(ClientFactory { http, tokens })
    }

    /// Acquire a client for `upstream`. The client borrows the factory and is
    /// released when it goes out of scope.
    pub async fn acquire(&self, upstream: Upstream<'_>) -> Result<ApiClient<'_>, ProxyError> {
        let base_url = upstream.require_base_url()?;

        let bearer = match upstream.audience {
            Some(audience) => {
                tracing::debug!(service = %upstream.service, "Using identity-secured API client");
                let token = self.tokens.fetch_token(audience).await.map_err(|source| {
                    tracing::error!(audience, error = %source, "Failed to fetch identity token");
                    ProxyError::TokenAcquisition {
                        audience: audience.to_string(),
                        source,
                    }
                })?;
                Some(token)
            }
            None => {
                tracing::debug!(service = %upstream.service, "No identity audience set, using local API client");
                None
            }
        };

        Ok(ApiClient {
            http: &self.http,
            service: upstream.service,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            bearer,
        })
    }
}

/// A client bound to one upstream base URL.
pub struct ApiClient<'a> {
    http: &'a reqwest::Client,
    service: Service,
    base_url: String,
    bearer: Option<String>,
}

impl ApiClient<'_> {
    pub fn service(&self) -> Service {
        self.service
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_authenticated(&self) -> bool {
        self.bearer.is_some()
    }

    pub async fn get<Q>(&self, endpoint: &str, query: &Q) -> Result<Response, reqwest::Error>
    where
        Q: Serialize + ?Sized,
    {
        self.send(self.request(Method::GET, endpoint).query(query))
            .await
    }

    pub async fn post_json<Q, B>(
        &self,
        endpoint: &str,
        query: &Q,
        body: &B,
    ) -> Result<Response, reqwest::Error>
    where
        Q: Serialize + ?Sized,
        B: Serialize + ?Sized,
    {
        self.send(self.request(Method::POST, endpoint).query(query).json(body))
            .await
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, reqwest::Error> {
        let started = Instant::now();
        let result = request.send().await;

        let service = self.service.as_str();
        histogram!(UPSTREAM_DURATION, "service" => service).record(started.elapsed().as_secs_f64());
        let outcome = match &result {
            Ok(response) if response.status().is_success() => "success",
            Ok(_) => "error_status",
            Err(_) => "connection_error",
        };
        counter!(UPSTREAM_REQUESTS, "service" => service, "outcome" => outcome).increment(1);

        result
    }

    /// Base URL and endpoint are always joined with exactly one `/`, whether or
    /// not the configured endpoint starts with one.
    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.url(endpoint));
        match &self.bearer {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{MockUpstream, StaticTokenProvider};
    use http::StatusCode;
    use serde_json::json;

    fn factory(token: Option<&str>) -> ClientFactory {
        ClientFactory::new(
            Duration::from_secs(2),
            Arc::new(StaticTokenProvider::new(token)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_missing_base_url() {
        let factory = factory(None);
        let err = factory
            .acquire(Upstream::new(Service::Converter, None, Some("aud")))
            .await
            .err()
            .unwrap();
        assert_eq!(
            err.to_string(),
            "CONVERTER_SERVICE_API_BASE_URL configuration is missing."
        );
    }

    #[tokio::test]
    async fn test_local_client_has_no_authorization() {
        let server = MockUpstream::spawn("/things", StatusCode::OK, json!({"ok": true})).await;
        let factory = factory(Some("unused"));

        let client = factory
            .acquire(Upstream::new(Service::Cir, Some(&server.url), Some("")))
            .await
            .unwrap();
        assert!(!client.is_authenticated());
        assert!(!client.base_url().ends_with('/'));

        let response = client.get("/things", &[("guid", "abc")]).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let requests = server.requests();
        assert_eq!(requests[0].query["guid"], "abc");
        assert!(!requests[0].headers.contains_key("authorization"));
    }

    #[tokio::test]
    async fn test_secured_client_sends_bearer_token() {
        let server = MockUpstream::spawn("/things", StatusCode::OK, json!({})).await;
        let factory = factory(Some("fake-token"));

        let client = factory
            .acquire(Upstream::new(Service::Cir, Some(&server.url), Some("aud")))
            .await
            .unwrap();
        assert!(client.is_authenticated());

        client
            .post_json("/things", &[("a", "1")], &json!({"x": 1}))
            .await
            .unwrap();

        let requests = server.requests();
        assert_eq!(
            requests[0].headers.get("authorization").map(String::as_str),
            Some("Bearer fake-token")
        );
        assert_eq!(requests[0].body, Some(json!({"x": 1})));
    }

    #[tokio::test]
    async fn test_endpoint_without_leading_slash() {
        let server = MockUpstream::spawn("/v2/things", StatusCode::OK, json!({})).await;
        let factory = factory(None);

        let client = factory
            .acquire(Upstream::new(Service::Cir, Some(&server.url), None))
            .await
            .unwrap();
        let response = client.get("v2/things", &[("guid", "abc")]).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(server.hits(), 1);
    }

    #[tokio::test]
    async fn test_url_joining() {
        let factory = factory(None);
        for (base, endpoint, expected) in [
            ("http://cir:5004", "/v2/retrieve", "http://cir:5004/v2/retrieve"),
            ("http://cir:5004", "v2/retrieve", "http://cir:5004/v2/retrieve"),
            ("http://cir:5004/", "/v2/retrieve", "http://cir:5004/v2/retrieve"),
            ("http://cir:5004/api", "v2/retrieve", "http://cir:5004/api/v2/retrieve"),
            ("http://cir:5004/api/", "/v2/retrieve", "http://cir:5004/api/v2/retrieve"),
        ] {
            let base = Url::parse(base).unwrap();
            let client = factory
                .acquire(Upstream::new(Service::Cir, Some(&base), None))
                .await
                .unwrap();
            assert_eq!(client.url(endpoint), expected);
        }
    }

    #[tokio::test]
    async fn test_token_failure() {
        let url = Url::parse("http://127.0.0.1:1").unwrap();
        let factory = factory(None);
        let err = factory
            .acquire(Upstream::new(Service::Cir, Some(&url), Some("aud")))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ProxyError::TokenAcquisition { ref audience, .. } if audience == "aud"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_service_names() {
        assert_eq!(Service::Cir.to_string(), "CIR service");
        assert_eq!(Service::Converter.to_string(), "Converter Service");
        assert_eq!(Service::Cir.base_url_setting(), "CIR_API_BASE_URL");
    }
}
