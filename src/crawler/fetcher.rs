//! Fetcher capability and the default HTTP implementation
//!
//! The engine consumes fetchers through the [`Fetcher`] trait; transport
//! details (sessions, cookies, socket retries) belong to the
//! implementation. The retry *budget* lives on the [`Source`] and is
//! spent by the fetch pool, not here.

use crate::model::{Method, Source};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

/// A fetched document handed to the parse stage
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    /// Final URL after redirects
    pub url: String,

    /// HTTP status code
    pub status: u16,

    /// Content-Type header value
    pub content_type: String,

    /// Response body
    pub body: String,
}

/// Fetch failures, classified for retry decisions
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("Invalid request for {url}: {message}")]
    Request { url: String, message: String },
}

impl FetchError {
    /// Transient failures count against the source's retry budget;
    /// permanent ones (4xx, malformed requests) drop immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Timeout { .. } | FetchError::Network { .. } => true,
            FetchError::Request { .. } => false,
        }
    }
}

/// The fetch capability consumed by the fetch pool
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches one source, honoring its method, headers, query params
    /// and body.
    async fn fetch(&self, source: &Source) -> Result<FetchedDocument, FetchError>;
}

/// Default fetcher built on reqwest
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Builds an HTTP client with the standard engine configuration.
    pub fn new(user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .gzip(true)
            .brotli(true)
            .build()?;
        Ok(Self { client })
    }

    /// Wraps an externally configured client (custom TLS, proxies, ...).
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, source: &Source) -> Result<FetchedDocument, FetchError> {
        let method = match source.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };

        let mut request = self.client.request(method, &source.url);
        for (name, value) in &source.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if !source.params.is_empty() {
            request = request.query(&source.params);
        }
        if source.method == Method::Post && !source.body.is_empty() {
            request = request.form(&source.body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| classify(e, &source.url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: source.url.clone(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = response
            .text()
            .await
            .map_err(|e| classify(e, &source.url))?;

        Ok(FetchedDocument {
            url: final_url,
            status: status.as_u16(),
            content_type,
            body,
        })
    }
}

fn classify(error: reqwest::Error, url: &str) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else if error.is_builder() {
        FetchError::Request {
            url: url.to_string(),
            message: error.to_string(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        let url = "https://e.com".to_string();

        assert!(FetchError::Status {
            url: url.clone(),
            status: 500
        }
        .is_retryable());
        assert!(FetchError::Status {
            url: url.clone(),
            status: 429
        }
        .is_retryable());
        assert!(FetchError::Timeout { url: url.clone() }.is_retryable());

        assert!(!FetchError::Status {
            url: url.clone(),
            status: 404
        }
        .is_retryable());
        assert!(!FetchError::Request {
            url,
            message: "bad header".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_build_http_fetcher() {
        assert!(HttpFetcher::new("loomcrawl/1.0").is_ok());
    }

    #[tokio::test]
    async fn test_fetch_honors_method_and_params() {
        use wiremock::matchers::{body_string_contains, method, path, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/submit"))
            .and(query_param("page", "2"))
            .and(body_string_contains("q=widget"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let mut source = Source::new(format!("{}/submit", server.uri()));
        source.method = Method::Post;
        source.params.insert("page".into(), "2".into());
        source.body.insert("q".into(), "widget".into());

        let fetcher = HttpFetcher::new("loomcrawl-test/1.0").unwrap();
        let doc = fetcher.fetch(&source).await.unwrap();
        assert_eq!(doc.status, 200);
        assert_eq!(doc.body, "ok");
    }

    #[tokio::test]
    async fn test_fetch_maps_status_errors() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new("loomcrawl-test/1.0").unwrap();
        let source = Source::new(format!("{}/gone", server.uri()));
        match fetcher.fetch(&source).await {
            Err(FetchError::Status { status, .. }) => assert_eq!(status, 404),
            other => panic!("expected status error, got {:?}", other.map(|d| d.status)),
        }
    }
}
