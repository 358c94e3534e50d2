//! HTTP transport seam.
//!
//! The pipeline builds a fully-formed [`HttpRequest`] and hands it to a
//! [`Transport`]; production code uses [`ReqwestTransport`], tests plug in
//! fakes that record requests and script responses.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;

use super::error::{ApiError, TransportError};

/// HTTP request timeout in seconds.
/// 30s allows for slow backend responses while failing fast enough for good UX.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

/// A response exactly as the server sent it. Status is not interpreted.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// True for any 2xx status
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request. `Err` only when no response was received.
    async fn send(&self, request: HttpRequest) -> Result<ApiResponse, TransportError>;
}

/// Transport backed by reqwest.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<ApiResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();
        Ok(ApiResponse::new(status, headers, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, CONTENT_TYPE};

    #[tokio::test]
    async fn test_reqwest_transport_forwards_everything() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/items.php")
            .match_query(mockito::Matcher::UrlEncoded("id".into(), "7".into()))
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::JsonString(r#"{"nom":"mg/dL"}"#.into()))
            .with_status(202)
            .with_header("x-request-id", "abc")
            .with_body(r#"{"done":true}"#)
            .create_async()
            .await;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let request = HttpRequest {
            method: Method::PUT,
            url: Url::parse(&format!("{}/items.php?id=7", server.url())).unwrap(),
            headers,
            body: Some(br#"{"nom":"mg/dL"}"#.to_vec()),
        };

        let transport = ReqwestTransport::new().unwrap();
        let response = transport.send(request).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(response.ok());
        assert_eq!(response.headers()["x-request-id"], "abc");
        let body: serde_json::Value = response.json().unwrap();
        assert_eq!(body["done"], true);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let transport = ReqwestTransport::with_timeout(Duration::from_secs(2)).unwrap();
        let request = HttpRequest {
            method: Method::GET,
            // Port 9 (discard) on localhost is closed in test environments
            url: Url::parse("http://127.0.0.1:9/nothing.php").unwrap(),
            headers: HeaderMap::new(),
            body: None,
        };
        assert!(transport.send(request).await.is_err());
    }

    #[test]
    fn test_response_helpers() {
        let response = ApiResponse::new(StatusCode::NOT_FOUND, HeaderMap::new(), b"{\"error\":\"not found\"}".to_vec());
        assert!(!response.ok());
        assert_eq!(response.text(), "{\"error\":\"not found\"}");
        assert!(response.json::<Vec<u32>>().is_err());
    }
}
