//! Authenticated request pipeline.
//!
//! Every call to the backend goes through [`AuthenticatedClient::request`],
//! which attaches the current bearer token and turns a 401 into session
//! teardown plus [`ApiError::SessionExpired`]. All other statuses are
//! returned untouched for the caller to interpret.

use std::sync::Arc;

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode, Url};
use serde::Serialize;
use tracing::{debug, info};

use super::error::ApiError;
use super::transport::{ApiResponse, HttpRequest, Transport};
use crate::auth::SessionStore;

/// Method, extra headers, query parameters and JSON body for one request.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: None,
        }
    }
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post() -> Self {
        Self::default().method(Method::POST)
    }

    pub fn put() -> Self {
        Self::default().method(Method::PUT)
    }

    pub fn delete() -> Self {
        Self::default().method(Method::DELETE)
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn header(mut self, name: header::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Append a query parameter; values are percent-encoded when sent
    pub fn query(mut self, name: &str, value: impl ToString) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    pub fn json<B: Serialize>(mut self, body: &B) -> Result<Self, ApiError> {
        self.body = Some(serde_json::to_value(body).map_err(ApiError::InvalidBody)?);
        Ok(self)
    }
}

/// Sends requests on behalf of whoever holds the session in `store`.
#[derive(Clone)]
pub struct AuthenticatedClient<T> {
    transport: T,
    store: Arc<SessionStore>,
    base_url: Url,
}

impl<T: Transport> AuthenticatedClient<T> {
    pub fn new(transport: T, store: Arc<SessionStore>, base_url: &str) -> Result<Self, ApiError> {
        Ok(Self {
            transport,
            store,
            base_url: parse_base_url(base_url)?,
        })
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// `base_url` joined with `path`; a leading `/` on `path` is ignored so
    /// that the base's own path prefix is kept.
    pub fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        join_url(&self.base_url, path)
    }

    pub async fn request(&self, path: &str, options: RequestOptions) -> Result<ApiResponse, ApiError> {
        let token = self.store.current_token().ok_or(ApiError::NoSession)?;

        let mut url = self.endpoint(path)?;
        if !options.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &options.query {
                pairs.append_pair(name, value);
            }
        }

        let mut headers = options.headers;
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token))?,
        );
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let body = match options.body {
            Some(value) => Some(serde_json::to_vec(&value).map_err(ApiError::InvalidBody)?),
            None => None,
        };

        let method = options.method;
        debug!(method = %method, path = path, "Sending authenticated request");

        let response = self
            .transport
            .send(HttpRequest {
                method: method.clone(),
                url,
                headers,
                body,
            })
            .await?;

        debug!(method = %method, path = path, status = response.status().as_u16(), "Response received");

        if response.status() == StatusCode::UNAUTHORIZED {
            info!(path = path, "Server rejected token, clearing session");
            self.store.clear_session();
            return Err(ApiError::SessionExpired);
        }

        Ok(response)
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.request(path, RequestOptions::get()).await
    }

    pub async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<ApiResponse, ApiError> {
        self.request(path, RequestOptions::post().json(body)?).await
    }
}

pub(crate) fn parse_base_url(base_url: &str) -> Result<Url, ApiError> {
    let mut base = base_url.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    Url::parse(&base).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", base_url, e)))
}

/// Resolves `path` under `base`, refusing anything that would land outside
/// the base origin or its path prefix.
pub(crate) fn join_url(base: &Url, path: &str) -> Result<Url, ApiError> {
    let invalid = |reason: &str| ApiError::InvalidUrl(format!("{}: {}", path, reason));

    if Url::parse(path).is_ok() || path.starts_with("//") || path.starts_with('\\') {
        return Err(invalid("absolute URLs are not accepted"));
    }
    let relative = path.trim_start_matches('/');
    let path_part = relative.split(['?', '#']).next().unwrap_or_default();
    if path_part.split(['/', '\\']).any(is_dot_segment) {
        return Err(invalid("dot segments are not accepted"));
    }

    let url = base
        .join(relative)
        .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", path, e)))?;
    if url.origin() != base.origin() || !url.path().starts_with(base.path()) {
        return Err(invalid("outside of the API base URL"));
    }
    Ok(url)
}

fn is_dot_segment(segment: &str) -> bool {
    let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
    decoded == "." || decoded == ".."
}
