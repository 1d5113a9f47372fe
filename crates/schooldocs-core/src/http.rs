//! JSON HTTP client for the portal API.
//!
//! Every request carries JSON `Content-Type`/`Accept` headers with caller
//! headers layered on top. Non-2xx responses become [`ApiError`]s; a 401 is
//! recovered once through a [`TokenRefresher`] when the session holds a
//! refresh token.

use std::future::Future;

use anyhow::{Context, Result};
pub use bytes::Bytes;
use percent_encoding::percent_decode_str;
use reqwest::Method;
use reqwest::header::{
    ACCEPT, AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue,
};
use serde_json::Value;

use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::session::SessionHandle;

/// Standard User-Agent header for schooldocs requests.
pub const USER_AGENT: &str = concat!("schooldocs/", env!("CARGO_PKG_VERSION"));

/// How many times a request is replayed after a successful token refresh.
pub const DEFAULT_AUTH_RETRIES: u8 = 1;

const JSON_MIME: &str = "application/json";

/// Mints a fresh access token when a request comes back 401.
pub trait TokenRefresher: Sync {
    /// Returns an access token newer than `rejected`, the one the portal
    /// just answered 401 to.
    fn refresh_access_token(
        &self,
        rejected: &str,
    ) -> impl Future<Output = ApiResult<String>> + Send;
}

/// Refresher that never succeeds; used for calls that must not retry.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRefresh;

impl TokenRefresher for NoRefresh {
    async fn refresh_access_token(&self, _rejected: &str) -> ApiResult<String> {
        Err(ApiError::not_authenticated("token refresh is not available"))
    }
}

/// One outbound call.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub path: String,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Option<Value>) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: Option<Value>) -> Self {
        Self::new(Method::PUT, path).with_body(body)
    }

    pub fn patch(path: impl Into<String>, body: Option<Value>) -> Self {
        Self::new(Method::PATCH, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    #[must_use]
    pub fn with_body(mut self, body: Option<Value>) -> Self {
        self.body = body;
        self
    }

    /// Sets a header, replacing any existing value (names compare case-insensitively).
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Attaches `Authorization: Bearer <token>`.
    #[must_use]
    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {token}"))
    }

    pub fn has_authorization(&self) -> bool {
        self.header_value("authorization").is_some()
    }

    /// Token carried in `Authorization: Bearer <token>`, if any.
    pub fn bearer_token(&self) -> Option<&str> {
        self.header_value("authorization")
            .and_then(|value| value.strip_prefix("Bearer "))
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn set_header(&mut self, name: String, value: String) {
        if let Some(slot) = self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&name))
        {
            slot.1 = value;
        } else {
            self.headers.push((name, value));
        }
    }
}

/// Binary payload from a document endpoint.
#[derive(Debug, Clone)]
pub struct Blob {
    pub bytes: Bytes,
    pub content_type: Option<String>,
    /// Suggested filename from `Content-Disposition`
    pub filename: Option<String>,
}

struct RawResponse {
    status: u16,
    content_type: Option<String>,
    disposition: Option<String>,
    body: Bytes,
}

impl RawResponse {
    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as JSON; anything unparseable (including empty) is `None`.
    fn json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

/// HTTP client bound to one portal and one session.
#[derive(Clone)]
pub struct HttpClient {
    base_url: String,
    http: reqwest::Client,
    session: SessionHandle,
}

impl HttpClient {
    /// Builds a client from config (base URL, timeout).
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid or the client cannot be built.
    pub fn new(config: &Config, session: SessionHandle) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: config.effective_base_url()?,
            http,
            session,
        })
    }

    /// Client for an explicit base URL with default settings.
    pub fn with_base_url(base_url: impl Into<String>, session: SessionHandle) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            session,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Sends once, without any 401 recovery.
    ///
    /// # Errors
    /// Returns `Http` for non-2xx responses and `Network` when no response arrived.
    pub async fn send(&self, request: &RequestDescriptor) -> ApiResult<Option<Value>> {
        self.request_with_retries(request.clone(), &NoRefresh, 0)
            .await
    }

    /// Sends with the default 401 recovery budget.
    ///
    /// # Errors
    /// Returns `Http` for non-2xx responses and `Network` when no response arrived.
    pub async fn request<R: TokenRefresher>(
        &self,
        request: RequestDescriptor,
        refresher: &R,
    ) -> ApiResult<Option<Value>> {
        self.request_with_retries(request, refresher, DEFAULT_AUTH_RETRIES)
            .await
    }

    /// Sends `request`, refreshing and replaying at most `auth_retries` times on 401.
    ///
    /// # Errors
    /// Returns `Http` for non-2xx responses and `Network` when no response arrived.
    pub async fn request_with_retries<R: TokenRefresher>(
        &self,
        request: RequestDescriptor,
        refresher: &R,
        auth_retries: u8,
    ) -> ApiResult<Option<Value>> {
        let response = self.dispatch(request, refresher, auth_retries).await?;
        Ok(response.json())
    }

    /// Like [`Self::request`] but returns the raw body of a binary endpoint.
    ///
    /// # Errors
    /// Returns `Http` for non-2xx responses and `Network` when no response arrived.
    pub async fn request_blob<R: TokenRefresher>(
        &self,
        request: RequestDescriptor,
        refresher: &R,
    ) -> ApiResult<Blob> {
        let response = self
            .dispatch(request, refresher, DEFAULT_AUTH_RETRIES)
            .await?;
        Ok(Blob {
            filename: response
                .disposition
                .as_deref()
                .and_then(parse_disposition_filename),
            content_type: response.content_type,
            bytes: response.body,
        })
    }

    async fn dispatch<R: TokenRefresher>(
        &self,
        mut request: RequestDescriptor,
        refresher: &R,
        mut auth_retries: u8,
    ) -> ApiResult<RawResponse> {
        loop {
            let sent_with = request
                .bearer_token()
                .map_or_else(|| self.session.access_token(), str::to_string);
            let response = self.execute(&request).await?;
            if response.is_success() {
                return Ok(response);
            }

            let error = ApiError::http(response.status, response.json());
            if !error.is_unauthorized()
                || auth_retries == 0
                || !self.session.snapshot().has_refresh_token()
            {
                return Err(error);
            }
            auth_retries -= 1;

            tracing::debug!(path = %request.path, "401 received, refreshing access token");
            match refresher.refresh_access_token(&sent_with).await {
                Ok(access) => {
                    if request.has_authorization() {
                        request.set_header("Authorization".into(), format!("Bearer {access}"));
                    }
                }
                Err(refresh_error) => {
                    tracing::debug!("token refresh failed: {refresh_error}");
                    return Err(error);
                }
            }
        }
    }

    async fn execute(&self, request: &RequestDescriptor) -> ApiResult<RawResponse> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self
            .http
            .request(request.method.clone(), &url)
            .headers(request_headers(request));
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.to_string());
        }

        let response = builder.send().await.map_err(|err| {
            tracing::warn!(method = %request.method, path = %request.path, "request failed: {err}");
            ApiError::network()
        })?;

        let status = response.status().as_u16();
        let header = |name: reqwest::header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let content_type = header(CONTENT_TYPE);
        let disposition = header(CONTENT_DISPOSITION);

        let body = response.bytes().await.map_err(|err| {
            tracing::warn!(path = %request.path, "failed to read response body: {err}");
            ApiError::network()
        })?;

        tracing::debug!(method = %request.method, path = %request.path, status, "response");
        Ok(RawResponse {
            status,
            content_type,
            disposition,
            body,
        })
    }
}

/// JSON defaults with the caller's headers replacing them by name.
fn request_headers(request: &RequestDescriptor) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_MIME));
    headers.insert(ACCEPT, HeaderValue::from_static(JSON_MIME));
    for (name, value) in &request.headers {
        let parsed = HeaderName::from_bytes(name.as_bytes())
            .ok()
            .zip(HeaderValue::from_str(value).ok());
        match parsed {
            Some((name, mut value)) => {
                if name == AUTHORIZATION {
                    value.set_sensitive(true);
                }
                headers.insert(name, value);
            }
            None => tracing::warn!(header = %name, "skipping invalid request header"),
        }
    }
    headers
}

/// Extracts the filename from a `Content-Disposition` header value.
///
/// Prefers the RFC 5987 `filename*` form over plain `filename`.
pub fn parse_disposition_filename(value: &str) -> Option<String> {
    let mut plain = None;
    for part in value.split(';').map(str::trim) {
        let Some((key, raw)) = part.split_once('=') else {
            continue;
        };
        let raw = raw.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let encoded = raw.split_once("''").map_or(raw, |(_, rest)| rest);
                let decoded = percent_decode_str(encoded)
                    .decode_utf8()
                    .ok()
                    .map(std::borrow::Cow::into_owned)
                    .filter(|v| !v.is_empty());
                if decoded.is_some() {
                    return decoded;
                }
            }
            "filename" => {
                let name = raw.trim_matches('"');
                if !name.is_empty() {
                    plain = Some(name.to_string());
                }
            }
            _ => {}
        }
    }
    plain
}
