// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! HTTP transport with authentication, redirects and `ETag` handling.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, LOCATION};
use reqwest::{Client, Method, StatusCode, Url, redirect};

use crate::config::{AuthMethod, CardDavConfig, Depth};
use crate::error::CardDavError;
use crate::types::ETag;

/// A request to a WebDAV server.
#[derive(Debug, Clone)]
pub struct DavRequest {
    /// HTTP method, including WebDAV extension methods.
    pub method: Method,
    /// Absolute target URL.
    pub url: Url,
    /// Extra request headers.
    pub headers: Vec<(&'static str, String)>,
    /// Request body.
    pub body: Option<String>,
}

impl DavRequest {
    /// Creates a request without headers or body.
    #[must_use]
    pub const fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// Adds the `Depth` header.
    #[must_use]
    pub fn depth(self, depth: Depth) -> Self {
        self.header("Depth", depth.as_str())
    }

    /// Sets the body.
    #[must_use]
    pub fn body(mut self, body: String) -> Self {
        self.body = Some(body);
        self
    }

    /// Sets an XML body with its content type.
    #[must_use]
    pub fn xml_body(self, body: String) -> Self {
        self.header("Content-Type", "application/xml; charset=utf-8")
            .body(body)
    }

    /// Returns the value of the first header named `name`, ignoring case.
    #[must_use]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A response from a WebDAV server.
#[derive(Debug, Clone)]
pub struct DavResponse {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: String,
    /// URL that produced this response, after redirects.
    pub url: Url,
}

impl DavResponse {
    /// Returns a header value as string.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Extracts `ETag` from response headers.
    #[must_use]
    pub fn etag(&self) -> Option<ETag> {
        self.header("ETag").map(ETag::from)
    }
}

/// Sends requests to the server.
///
/// The transport is responsible for authentication and for following
/// redirects. It must not interpret status codes: every response the server
/// produces is returned as `Ok`.
#[async_trait]
pub trait Transport: fmt::Debug + Send + Sync {
    /// Sends one request and returns the final response.
    ///
    /// # Errors
    ///
    /// Returns an error on connection failures, timeouts or too many
    /// redirects.
    async fn send(&self, request: DavRequest) -> Result<DavResponse, CardDavError>;
}

/// Builds a WebDAV extension method such as `PROPFIND`.
///
/// # Errors
///
/// Returns an error if the name is not a valid method token.
pub fn dav_method(name: &str) -> Result<Method, CardDavError> {
    Method::from_bytes(name.as_bytes())
        .map_err(|e| CardDavError::Config(format!("Invalid method {name}: {e}")))
}

/// [`Transport`] backed by `reqwest`.
#[derive(Debug)]
pub struct HttpTransport {
    client: Client,
    auth: AuthMethod,
    max_redirects: usize,
}

impl HttpTransport {
    /// Creates a new HTTP transport.
    ///
    /// # Errors
    ///
    /// Returns an error if HTTP client creation fails.
    pub fn new(config: &CardDavConfig) -> Result<Self, CardDavError> {
        // Redirects are followed here rather than by reqwest, which turns
        // PROPFIND into GET on 301/302.
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(&config.user_agent)
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            auth: config.auth.clone(),
            max_redirects: config.max_redirects,
        })
    }

    fn build_request(&self, request: &DavRequest, url: Url) -> reqwest::RequestBuilder {
        let mut req = self.client.request(request.method.clone(), url);

        match &self.auth {
            AuthMethod::Basic { username, password } => {
                req = req.basic_auth(username, Some(password));
            }
            AuthMethod::Bearer { token } => {
                req = req.bearer_auth(token);
            }
            AuthMethod::None => {}
        }

        for (name, value) in &request.headers {
            req = req.header(*name, value.as_str());
        }
        if let Some(body) = &request.body {
            req = req.body(body.clone());
        }
        req
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: DavRequest) -> Result<DavResponse, CardDavError> {
        let mut url = request.url.clone();

        for _ in 0..=self.max_redirects {
            let resp = self.build_request(&request, url.clone()).send().await?;
            let status = resp.status();

            let location = resp.headers().get(LOCATION).and_then(|v| v.to_str().ok());
            if let (true, Some(location)) = (is_followed_redirect(status), location) {
                let next = url.join(location).map_err(|e| {
                    CardDavError::Protocol(format!("Invalid redirect target {location}: {e}"))
                })?;
                tracing::debug!(from = %url, to = %next, %status, "following redirect");
                url = next;
                continue;
            }

            let headers = resp.headers().clone();
            let body = resp.text().await?;
            tracing::debug!(method = %request.method, %url, %status, "request completed");
            return Ok(DavResponse {
                status,
                headers,
                body,
                url,
            });
        }

        tracing::warn!(method = %request.method, url = %request.url, "redirect limit exceeded");
        Err(CardDavError::TooManyRedirects(self.max_redirects))
    }
}

fn is_followed_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}
