//! Wire-level HTTP seam.
//!
//! [`HttpTransport`] sends one fully-built request and hands back the raw
//! status and body. Retry, token refresh and response validation all live
//! above it in [`crate::transport`], so any implementation only has to move
//! bytes.

use std::fmt;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header;
use tracing::warn;

use crate::config::ClientConfig;
use crate::error::{QxError, QxResult};

/// Header carrying the client-application identifier.
pub const CLIENT_APPLICATION_HEADER: &str = "x-qx-client-application";

/// HTTP methods used by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
        })
    }
}

/// Request payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    /// Sent as `application/json`.
    Json(serde_json::Value),
    /// Sent as `application/x-www-form-urlencoded`.
    Form(Vec<(String, String)>),
}

/// A fully-built request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Absolute URL including the query string.
    pub url: String,
    /// Value of the client-application header.
    pub client_application: String,
    pub body: Body,
}

/// Raw response as received.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    /// Build a response from parts.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the server rejected the session token.
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }
}

/// Something that can send a single HTTP request.
///
/// Implementations report failures to obtain any response as
/// [`QxError::Connection`] or [`QxError::Http`]; non-2xx statuses are not
/// errors at this level.
pub trait HttpTransport: Send {
    fn send(&self, request: &HttpRequest) -> QxResult<HttpResponse>;
}

/// [`HttpTransport`] backed by a blocking `reqwest` client.
pub struct ReqwestTransport {
    client: Client,
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport").finish_non_exhaustive()
    }
}

impl ReqwestTransport {
    /// Build a transport honoring the timeouts and TLS setting of `config`.
    pub fn new(config: &ClientConfig) -> QxResult<Self> {
        if !config.verify_tls {
            warn!("ignoring TLS certificate errors; this is not recommended");
        }

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(!config.verify_tls)
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .build()?;

        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: &HttpRequest) -> QxResult<HttpResponse> {
        let builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
            Method::Put => self.client.put(&request.url),
        }
        .header(CLIENT_APPLICATION_HEADER, &request.client_application);

        let builder = match &request.body {
            Body::Empty => builder,
            Body::Json(value) => builder.json(value),
            Body::Form(fields) => builder.form(fields),
        };

        let response = builder.send()?;
        let status = response.status().as_u16();
        let body = response.text()?;
        Ok(HttpResponse { status, body })
    }
}

/// Mask the `access_token` query value so URLs can be logged.
pub(crate) fn redact_url(url: &str) -> String {
    let Some(start) = url.find("access_token=") else {
        return url.to_string();
    };
    let value_start = start + "access_token=".len();
    let value_end = url[value_start..]
        .find('&')
        .map_or(url.len(), |i| value_start + i);
    format!("{}[REDACTED]{}", &url[..value_start], &url[value_end..])
}
