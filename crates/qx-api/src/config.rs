//! Client configuration.
//!
//! Everything is supplied at construction time. The library reads no
//! environment variables or files; callers can deserialize [`ClientConfig`]
//! from whatever format they keep their settings in.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::credentials::LoginMethod;
use crate::error::{QxError, QxResult};

/// Default Quantum Experience API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://quantumexperience.ng.bluemix.net/api";

/// Complete client configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// API base URL (without trailing slash).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Verify TLS certificates.
    #[serde(default = "default_true")]
    pub verify_tls: bool,

    /// Tag appended to the `x-qx-client-application` header.
    #[serde(default)]
    pub client_application: Option<String>,

    /// Attempts per request before giving up.
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Fixed pause between attempts, in milliseconds.
    #[serde(default = "default_backoff_interval_ms")]
    pub backoff_interval_ms: u64,

    /// Pause between result polls, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Poll attempts for experiments when the caller gives no timeout.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout: u32,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// Long-lived API token exchanged for a session token at login.
    #[serde(default)]
    pub api_token: Option<String>,

    /// Account email for password login.
    #[serde(default)]
    pub email: Option<String>,

    /// Account password for password login.
    #[serde(default)]
    pub password: Option<String>,

    /// Session token obtained elsewhere; skips the login handshake.
    #[serde(default)]
    pub access_token: Option<String>,

    /// User id to pair with an injected access token.
    #[serde(default)]
    pub user_id: Option<String>,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("verify_tls", &self.verify_tls)
            .field("client_application", &self.client_application)
            .field("retries", &self.retries)
            .field("backoff_interval_ms", &self.backoff_interval_ms)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("poll_timeout", &self.poll_timeout)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("connect_timeout_seconds", &self.connect_timeout_seconds)
            .field("api_token", &redact(&self.api_token))
            .field("email", &self.email)
            .field("password", &redact(&self.password))
            .field("access_token", &redact(&self.access_token))
            .field("user_id", &self.user_id)
            .finish()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            verify_tls: true,
            client_application: None,
            retries: default_retries(),
            backoff_interval_ms: default_backoff_interval_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_timeout: default_poll_timeout(),
            request_timeout_seconds: default_request_timeout(),
            connect_timeout_seconds: default_connect_timeout(),
            api_token: None,
            email: None,
            password: None,
            access_token: None,
            user_id: None,
        }
    }
}

impl ClientConfig {
    /// Configuration that logs in with a long-lived API token.
    pub fn with_api_token(token: impl Into<String>) -> Self {
        Self {
            api_token: Some(token.into()),
            ..Self::default()
        }
    }

    /// Configuration that logs in with email and password.
    pub fn with_email_password(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            password: Some(password.into()),
            ..Self::default()
        }
    }

    /// Configuration that uses an already-issued session token.
    pub fn with_access_token(token: impl Into<String>, user_id: Option<String>) -> Self {
        Self {
            access_token: Some(token.into()),
            user_id,
            ..Self::default()
        }
    }

    /// Set the API base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Enable or disable TLS certificate verification.
    pub fn verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    /// Set the client-application tag.
    pub fn client_application(mut self, tag: impl Into<String>) -> Self {
        self.client_application = Some(tag.into());
        self
    }

    /// Set the attempt budget per request.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the pause between attempts.
    pub fn backoff_interval(mut self, interval: Duration) -> Self {
        self.backoff_interval_ms = duration_ms(interval);
        self
    }

    /// Set the pause between result polls.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = duration_ms(interval);
        self
    }

    /// Set the default number of poll attempts.
    pub fn poll_timeout(mut self, attempts: u32) -> Self {
        self.poll_timeout = attempts;
        self
    }

    /// Build the retry policy described by this configuration.
    pub fn retry_policy(&self) -> QxResult<RetryPolicy> {
        RetryPolicy::new(
            self.retries,
            Duration::from_millis(self.backoff_interval_ms),
        )
    }

    /// Pause between result polls.
    pub fn poll_interval_duration(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Login handshake available to this configuration, if any.
    ///
    /// An API token wins over email and password.
    pub fn login_method(&self) -> Option<LoginMethod> {
        if let Some(token) = &self.api_token {
            return Some(LoginMethod::ApiToken(token.clone()));
        }
        match (&self.email, &self.password) {
            (Some(email), Some(password)) => Some(LoginMethod::EmailPassword {
                email: email.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }

    /// Full value of the `x-qx-client-application` header.
    pub fn client_application_header(&self) -> String {
        match &self.client_application {
            Some(tag) => format!("{CLIENT_APPLICATION}:{tag}"),
            None => CLIENT_APPLICATION.to_string(),
        }
    }
}

/// Identifier sent in the `x-qx-client-application` header.
pub const CLIENT_APPLICATION: &str = "qx-api-rs";

/// Bounded retry budget with a fixed pause between attempts.
///
/// Immutable once built; a transport client keeps the same policy for its
/// whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff_interval: Duration,
}

impl RetryPolicy {
    /// Create a policy. `max_attempts` must be positive.
    pub fn new(max_attempts: u32, backoff_interval: Duration) -> QxResult<Self> {
        if max_attempts == 0 {
            return Err(QxError::InvalidParameter(
                "retries must be a positive integer".into(),
            ));
        }
        Ok(Self {
            max_attempts,
            backoff_interval,
        })
    }

    /// Attempts allowed per request.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Pause between attempts.
    pub fn backoff_interval(&self) -> Duration {
        self.backoff_interval
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_retries(),
            backoff_interval: Duration::from_millis(default_backoff_interval_ms()),
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_true() -> bool {
    true
}

fn default_retries() -> u32 {
    5
}

fn default_backoff_interval_ms() -> u64 {
    1_000
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_poll_timeout() -> u32 {
    60
}

fn default_request_timeout() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    10
}
