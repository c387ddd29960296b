//! Resilient request layer.
//!
//! Every call goes through the same loop:
//!
//! 1. build the URL with the current session token as `access_token`
//! 2. send it; on 401 renew the token once and resend (free of charge)
//! 3. classify the response as success, retryable or fatal
//! 4. on retryable, sleep the backoff interval and start over
//!
//! When the attempt budget runs out the call fails with
//! [`QxError::Transport`].

use std::thread;

use reqwest::Url;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::RetryPolicy;
use crate::credentials::CredentialStore;
use crate::error::{QxError, QxResult};
use crate::http::{Body, HttpRequest, HttpResponse, HttpTransport, Method, redact_url};

const REGISTER_SIZE_MARKER: &str =
    "registers exceed the number of qubits, it can't be greater than ";

/// Outcome of a single attempt that did not fail fatally.
#[derive(Debug)]
enum Attempt {
    Success(Value),
    Retry(String),
}

/// Issues authenticated requests with retry, token renewal and validation.
pub struct TransportClient {
    http: Box<dyn HttpTransport>,
    credentials: CredentialStore,
    policy: RetryPolicy,
}

impl std::fmt::Debug for TransportClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportClient")
            .field("credentials", &self.credentials)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl TransportClient {
    /// Create a client over `http`, taking ownership of the credentials.
    pub fn new(
        http: Box<dyn HttpTransport>,
        credentials: CredentialStore,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            http,
            credentials,
            policy,
        }
    }

    /// The credential store.
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Mutable access for explicit token/user-id overrides.
    pub fn credentials_mut(&mut self) -> &mut CredentialStore {
        &mut self.credentials
    }

    /// Run the login handshake through this client's transport.
    pub fn login(&mut self) -> QxResult<()> {
        self.credentials.acquire(self.http.as_ref())
    }

    /// The retry policy.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Authenticated GET.
    pub fn get(&mut self, path: &str, params: &[(&str, String)]) -> QxResult<Value> {
        self.request(Method::Get, path, params, Body::Empty, true)
    }

    /// GET without the session token, for public endpoints.
    pub fn get_public(&mut self, path: &str, params: &[(&str, String)]) -> QxResult<Value> {
        self.request(Method::Get, path, params, Body::Empty, false)
    }

    /// Authenticated POST with a JSON body.
    pub fn post(&mut self, path: &str, params: &[(&str, String)], body: Value) -> QxResult<Value> {
        self.request(Method::Post, path, params, Body::Json(body), true)
    }

    /// Authenticated PUT with a JSON body.
    pub fn put(&mut self, path: &str, params: &[(&str, String)], body: Value) -> QxResult<Value> {
        self.request(Method::Put, path, params, Body::Json(body), true)
    }

    /// Issue a request and return the validated JSON body.
    ///
    /// `with_token` is only honored for GET; POST and PUT always carry the
    /// token. Any call carrying the token fails with
    /// [`QxError::Authentication`] when none is present.
    pub fn request(
        &mut self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: Body,
        with_token: bool,
    ) -> QxResult<Value> {
        let with_token = with_token || method != Method::Get;
        if with_token {
            self.credentials.require_token()?;
        }

        let max_attempts = self.policy.max_attempts();
        let mut last_failure = String::new();

        for attempt in 1..=max_attempts {
            match self.attempt(method, path, params, &body, with_token)? {
                Attempt::Success(value) => return Ok(value),
                Attempt::Retry(reason) => {
                    warn!(
                        attempt,
                        max_attempts,
                        "{method} {path} failed: {reason}"
                    );
                    last_failure = reason;
                }
            }
            if attempt < max_attempts {
                thread::sleep(self.policy.backoff_interval());
            }
        }

        Err(QxError::Transport {
            attempts: max_attempts,
            last_failure,
        })
    }

    /// One attempt, including the free 401 renewal.
    fn attempt(
        &mut self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: &Body,
        with_token: bool,
    ) -> QxResult<Attempt> {
        let request = self.build_request(method, path, params, body, with_token)?;
        let mut response = match self.send(&request)? {
            Some(response) => response,
            None => return Ok(Attempt::Retry("no response from server".into())),
        };

        if response.is_unauthorized() {
            debug!("session token rejected, renewing");
            match self.credentials.acquire(self.http.as_ref()) {
                Ok(()) => {}
                Err(e) if e.is_transient() => {
                    return Ok(Attempt::Retry(format!("token renewal failed: {e}")));
                }
                Err(e) => return Err(e),
            }
            let request = self.build_request(method, path, params, body, with_token)?;
            response = match self.send(&request)? {
                Some(response) => response,
                None => return Ok(Attempt::Retry("no response from server".into())),
            };
        }

        classify(&request.url, &response)
    }

    /// Send, folding transient connection failures into `None`.
    fn send(&self, request: &HttpRequest) -> QxResult<Option<HttpResponse>> {
        debug!("{} {}", request.method, redact_url(&request.url));
        match self.http.send(request) {
            Ok(response) => Ok(Some(response)),
            Err(e) if e.is_transient() => {
                warn!("{} {}: {e}", request.method, redact_url(&request.url));
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn build_request(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: &Body,
        with_token: bool,
    ) -> QxResult<HttpRequest> {
        let base = format!("{}{}", self.credentials.endpoint_url(), path);
        let mut url = Url::parse(&base)
            .map_err(|e| QxError::InvalidParameter(format!("invalid URL {base}: {e}")))?;

        {
            let mut query = url.query_pairs_mut();
            if with_token {
                if let Some(token) = self.credentials.current_token() {
                    query.append_pair("access_token", token);
                }
            }
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }

        Ok(HttpRequest {
            method,
            url: url.into(),
            client_application: self.credentials.client_application().to_string(),
            body: body.clone(),
        })
    }
}

/// Decide whether a response is usable, worth retrying, or fatal.
fn classify(url: &str, response: &HttpResponse) -> QxResult<Attempt> {
    if !response.is_success() {
        if let Some(max_qubits) = register_size_limit(&response.body) {
            return Err(QxError::RegisterSize { max_qubits });
        }
        return Ok(Attempt::Retry(format!(
            "got a {} code response to {}: {}",
            response.status,
            redact_url(url),
            response.body
        )));
    }

    let value: Value = serde_json::from_str(&response.body)
        .map_err(|_| QxError::Protocol(response.body.clone()))?;

    if !(value.is_object() || value.is_array()) {
        return Err(QxError::Protocol(format!(
            "JSON not a list or dict: url: {}, status: {}, text: {}",
            redact_url(url),
            response.status,
            response.body
        )));
    }

    if is_not_ready(&value) {
        return Ok(Attempt::Retry(format!(
            "got a 400 code JSON response to {}",
            redact_url(url)
        )));
    }

    Ok(Attempt::Success(value))
}

/// `{"error": {"status": 400, ...}}` means "try again shortly".
fn is_not_ready(value: &Value) -> bool {
    value
        .get("error")
        .and_then(|e| e.get("status"))
        .and_then(Value::as_u64)
        == Some(400)
}

/// Extract the device qubit limit from a register-size rejection.
fn register_size_limit(text: &str) -> Option<u32> {
    let start = text.find(REGISTER_SIZE_MARKER)? + REGISTER_SIZE_MARKER.len();
    let digits: String = text[start..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}
