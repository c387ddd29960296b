//! Session credentials and the login handshake.

use std::fmt;

use serde_json::Value;
use tracing::{debug, info};

use crate::error::{QxError, QxResult};
use crate::execution::string_field;
use crate::http::{Body, HttpRequest, HttpTransport, Method};

/// How a session token can be (re)acquired.
#[derive(Clone)]
pub enum LoginMethod {
    /// Exchange a long-lived API token (`POST /users/loginWithToken`).
    ApiToken(String),
    /// Log in with account email and password (`POST /users/login`).
    EmailPassword { email: String, password: String },
}

impl fmt::Debug for LoginMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiToken(_) => f.debug_tuple("ApiToken").field(&"[REDACTED]").finish(),
            Self::EmailPassword { email, .. } => f
                .debug_struct("EmailPassword")
                .field("email", email)
                .field("password", &"[REDACTED]")
                .finish(),
        }
    }
}

/// Session token, user id and the endpoint they belong to.
///
/// A credential without a token is unauthenticated.
#[derive(Clone, Default)]
pub struct Credential {
    pub token: Option<String>,
    pub user_id: Option<String>,
    pub endpoint_url: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("user_id", &self.user_id)
            .field("endpoint_url", &self.endpoint_url)
            .finish()
    }
}

/// Owns the credential and knows how to renew it.
#[derive(Debug)]
pub struct CredentialStore {
    credential: Credential,
    login: Option<LoginMethod>,
    client_application: String,
}

impl CredentialStore {
    /// Create an unauthenticated store. No I/O happens until [`acquire`].
    ///
    /// [`acquire`]: CredentialStore::acquire
    pub fn new(
        endpoint_url: impl Into<String>,
        login: Option<LoginMethod>,
        client_application: impl Into<String>,
    ) -> Self {
        Self {
            credential: Credential {
                token: None,
                user_id: None,
                endpoint_url: endpoint_url.into(),
            },
            login,
            client_application: client_application.into(),
        }
    }

    /// Perform the login handshake and store the returned token and user id.
    ///
    /// The credential is only replaced when a token comes back.
    pub fn acquire(&mut self, http: &dyn HttpTransport) -> QxResult<()> {
        let (path, fields) = match &self.login {
            Some(LoginMethod::ApiToken(token)) => (
                "/users/loginWithToken",
                vec![("apiToken".to_string(), token.clone())],
            ),
            Some(LoginMethod::EmailPassword { email, password }) => (
                "/users/login",
                vec![
                    ("email".to_string(), email.clone()),
                    ("password".to_string(), password.clone()),
                ],
            ),
            None => {
                return Err(QxError::Authentication(
                    "invalid token: no API token or email/password to log in with".into(),
                ));
            }
        };

        debug!("logging in via {path}");
        let request = HttpRequest {
            method: Method::Post,
            url: format!("{}{}", self.credential.endpoint_url, path),
            client_application: self.client_application.clone(),
            body: Body::Form(fields),
        };
        let response = http.send(&request)?;

        // Answer is `{id: <sessionToken>, userId: <id>}`; ids may be numeric.
        let login = serde_json::from_str::<Value>(&response.body)
            .ok()
            .and_then(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .ok_or_else(|| {
                QxError::Authentication(format!(
                    "invalid token: login returned HTTP {} without a session",
                    response.status
                ))
            })?;

        let token = string_field(&login, "id")
            .filter(|t| !t.is_empty())
            .ok_or_else(|| QxError::Authentication("invalid token".into()))?;

        self.credential.token = Some(token);
        self.credential.user_id = string_field(&login, "userId");
        info!("obtained session token");
        Ok(())
    }

    /// Current session token, if any.
    pub fn current_token(&self) -> Option<&str> {
        self.credential.token.as_deref()
    }

    /// Current user id, if any.
    pub fn current_user_id(&self) -> Option<&str> {
        self.credential.user_id.as_deref()
    }

    /// Inject an externally-obtained session token.
    pub fn set_token(&mut self, token: impl Into<String>) {
        self.credential.token = Some(token.into());
    }

    /// Inject the user id belonging to the session.
    pub fn set_user_id(&mut self, user_id: impl Into<String>) {
        self.credential.user_id = Some(user_id.into());
    }

    /// Whether a session token is present.
    pub fn is_authenticated(&self) -> bool {
        self.credential.token.is_some()
    }

    /// Fail with [`QxError::Authentication`] when no token is present.
    pub fn require_token(&self) -> QxResult<&str> {
        self.current_token()
            .ok_or_else(|| QxError::Authentication("credentials invalid".into()))
    }

    /// Base URL of the service.
    pub fn endpoint_url(&self) -> &str {
        &self.credential.endpoint_url
    }

    /// Snapshot of the credential.
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Header value sent with the login call.
    pub fn client_application(&self) -> &str {
        &self.client_application
    }
}
