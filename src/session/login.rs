//! Form-based login.

use std::fmt;

use tracing::{debug, info, instrument};

use super::{AuthError, Endpoints, HttpSession};

/// Marker the login endpoint returns for a wrong email/password pair.
const BAD_LOGIN_MARKER: &str = "bad_login";

/// Marker the login endpoint returns on success.
const SUCCESS_MARKER: &str = "Successful login";

/// Account email and password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    email: String,
    password: String,
}

impl Credentials {
    /// Creates credentials from an email/password pair.
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Account email.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Logs `session` in, leaving the auth cookies in its jar.
///
/// The login page is fetched first so the site can set its pre-login cookies.
///
/// # Errors
///
/// - [`AuthError::InvalidCredentials`] when the site reports a bad login
/// - [`AuthError::Unexpected`] when the response has neither marker
/// - [`AuthError::Session`] on transport failures
#[instrument(skip(session, endpoints, credentials), fields(email = %credentials.email()))]
pub async fn login(
    session: &dyn HttpSession,
    endpoints: &Endpoints,
    credentials: &Credentials,
) -> Result<(), AuthError> {
    let login_url = endpoints.login();
    let landing = session.get(&login_url, &[]).await?;
    debug!(status = landing.status(), "fetched login page");

    let response = session
        .post_form(
            &login_url,
            &[
                ("username", credentials.email.as_str()),
                ("password", credentials.password.as_str()),
            ],
        )
        .await?;

    let body = response.text();
    if body.contains(BAD_LOGIN_MARKER) {
        return Err(AuthError::InvalidCredentials);
    }
    if body.contains(SUCCESS_MARKER) {
        info!("login succeeded");
        return Ok(());
    }
    Err(AuthError::Unexpected {
        status: response.status(),
        body: response.excerpt(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use crate::session::{ArchiveSession, SessionTimeouts};
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, ResponseTemplate};

    #[test]
    fn test_credentials_debug_redacts_password() {
        let credentials = Credentials::new("me@example.com", "hunter2");
        let rendered = format!("{credentials:?}");
        assert!(rendered.contains("me@example.com"));
        assert!(!rendered.contains("hunter2"));
    }

    async fn run_login(body: &'static str, status: u16) -> Option<Result<(), AuthError>> {
        let mock_server = start_mock_server_or_skip().await?;
        Mock::given(method("GET"))
            .and(path("/account/login"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/account/login"))
            .and(body_string_contains("username=me%40example.com"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .expect(1)
            .mount(&mock_server)
            .await;

        let session = ArchiveSession::new(SessionTimeouts::default()).unwrap();
        let endpoints = Endpoints::new(mock_server.uri());
        let credentials = Credentials::new("me@example.com", "secret");
        Some(login(&session, &endpoints, &credentials).await)
    }

    #[tokio::test]
    async fn test_login_success_marker() {
        let Some(result) = run_login(r#"{"status":"ok","message":"Successful login"}"#, 200).await
        else {
            return;
        };
        assert!(result.is_ok(), "Expected Ok, got: {result:?}");
    }

    #[tokio::test]
    async fn test_login_bad_credentials() {
        let Some(result) = run_login(r#"{"status":"bad_login"}"#, 200).await else {
            return;
        };
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_login_unexpected_response() {
        let Some(result) = run_login("maintenance", 503).await else {
            return;
        };
        match result {
            Err(AuthError::Unexpected { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "maintenance");
            }
            other => panic!("Expected Unexpected, got: {other:?}"),
        }
    }
}
