//! Authenticated HTTP session against archive.org.
//!
//! The rest of the crate talks to the site only through the [`HttpSession`]
//! trait: it issues GETs and form POSTs and inspects status codes and bodies.
//! Cookies live inside the concrete session and are never touched directly.
//!
//! # Example
//!
//! ```no_run
//! use book_downloader_core::session::{
//!     ArchiveSession, Credentials, Endpoints, SessionTimeouts, login,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = ArchiveSession::new(SessionTimeouts::default())?;
//! let credentials = Credentials::new("me@example.com", "secret");
//! login(&session, &Endpoints::default(), &credentials).await?;
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod endpoints;
mod error;
mod login;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

pub use client::{ArchiveSession, SessionTimeouts};
pub use endpoints::Endpoints;
pub use error::{AuthError, SessionError};
pub use login::{Credentials, login};

/// Status and raw body of a completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    status: u16,
    body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response from its parts.
    #[must_use]
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    /// HTTP status code.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// True for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Raw body bytes.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Consumes the response, returning the body.
    #[must_use]
    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body parsed as JSON.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error when the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Leading part of the body, for error messages.
    #[must_use]
    pub fn excerpt(&self) -> String {
        self.text()
            .chars()
            .take(constants::BODY_EXCERPT_CHARS)
            .collect()
    }
}

/// Capability to talk to the site with shared cookie state.
///
/// Implementations must tolerate concurrent calls from many tasks: every page
/// worker of a download shares one session.
#[async_trait]
pub trait HttpSession: Send + Sync {
    /// Issues a GET with extra request headers.
    async fn get(&self, url: &str, headers: &[(&str, &str)])
    -> Result<HttpResponse, SessionError>;

    /// Issues a form-encoded POST.
    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<HttpResponse, SessionError>;
}
