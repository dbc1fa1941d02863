//! Error types for the session layer.
//!
//! Transport failures are reported as [`SessionError`]. HTTP status codes are
//! never errors at this layer: callers inspect [`super::HttpResponse::status`].

use thiserror::Error;

/// Transport-level failures while talking to the site.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error requesting {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {reason}")]
    ClientBuild {
        /// Why construction failed.
        reason: String,
    },
}

impl SessionError {
    /// Creates an error from a reqwest failure, promoting timeouts.
    pub fn from_reqwest(url: impl Into<String>, source: reqwest::Error) -> Self {
        let url = url.into();
        if source.is_timeout() {
            Self::Timeout { url }
        } else {
            Self::Network { url, source }
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }
}

/// Login failures. All of them abort the run.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The site rejected the email/password pair.
    #[error("invalid credentials: update `email` and `password` in the config file")]
    InvalidCredentials,

    /// No credentials were configured.
    #[error("missing credentials: set `email`/`password` in the config file or ARCHIVE_EMAIL/ARCHIVE_PASSWORD")]
    MissingCredentials,

    /// The login response matched neither the success nor the failure marker.
    #[error("unexpected login response (HTTP {status}): {body}")]
    Unexpected {
        /// Status code of the login POST.
        status: u16,
        /// Leading part of the response body.
        body: String,
    },

    /// The login request never got a response.
    #[error("login request failed: {0}")]
    Session(#[from] SessionError),
}
