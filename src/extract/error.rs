//! Error types for book page extraction.

use thiserror::Error;

use crate::session::SessionError;

/// Fewest page links a real book manifest yields.
pub const MIN_PAGE_LINKS: usize = 2;

/// Errors while turning a book URL into page links. All are fatal for the run:
/// the site's page structure is not transient, so nothing is retried.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The URL is not a book details URL.
    #[error("invalid URL '{url}': must start with \"{expected_prefix}\"\n  Suggestion: copy the address of the book's details page")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
        /// Prefix every accepted URL starts with.
        expected_prefix: String,
    },

    /// The URL has the right prefix but no identifier after it.
    #[error("no book identifier in '{url}'")]
    MissingIdentifier {
        /// The rejected URL.
        url: String,
    },

    /// A page or manifest request returned a non-200 status.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that failed.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The details page has no embedded viewer-manifest URL.
    #[error("no viewer manifest URL found in {url}")]
    MarkerNotFound {
        /// Details page URL.
        url: String,
    },

    /// The manifest is not JSON of the expected shape.
    #[error("unexpected manifest format at {url}: {reason}")]
    Manifest {
        /// Manifest URL.
        url: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Too few page links for a real book.
    #[error("error while getting image links: found {found} page(s), need at least {MIN_PAGE_LINKS}")]
    TooFewPages {
        /// Number of links recovered.
        found: usize,
    },

    /// A request never got a response.
    #[error("request failed: {0}")]
    Session(#[from] SessionError),
}

impl ExtractionError {
    /// Creates a manifest-format error.
    pub fn manifest(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Manifest {
            url: url.into(),
            reason: reason.into(),
        }
    }
}
