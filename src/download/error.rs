//! Error types for page downloads.

use std::path::PathBuf;

use thiserror::Error;

use crate::loan::LoanError;
use crate::session::SessionError;

/// Why one attempt at fetching a page failed.
///
/// Absorbed inside the downloader: retried while attempts remain, then the
/// page is recorded as failed and the run goes on.
#[derive(Debug, Error)]
pub enum PageFetchError {
    /// The page request returned a status other than 200.
    #[error("HTTP {status} fetching page {index}")]
    HttpStatus {
        /// Page index.
        index: usize,
        /// The HTTP status code.
        status: u16,
    },

    /// The request never got a response.
    #[error("request for page {index} failed: {source}")]
    Session {
        /// Page index.
        index: usize,
        /// The transport error.
        #[source]
        source: SessionError,
    },

    /// Refreshing the lending token after a 403 failed.
    #[error("re-borrow for page {index} failed: {source}")]
    Renewal {
        /// Page index.
        index: usize,
        /// The loan error.
        #[source]
        source: LoanError,
    },

    /// The page body could not be written to disk.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// Target path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl PageFetchError {
    /// Creates an HTTP status error.
    pub fn http_status(index: usize, status: u16) -> Self {
        Self::HttpStatus { index, status }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_display() {
        assert_eq!(
            PageFetchError::http_status(4, 500).to_string(),
            "HTTP 500 fetching page 4"
        );
    }

    #[test]
    fn test_io_display_has_path() {
        let error = PageFetchError::io(
            "/tmp/book/01.jpg",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(error.to_string().contains("/tmp/book/01.jpg"));
    }
}
