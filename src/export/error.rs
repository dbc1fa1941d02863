//! Error types for PDF assembly and upload.

use std::path::PathBuf;

use thiserror::Error;

use crate::extract::UnsupportedMetadata;

/// Failures while turning page images into a PDF.
///
/// Never fatal for the run: the workflow keeps the page directory and reports
/// an images-only result instead.
#[derive(Debug, Error)]
pub enum AssemblyError {
    /// A metadata field used for the PDF has an unsupported type.
    #[error(transparent)]
    UnsupportedMetadata(#[from] UnsupportedMetadata),

    /// None of the page files exist.
    #[error("no page images to assemble (expected {expected})")]
    NoPages {
        /// Number of page paths that were given.
        expected: usize,
    },

    /// A page file is not a JPEG the PDF can embed.
    #[error("cannot embed {path}: {reason}")]
    Image {
        /// Page file path.
        path: PathBuf,
        /// Decoder message.
        reason: String,
    },

    /// Reading a page or writing the PDF failed.
    #[error("IO error at {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The PDF writer failed.
    #[error("PDF generation failed: {reason}")]
    Pdf {
        /// Writer message.
        reason: String,
    },
}

impl AssemblyError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a PDF writer error.
    pub fn pdf(reason: impl ToString) -> Self {
        Self::Pdf {
            reason: reason.to_string(),
        }
    }
}

/// Failures while uploading the finished PDF. Reported as warnings.
#[derive(Debug, Error)]
pub enum UploadError {
    /// No access token was configured.
    #[error("no Google Drive access token: set `drive_access_token` or GDRIVE_ACCESS_TOKEN")]
    MissingToken,

    /// The local file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// Local file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The upload client could not be built.
    #[error("failed to build upload client: {reason}")]
    ClientBuild {
        /// Why construction failed.
        reason: String,
    },

    /// A Drive request never got a response.
    #[error("network error during {step}: {source}")]
    Network {
        /// Upload step.
        step: &'static str,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The Drive API answered with an error status.
    #[error("Drive API error during {step} (HTTP {status}): {body}")]
    Api {
        /// Upload step.
        step: &'static str,
        /// The HTTP status code.
        status: u16,
        /// Leading part of the response body.
        body: String,
    },

    /// The Drive API answer lacked an expected field.
    #[error("unexpected Drive API response during {step}: missing `{field}`")]
    MissingField {
        /// Upload step.
        step: &'static str,
        /// Name of the absent field.
        field: &'static str,
    },

    /// An API URL could not be built.
    #[error("invalid Drive API URL: {url}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
    },
}
