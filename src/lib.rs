//! Book Downloader Core Library
//!
//! Downloads lending-library books from archive.org: logs in, borrows the
//! book, fetches every page image concurrently, assembles a PDF and hands the
//! loan back.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`session`] - HTTP session with shared cookies, login, site endpoints
//! - [`loan`] - Loan state machine (borrow, token renewal, return)
//! - [`extract`] - Book identifier, title, page links and metadata
//! - [`download`] - Concurrent page downloader with bounded retry
//! - [`export`] - PDF assembly, `metadata.json`, Google Drive upload
//! - [`config`] - Config file loading and validation
//! - [`workflow`] - End-to-end run for one book

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod download;
pub mod export;
pub mod extract;
pub mod loan;
pub mod session;
pub mod user_agent;
pub mod workflow;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use config::{Config, LoadedConfig, load_config, resolve_default_config_path};
pub use download::{
    DEFAULT_MAX_RETRIES, DEFAULT_WORKERS, DownloadStats, EngineError, PageDownloader, PageSet,
    RetryPolicy,
};
pub use export::{GoogleDriveUploader, PdfAssembler, Uploader};
pub use extract::{BookInfo, ExtractionError, Metadata, book_id_from_url, fetch_book_info};
pub use loan::{BorrowOutcome, LoanError, LoanManager, LoanState};
pub use session::{ArchiveSession, AuthError, Credentials, Endpoints, HttpSession, login};
pub use workflow::{
    BookDownloader, BookReport, StatusKind, StatusLine, WorkflowError, WorkflowObserver,
};
