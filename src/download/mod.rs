//! Concurrent page image downloads.
//!
//! This module fetches every page of a borrowed book in parallel and writes
//! the image bytes to disk.
//!
//! # Features
//!
//! - Bounded worker count (semaphore, default 50)
//! - Bounded per-page retry with a fixed 1s backoff
//! - Lending-token refresh on HTTP 403 through the shared [`crate::loan::LoanManager`]
//! - Deterministic, zero-padded page file names
//! - Explicit per-page failure accounting ([`PageSet`])

mod engine;
mod error;
pub mod filename;
mod retry;

pub use engine::{DEFAULT_WORKERS, DownloadStats, EngineError, PageDownloader, PageSet};
pub use error::PageFetchError;
pub use filename::{create_unique_dir, create_unique_file, page_file_name, quality_link};
pub use retry::{
    DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY, FailureType, RetryDecision, RetryPolicy,
    classify_error,
};
