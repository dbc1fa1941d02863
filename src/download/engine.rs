//! Concurrent page downloader with bounded retry and re-borrow.
//!
//! One Tokio task is spawned per page before any is awaited; each task holds a
//! semaphore permit while it talks to the site, so at most `max_workers` pages
//! are in flight. Completion order is irrelevant: the output order is fixed by
//! [`page_file_name`].
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use book_downloader_core::download::{DownloadStats, PageDownloader, RetryPolicy};
//! use book_downloader_core::loan::LoanManager;
//! use book_downloader_core::session::{ArchiveSession, Endpoints, HttpSession, SessionTimeouts};
//!
//! # async fn example(links: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
//! let session: Arc<dyn HttpSession> = Arc::new(ArchiveSession::new(SessionTimeouts::default())?);
//! let loan = Arc::new(LoanManager::new(Endpoints::default(), "mybook"));
//! let downloader = PageDownloader::new(50, RetryPolicy::default())?;
//! let stats = Arc::new(DownloadStats::new());
//! let pages = downloader
//!     .download(session, loan, Path::new("./mybook"), &links, 0, stats)
//!     .await?;
//! println!("{} pages, {} failed", pages.len(), pages.failed_indices().len());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use super::PageFetchError;
use super::filename::{page_file_name, quality_link};
use super::retry::{FailureType, RetryDecision, RetryPolicy, classify_error};
use crate::loan::LoanManager;
use crate::session::HttpSession;
use crate::user_agent::PAGE_IMAGE_HEADERS;

/// Minimum allowed worker count.
const MIN_WORKERS: usize = 1;

/// Maximum allowed worker count.
const MAX_WORKERS: usize = 100;

/// Default worker count.
pub const DEFAULT_WORKERS: usize = 50;

/// Error type for downloader setup.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid worker count provided.
    #[error("invalid worker count {value}: must be between {MIN_WORKERS} and {MAX_WORKERS}")]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The page directory could not be created.
    #[error("cannot create page directory {path}: {source}")]
    OutputDir {
        /// Directory path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Live counters of a download run.
///
/// Updated by the page tasks with atomic increments, so an observer (the
/// progress bar) can poll it without blocking the workers.
#[derive(Debug, Default)]
pub struct DownloadStats {
    completed: AtomicUsize,
    failed: AtomicUsize,
    retried: AtomicUsize,
    reborrows: AtomicUsize,
}

impl DownloadStats {
    /// Creates a new stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pages written to disk.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Pages that failed permanently.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Pages in a terminal state (completed + failed).
    #[must_use]
    pub fn total(&self) -> usize {
        self.completed() + self.failed()
    }

    /// Retry attempts made across all pages.
    #[must_use]
    pub fn retried(&self) -> usize {
        self.retried.load(Ordering::SeqCst)
    }

    /// 403 responses answered with a re-borrow request.
    #[must_use]
    pub fn reborrows(&self) -> usize {
        self.reborrows.load(Ordering::SeqCst)
    }

    fn increment_completed(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_retried(&self) {
        self.retried.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_reborrows(&self) {
        self.reborrows.fetch_add(1, Ordering::SeqCst);
    }
}

/// Result of a download run: every page path in reading order, plus the
/// indices of pages that failed permanently.
///
/// Files at failed indices do not exist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSet {
    paths: Vec<PathBuf>,
    failed: Vec<usize>,
}

impl PageSet {
    /// Creates a page set; `failed` is sorted and deduplicated.
    #[must_use]
    pub fn new(paths: Vec<PathBuf>, mut failed: Vec<usize>) -> Self {
        failed.sort_unstable();
        failed.dedup();
        Self { paths, failed }
    }

    /// All computed page paths, in reading order.
    #[must_use]
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Indices of pages that could not be downloaded, ascending.
    #[must_use]
    pub fn failed_indices(&self) -> &[usize] {
        &self.failed
    }

    /// Number of pages in the book.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// True for a book without pages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// True when every page was downloaded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug)]
struct PageTask {
    index: usize,
    url: String,
    path: PathBuf,
}

/// Downloads the pages of one book concurrently.
///
/// # Concurrency Model
///
/// - Each page runs in its own Tokio task, all spawned up front
/// - A semaphore permit is acquired before a task does any I/O
/// - Permits are released when the task finishes (RAII)
///
/// # Retry Behavior
///
/// - HTTP 403: ask the [`LoanManager`] to renew the lending token, retry at once
/// - other statuses and network errors: wait the policy delay, retry
/// - after `max_attempts` requests the page is recorded as failed
#[derive(Debug)]
pub struct PageDownloader {
    semaphore: Arc<Semaphore>,
    max_workers: usize,
    retry_policy: RetryPolicy,
}

impl PageDownloader {
    /// Creates a downloader with `max_workers` concurrent page fetches.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if the value is outside
    /// the valid range (1-100).
    #[instrument(level = "debug", skip(retry_policy))]
    pub fn new(max_workers: usize, retry_policy: RetryPolicy) -> Result<Self, EngineError> {
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&max_workers) {
            return Err(EngineError::InvalidConcurrency { value: max_workers });
        }

        debug!(
            max_workers,
            max_attempts = retry_policy.max_attempts(),
            delay_ms = retry_policy.delay().as_millis(),
            "creating page downloader"
        );

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(max_workers)),
            max_workers,
            retry_policy,
        })
    }

    /// Returns the configured worker count.
    #[must_use]
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Returns the configured retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Downloads every link into `output_dir` and waits for all pages to
    /// reach a terminal state.
    ///
    /// `scale` is appended to each link as the image quality parameter.
    /// Individual page failures do not fail the call; they are listed in the
    /// returned [`PageSet`] and counted in `stats`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::OutputDir`] if `output_dir` cannot be created.
    #[instrument(
        skip(self, session, loan, links, stats),
        fields(output_dir = %output_dir.display(), pages = links.len())
    )]
    pub async fn download(
        &self,
        session: Arc<dyn HttpSession>,
        loan: Arc<LoanManager>,
        output_dir: &Path,
        links: &[String],
        scale: u8,
        stats: Arc<DownloadStats>,
    ) -> Result<PageSet, EngineError> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|source| EngineError::OutputDir {
                path: output_dir.to_path_buf(),
                source,
            })?;

        let total = links.len();
        let paths: Vec<PathBuf> = (0..total)
            .map(|index| output_dir.join(page_file_name(total, index)))
            .collect();

        info!(max_workers = self.max_workers, "downloading pages");

        let mut handles = Vec::with_capacity(total);
        for (index, (link, path)) in links.iter().zip(&paths).enumerate() {
            let task = PageTask {
                index,
                url: quality_link(link, scale),
                path: path.clone(),
            };
            let semaphore = Arc::clone(&self.semaphore);
            let session = Arc::clone(&session);
            let loan = Arc::clone(&loan);
            let stats = Arc::clone(&stats);
            let policy = self.retry_policy.clone();

            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    warn!(index = task.index, "semaphore closed, page skipped");
                    stats.increment_failed();
                    return false;
                };

                match fetch_with_retry(session.as_ref(), &loan, &task, &policy, &stats).await {
                    Ok(()) => {
                        debug!(index = task.index, path = %task.path.display(), "page written");
                        stats.increment_completed();
                        true
                    }
                    Err((e, attempts)) => {
                        warn!(
                            index = task.index,
                            url = %task.url,
                            error = %e,
                            attempts,
                            "page failed after all attempts"
                        );
                        stats.increment_failed();
                        false
                    }
                }
            }));
        }

        let mut failed = Vec::new();
        for (index, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(true) => {}
                Ok(false) => failed.push(index),
                Err(e) => {
                    warn!(index, error = %e, "page task panicked");
                    stats.increment_failed();
                    failed.push(index);
                }
            }
        }

        info!(
            completed = stats.completed(),
            failed = failed.len(),
            retried = stats.retried(),
            reborrows = stats.reborrows(),
            "page download complete"
        );

        Ok(PageSet::new(paths, failed))
    }
}

/// Fetches one page until it is written or the policy gives up.
///
/// Returns the last error and the number of attempts made on failure.
async fn fetch_with_retry(
    session: &dyn HttpSession,
    loan: &LoanManager,
    task: &PageTask,
    policy: &RetryPolicy,
    stats: &DownloadStats,
) -> Result<(), (PageFetchError, u32)> {
    let mut attempt = 1u32;

    loop {
        let generation = loan.generation();
        let error = match fetch_once(session, task).await {
            Ok(body) => return write_page(&task.path, &body).await.map_err(|e| (e, attempt)),
            Err(e) => e,
        };

        let failure_type = classify_error(&error);
        match policy.should_retry(failure_type, attempt) {
            RetryDecision::Retry {
                delay,
                attempt: next_attempt,
            } => {
                debug!(
                    index = task.index,
                    attempt = next_attempt,
                    max_attempts = policy.max_attempts(),
                    error = %error,
                    "retrying page"
                );
                stats.increment_retried();

                if failure_type == FailureType::TokenExpired {
                    stats.increment_reborrows();
                    if let Err(source) = loan.renew(session, generation).await {
                        let error = PageFetchError::Renewal {
                            index: task.index,
                            source,
                        };
                        warn!(error = %error, "could not refresh lending token");
                        tokio::time::sleep(policy.delay()).await;
                    }
                }

                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt = next_attempt;
            }
            RetryDecision::DoNotRetry { reason } => {
                debug!(index = task.index, %reason, "not retrying page");
                return Err((error, attempt));
            }
        }
    }
}

async fn fetch_once(session: &dyn HttpSession, task: &PageTask) -> Result<Vec<u8>, PageFetchError> {
    let response = session
        .get(&task.url, PAGE_IMAGE_HEADERS)
        .await
        .map_err(|source| PageFetchError::Session {
            index: task.index,
            source,
        })?;

    if response.status() == 200 {
        Ok(response.into_body())
    } else {
        Err(PageFetchError::http_status(task.index, response.status()))
    }
}

/// Writes the body verbatim; a partial file is removed on failure.
async fn write_page(path: &Path, body: &[u8]) -> Result<(), PageFetchError> {
    if let Err(source) = tokio::fs::write(path, body).await {
        let _ = tokio::fs::remove_file(path).await;
        return Err(PageFetchError::io(path, source));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;
    use crate::session::{Endpoints, HttpResponse, SessionError};
    use crate::test_support::fake_session::{FakeRequest, FakeSession, ok, status};

    const TOKEN_BODY: &str = r#"{"success":true,"token":"1700000000-abc"}"#;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    fn links(count: usize) -> Vec<String> {
        (0..count)
            .map(|i| format!("https://ia.test/page{i}.jpg?id=mybook"))
            .collect()
    }

    fn loan_reply(request: &FakeRequest) -> Option<Result<HttpResponse, SessionError>> {
        match request.action()? {
            "create_token" => Some(ok(TOKEN_BODY)),
            _ => Some(ok(r#"{"success":true}"#)),
        }
    }

    async fn run(
        session: Arc<FakeSession>,
        count: usize,
        max_attempts: u32,
    ) -> (PageSet, Arc<LoanManager>, Arc<DownloadStats>, TempDir) {
        let temp = TempDir::new().unwrap();
        let loan = Arc::new(LoanManager::new(Endpoints::new("https://archive.test"), "mybook"));
        let stats = Arc::new(DownloadStats::new());
        let downloader = PageDownloader::new(4, fast_policy(max_attempts)).unwrap();
        let pages = downloader
            .download(
                session,
                Arc::clone(&loan),
                temp.path(),
                &links(count),
                0,
                Arc::clone(&stats),
            )
            .await
            .unwrap();
        (pages, loan, stats, temp)
    }

    #[test]
    fn test_new_valid_worker_counts() {
        for workers in [1, 50, 100] {
            let downloader = PageDownloader::new(workers, RetryPolicy::default()).unwrap();
            assert_eq!(downloader.max_workers(), workers);
        }
    }

    #[test]
    fn test_new_invalid_worker_counts() {
        assert!(matches!(
            PageDownloader::new(0, RetryPolicy::default()),
            Err(EngineError::InvalidConcurrency { value: 0 })
        ));
        assert!(matches!(
            PageDownloader::new(101, RetryPolicy::default()),
            Err(EngineError::InvalidConcurrency { value: 101 })
        ));
    }

    #[test]
    fn test_new_stores_retry_policy() {
        let downloader = PageDownloader::new(10, RetryPolicy::with_max_attempts(5)).unwrap();
        assert_eq!(downloader.retry_policy().max_attempts(), 5);
    }

    #[test]
    fn test_engine_error_display() {
        let msg = EngineError::InvalidConcurrency { value: 0 }.to_string();
        assert!(msg.contains("invalid worker count 0"));
        assert!(msg.contains("between 1 and 100"));
    }

    #[test]
    fn test_page_set_sorts_failures() {
        let pages = PageSet::new(vec![PathBuf::from("a"); 4], vec![3, 1, 3]);
        assert_eq!(pages.failed_indices(), &[1, 3]);
        assert!(!pages.is_complete());
        assert_eq!(pages.len(), 4);
    }

    #[test]
    fn test_download_stats_thread_safe() {
        let stats = Arc::new(DownloadStats::new());
        let mut handles = Vec::new();
        for _ in 0..10 {
            let stats = Arc::clone(&stats);
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    stats.increment_completed();
                    stats.increment_failed();
                    stats.increment_retried();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(stats.completed(), 1000);
        assert_eq!(stats.failed(), 1000);
        assert_eq!(stats.retried(), 1000);
        assert_eq!(stats.total(), 2000);
    }

    #[tokio::test]
    async fn test_all_pages_written_in_order() {
        let session = Arc::new(FakeSession::new(|request| {
            let page = request.url.split("page").nth(1).unwrap_or_default();
            ok(&format!("jpeg-{}", &page[..1]))
        }));

        let (pages, loan, stats, temp) = run(Arc::clone(&session), 12, 3).await;

        assert!(pages.is_complete());
        assert_eq!(pages.paths()[0], temp.path().join("00.jpg"));
        assert_eq!(pages.paths()[11], temp.path().join("11.jpg"));
        assert_eq!(std::fs::read(temp.path().join("03.jpg")).unwrap(), b"jpeg-3");
        assert_eq!(stats.completed(), 12);
        assert_eq!(loan.renewals(), 0);
    }

    #[tokio::test]
    async fn test_quality_parameters_appended() {
        let session = Arc::new(FakeSession::new(|_| ok("x")));
        run(Arc::clone(&session), 2, 3).await;
        assert!(
            session
                .requests()
                .iter()
                .all(|r| r.url.ends_with("?id=mybook&rotate=0&scale=0"))
        );
    }

    #[tokio::test]
    async fn test_always_failing_page_uses_exact_attempts() {
        let session = Arc::new(FakeSession::new(|request| {
            if request.url.contains("page1.jpg") {
                status(500, "boom")
            } else {
                ok("x")
            }
        }));

        let (pages, _loan, stats, temp) = run(Arc::clone(&session), 3, 3).await;

        assert_eq!(session.count(|r| r.url.contains("page1.jpg")), 3);
        assert_eq!(pages.failed_indices(), &[1]);
        assert!(!temp.path().join("1.jpg").exists());
        assert!(temp.path().join("0.jpg").exists());
        assert!(temp.path().join("2.jpg").exists());
        assert_eq!(stats.failed(), 1);
        assert_eq!(stats.completed(), 2);
    }

    #[tokio::test]
    async fn test_transport_errors_are_retried() {
        let failed_once = AtomicBool::new(false);
        let session = Arc::new(FakeSession::new(move |request| {
            if request.url.contains("page0.jpg") && !failed_once.swap(true, Ordering::SeqCst) {
                Err(SessionError::timeout(request.url.clone()))
            } else {
                ok("x")
            }
        }));

        let (pages, _loan, stats, _temp) = run(Arc::clone(&session), 2, 3).await;

        assert!(pages.is_complete());
        assert_eq!(stats.retried(), 1);
        assert_eq!(session.count(|r| r.url.contains("page0.jpg")), 2);
    }

    #[tokio::test]
    async fn test_expired_token_triggers_one_renewal() {
        let expired = AtomicBool::new(true);
        let session = Arc::new(FakeSession::new(move |request| {
            if let Some(reply) = loan_reply(request) {
                return reply;
            }
            if request.url.contains("page2.jpg") && expired.swap(false, Ordering::SeqCst) {
                return status(403, "expired");
            }
            ok("x")
        }));

        let (pages, loan, stats, temp) = run(Arc::clone(&session), 3, 3).await;

        assert!(pages.is_complete());
        for name in ["0.jpg", "1.jpg", "2.jpg"] {
            assert!(temp.path().join(name).exists(), "{name} missing");
        }
        assert_eq!(loan.renewals(), 1);
        assert_eq!(stats.reborrows(), 1);
        assert_eq!(session.count(|r| r.action() == Some("create_token")), 1);
    }

    #[tokio::test]
    async fn test_revoked_token_is_bounded() {
        let session = Arc::new(FakeSession::new(|request| {
            loan_reply(request).unwrap_or_else(|| status(403, "revoked"))
        }));

        let (pages, _loan, stats, _temp) = run(Arc::clone(&session), 2, 3).await;

        assert_eq!(pages.failed_indices(), &[0, 1]);
        assert_eq!(session.count(|r| r.method == "GET"), 6);
        assert_eq!(stats.failed(), 2);
    }

    #[tokio::test]
    async fn test_empty_link_list() {
        let session = Arc::new(FakeSession::new(|_| ok("x")));
        let (pages, _loan, _stats, _temp) = run(Arc::clone(&session), 0, 3).await;
        assert!(pages.is_empty());
        assert!(session.requests().is_empty());
    }
}
