//! End-to-end run for one book.
//!
//! login → borrow → extract → download → PDF → upload → return.
//!
//! Fatal errors ([`WorkflowError`]) abort the run; once the book is borrowed,
//! the loan is still handed back before the error is returned. Page failures,
//! PDF assembly failures, upload failures and return failures are reported as
//! status lines and the run carries on.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::download::{DownloadStats, EngineError, PageDownloader, PageSet, create_unique_dir};
use crate::export::{
    Assembler, AssemblyError, PdfAssembler, PdfMetadata, Uploader, save_artifact,
    write_metadata_json,
};
use crate::extract::{BookInfo, ExtractionError, book_id_from_url, fetch_book_info};
use crate::loan::{BorrowOutcome, LoanError, LoanManager};
use crate::session::{AuthError, Endpoints, HttpSession, login};

/// Fatal errors of a run.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Login failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Borrowing failed.
    #[error(transparent)]
    Loan(#[from] LoanError),

    /// The book's pages could not be listed.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// The downloader could not be set up.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Output could not be written.
    #[error("IO error at {path}: {source}")]
    Io {
        /// The path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl WorkflowError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Kind of a user-facing status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    /// Plain progress note.
    Info,
    /// A step succeeded (`[+]`).
    Success,
    /// A step failed (`[-]`).
    Failure,
    /// Something the user should know about (`[!]`).
    Warning,
}

/// One user-facing status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    /// Line kind.
    pub kind: StatusKind,
    /// Message without prefix.
    pub message: String,
}

impl StatusLine {
    fn new(kind: StatusKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            StatusKind::Info => write!(f, "{}", self.message),
            StatusKind::Success => write!(f, "[+] {}", self.message),
            StatusKind::Failure => write!(f, "[-] {}", self.message),
            StatusKind::Warning => write!(f, "[!] {}", self.message),
        }
    }
}

/// Receives status lines and download progress of a run.
pub trait WorkflowObserver: Send + Sync {
    /// A status line for the user.
    fn status(&self, line: StatusLine);

    /// Page downloads are starting; `stats` is updated live.
    fn download_started(&self, _pages: usize, _stats: Arc<DownloadStats>) {}

    /// All page tasks reached a terminal state.
    fn download_finished(&self) {}
}

/// Observer that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentObserver;

impl WorkflowObserver for SilentObserver {
    fn status(&self, _line: StatusLine) {}
}

/// What a completed run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookReport {
    /// Book identifier.
    pub book_id: String,
    /// Sanitized title used for file names.
    pub title: String,
    /// Page directory; removed after a successful PDF unless it holds `metadata.json`.
    pub directory: PathBuf,
    /// Saved PDF, if one was created.
    pub pdf: Option<PathBuf>,
    /// Shareable link, if the upload succeeded.
    pub link: Option<String>,
    /// Number of pages in the book.
    pub pages: usize,
    /// Indices of pages that could not be downloaded.
    pub failed_pages: Vec<usize>,
    /// Whether the loan was handed back.
    pub returned: bool,
}

/// Downloads books with one shared session.
pub struct BookDownloader {
    session: Arc<dyn HttpSession>,
    endpoints: Endpoints,
    config: Config,
    assembler: Arc<dyn Assembler>,
    uploader: Option<Arc<dyn Uploader>>,
}

impl BookDownloader {
    /// Creates a downloader assembling PDFs with [`PdfAssembler`] and without upload.
    #[must_use]
    pub fn new(session: Arc<dyn HttpSession>, endpoints: Endpoints, config: Config) -> Self {
        Self {
            session,
            endpoints,
            config,
            assembler: Arc::new(PdfAssembler),
            uploader: None,
        }
    }

    /// Replaces the PDF assembler.
    #[must_use]
    pub fn with_assembler(mut self, assembler: Arc<dyn Assembler>) -> Self {
        self.assembler = assembler;
        self
    }

    /// Uploads finished PDFs when `upload_to_drive` is enabled.
    #[must_use]
    pub fn with_uploader(mut self, uploader: Arc<dyn Uploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    /// Runs the whole workflow for the book at `url`.
    ///
    /// # Errors
    ///
    /// Any [`WorkflowError`]; they are all fatal for the run.
    #[instrument(skip(self, observer))]
    pub async fn download_book(
        &self,
        url: &str,
        observer: &dyn WorkflowObserver,
    ) -> Result<BookReport, WorkflowError> {
        let book_id = book_id_from_url(url, &self.endpoints)?;
        let downloader = PageDownloader::new(self.config.thread_count, self.config.retry_policy())?;

        let credentials = self.config.credentials()?;
        login(self.session.as_ref(), &self.endpoints, &credentials).await?;
        observer.status(StatusLine::new(StatusKind::Success, "Successful login"));

        observer.status(StatusLine::new(StatusKind::Info, "=".repeat(40)));
        observer.status(StatusLine::new(
            StatusKind::Info,
            format!("Current book: {}", self.endpoints.details(&book_id)),
        ));

        let loan = Arc::new(LoanManager::new(self.endpoints.clone(), book_id.as_str()));
        match loan.borrow(self.session.as_ref()).await? {
            BorrowOutcome::Borrowed => {
                observer.status(StatusLine::new(StatusKind::Success, "Successful loan"));
            }
            BorrowOutcome::NotRequired => observer.status(StatusLine::new(
                StatusKind::Info,
                "This book doesn't need to be borrowed",
            )),
            BorrowOutcome::AlreadyBorrowed => {}
        }

        let outcome = self.borrowed_run(url, &book_id, &loan, &downloader, observer).await;

        let returned = match loan.return_loan(self.session.as_ref()).await {
            Ok(()) => {
                observer.status(StatusLine::new(StatusKind::Success, "Book returned"));
                true
            }
            Err(e) => {
                warn!(error = %e, "loan not returned");
                observer.status(StatusLine::new(
                    StatusKind::Warning,
                    format!("Something went wrong when trying to return the book: {e}"),
                ));
                false
            }
        };

        let mut report = outcome?;
        report.returned = returned;
        Ok(report)
    }

    async fn borrowed_run(
        &self,
        url: &str,
        book_id: &str,
        loan: &Arc<LoanManager>,
        downloader: &PageDownloader,
        observer: &dyn WorkflowObserver,
    ) -> Result<BookReport, WorkflowError> {
        let info = match fetch_book_info(self.session.as_ref(), url).await {
            Ok(info) => info,
            Err(e) => {
                observer.status(StatusLine::new(
                    StatusKind::Failure,
                    "Error while getting image links",
                ));
                return Err(e.into());
            }
        };
        observer.status(StatusLine::new(
            StatusKind::Success,
            format!("Found {} pages", info.links.len()),
        ));

        let title = if info.title.is_empty() {
            book_id.to_string()
        } else {
            info.title.clone()
        };

        let directory = create_unique_dir(&self.config.output_dir, &title)
            .await
            .map_err(|e| WorkflowError::io(&self.config.output_dir, e))?;

        if self.config.save_metadata {
            observer.status(StatusLine::new(StatusKind::Info, "Writing metadata.json..."));
            write_metadata_json(&directory, &info.metadata)
                .await
                .map_err(|e| WorkflowError::io(&directory, e))?;
        }

        observer.status(StatusLine::new(StatusKind::Info, "Downloading pages..."));
        let stats = Arc::new(DownloadStats::new());
        observer.download_started(info.links.len(), Arc::clone(&stats));
        let pages = downloader
            .download(
                Arc::clone(&self.session),
                Arc::clone(loan),
                &directory,
                &info.links,
                self.config.resolution,
                stats,
            )
            .await;
        observer.download_finished();
        let pages = pages?;

        if !pages.is_complete() {
            observer.status(StatusLine::new(
                StatusKind::Warning,
                format!(
                    "{} of {} pages could not be downloaded: {:?}",
                    pages.failed_indices().len(),
                    pages.len(),
                    pages.failed_indices()
                ),
            ));
        }

        let mut report = BookReport {
            book_id: book_id.to_string(),
            title: title.clone(),
            directory: directory.clone(),
            pdf: None,
            link: None,
            pages: pages.len(),
            failed_pages: pages.failed_indices().to_vec(),
            returned: false,
        };

        if !self.config.create_pdf {
            return Ok(report);
        }

        match self.make_pdf(book_id, &title, &info, &pages).await {
            Ok(pdf_path) => {
                let file_name = pdf_path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                observer.status(StatusLine::new(
                    StatusKind::Success,
                    format!("PDF saved as \"{file_name}\""),
                ));
                report.link = self.share(&pdf_path, observer).await;
                report.pdf = Some(pdf_path);
                remove_page_directory(&directory, observer).await;
            }
            Err(e) => {
                warn!(error = %e, "pdf assembly failed");
                observer.status(StatusLine::new(
                    StatusKind::Failure,
                    format!("Could not create the PDF: {e}"),
                ));
                observer.status(StatusLine::new(
                    StatusKind::Success,
                    format!("Images saved in directory: {}", directory.display()),
                ));
            }
        }

        Ok(report)
    }

    async fn make_pdf(
        &self,
        book_id: &str,
        title: &str,
        info: &BookInfo,
        pages: &PageSet,
    ) -> Result<PathBuf, AssemblyError> {
        let metadata = PdfMetadata::from_metadata(&info.metadata, self.endpoints.details(book_id))?;
        let assembler = Arc::clone(&self.assembler);
        let paths = pages.paths().to_vec();

        let bytes = tokio::task::spawn_blocking(move || assembler.assemble(&paths, &metadata))
            .await
            .map_err(AssemblyError::pdf)??;

        save_artifact(&bytes, &self.config.output_dir, title).await
    }

    async fn share(&self, pdf_path: &Path, observer: &dyn WorkflowObserver) -> Option<String> {
        if !self.config.upload_to_drive {
            return None;
        }
        let Some(uploader) = &self.uploader else {
            observer.status(StatusLine::new(
                StatusKind::Warning,
                format!(
                    "Google Drive upload is not configured. File saved locally at: {}",
                    pdf_path.display()
                ),
            ));
            return None;
        };

        observer.status(StatusLine::new(
            StatusKind::Success,
            "Creating shareable link using Google Drive...",
        ));
        match uploader.upload(pdf_path).await {
            Ok(link) => {
                observer.status(StatusLine::new(
                    StatusKind::Success,
                    format!("Shareable link created: {link}"),
                ));
                Some(link)
            }
            Err(e) => {
                warn!(error = %e, "upload failed");
                observer.status(StatusLine::new(
                    StatusKind::Failure,
                    format!("Error creating shareable link: {e}"),
                ));
                observer.status(StatusLine::new(
                    StatusKind::Warning,
                    format!("File saved locally at: {}", pdf_path.display()),
                ));
                None
            }
        }
    }
}

/// Deletes the page directory with everything in it.
async fn remove_page_directory(directory: &Path, observer: &dyn WorkflowObserver) {
    match tokio::fs::remove_dir_all(directory).await {
        Ok(()) => info!(directory = %directory.display(), "page directory removed"),
        Err(e) => {
            warn!(directory = %directory.display(), error = %e, "page directory not removed");
            observer.status(StatusLine::new(
                StatusKind::Warning,
                format!("Error: {} - {e}", directory.display()),
            ));
        }
    }
}
