//! Loan state machine for one book within one session.
//!
//! ```text
//! NotBorrowed --borrow--> Borrowed --return_loan--> Returned
//!                          |    ^
//!                          +----+ renew (token refresh on HTTP 403)
//! ```
//!
//! Borrowing escalates access in three fixed steps: `grant_access`, then
//! `browse_book`, then `create_token`. Skipping a step leaves the page images
//! unreadable.
//!
//! Page workers call [`LoanManager::renew`] when the lending token expires
//! mid-download. Many workers can hit the expiry at once; renewals are
//! serialized behind a mutex and coalesced through a generation counter, so a
//! burst of 403s costs one renewal, or at worst a few redundant ones.

mod error;

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::session::{Endpoints, HttpResponse, HttpSession};

pub use error::LoanError;

/// Error text the site returns from `browse_book` for books that are readable
/// without a loan.
pub const NOT_AVAILABLE_TO_BORROW: &str =
    "This book is not available to borrow at this time. Please try again later.";

/// Lifecycle of a loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanState {
    /// No loan requested yet.
    NotBorrowed,
    /// Pages are readable (with or without a lending token).
    Borrowed,
    /// The loan was handed back.
    Returned,
}

impl fmt::Display for LoanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotBorrowed => "not-borrowed",
            Self::Borrowed => "borrowed",
            Self::Returned => "returned",
        };
        f.write_str(label)
    }
}

/// What [`LoanManager::borrow`] ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorrowOutcome {
    /// A lending token was created.
    Borrowed,
    /// The site reports the book doesn't need to be borrowed.
    NotRequired,
    /// The loan was already active; nothing was sent.
    AlreadyBorrowed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccessMode {
    Initial,
    Renew,
}

/// Drives borrow/renew/return requests for one book.
#[derive(Debug)]
pub struct LoanManager {
    endpoints: Endpoints,
    book_id: String,
    state: Mutex<LoanState>,
    generation: AtomicU64,
    renewals: AtomicUsize,
}

impl LoanManager {
    /// Creates a manager in state [`LoanState::NotBorrowed`].
    #[must_use]
    pub fn new(endpoints: Endpoints, book_id: impl Into<String>) -> Self {
        Self {
            endpoints,
            book_id: book_id.into(),
            state: Mutex::new(LoanState::NotBorrowed),
            generation: AtomicU64::new(0),
            renewals: AtomicUsize::new(0),
        }
    }

    /// Book identifier this loan is for.
    #[must_use]
    pub fn book_id(&self) -> &str {
        &self.book_id
    }

    /// Current state.
    pub async fn state(&self) -> LoanState {
        *self.state.lock().await
    }

    /// Token generation; bumped by every renewal that reached the network.
    ///
    /// Workers read it before a request and pass it back to [`Self::renew`].
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Number of renewals that were sent to the site.
    #[must_use]
    pub fn renewals(&self) -> usize {
        self.renewals.load(Ordering::SeqCst)
    }

    /// Borrows the book. Idempotent once borrowed.
    ///
    /// # Errors
    ///
    /// - [`LoanError::BorrowRejected`] / [`LoanError::TokenRejected`] when the site refuses
    /// - [`LoanError::InvalidTransition`] after the loan was returned
    /// - [`LoanError::Session`] on transport failures
    #[instrument(skip(self, session), fields(book_id = %self.book_id))]
    pub async fn borrow(&self, session: &dyn HttpSession) -> Result<BorrowOutcome, LoanError> {
        let mut state = self.state.lock().await;
        match *state {
            LoanState::Borrowed => {
                debug!("already borrowed, nothing to do");
                return Ok(BorrowOutcome::AlreadyBorrowed);
            }
            LoanState::Returned => {
                return Err(LoanError::InvalidTransition {
                    from: LoanState::Returned,
                    action: "borrow",
                });
            }
            LoanState::NotBorrowed => {}
        }

        let outcome = self.request_access(session, AccessMode::Initial).await?;
        *state = LoanState::Borrowed;
        info!(?outcome, "loan active");
        Ok(outcome)
    }

    /// Re-runs the borrow sequence to refresh an expired lending token.
    ///
    /// `observed_generation` is the value of [`Self::generation`] the caller saw
    /// before its failed request. If another caller renewed since then, this
    /// returns immediately without touching the network. Responses saying the
    /// book is already borrowed are tolerated.
    ///
    /// Returns the generation to use for subsequent requests.
    ///
    /// # Errors
    ///
    /// - [`LoanError::TokenRejected`] when no new token is handed out
    /// - [`LoanError::InvalidTransition`] after the loan was returned
    /// - [`LoanError::Session`] on transport failures
    #[instrument(skip(self, session), fields(book_id = %self.book_id))]
    pub async fn renew(
        &self,
        session: &dyn HttpSession,
        observed_generation: u64,
    ) -> Result<u64, LoanError> {
        let mut state = self.state.lock().await;
        let current = self.generation();
        if current != observed_generation {
            debug!(current, observed_generation, "token already renewed by another worker");
            return Ok(current);
        }
        if *state == LoanState::Returned {
            return Err(LoanError::InvalidTransition {
                from: LoanState::Returned,
                action: "renew",
            });
        }

        self.renewals.fetch_add(1, Ordering::SeqCst);
        self.request_access(session, AccessMode::Renew).await?;
        *state = LoanState::Borrowed;
        let next = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(generation = next, "lending token renewed");
        Ok(next)
    }

    /// Hands the book back.
    ///
    /// # Errors
    ///
    /// - [`LoanError::ReturnFailed`] unless the site answers 200 with a truthy `success`
    /// - [`LoanError::InvalidTransition`] when the book is not borrowed
    /// - [`LoanError::Session`] on transport failures
    #[instrument(skip(self, session), fields(book_id = %self.book_id))]
    pub async fn return_loan(&self, session: &dyn HttpSession) -> Result<(), LoanError> {
        let mut state = self.state.lock().await;
        if *state != LoanState::Borrowed {
            return Err(LoanError::InvalidTransition {
                from: *state,
                action: "return",
            });
        }

        let response = session
            .post_form(
                &self.endpoints.loan(),
                &[("action", "return_loan"), ("identifier", self.book_id.as_str())],
            )
            .await?;

        let succeeded = response.status() == 200
            && response
                .json::<Value>()
                .ok()
                .and_then(|body| body.get("success").map(is_truthy))
                .unwrap_or(false);
        if !succeeded {
            warn!(status = response.status(), "return_loan was not acknowledged");
            return Err(LoanError::ReturnFailed {
                book_id: self.book_id.clone(),
                status: response.status(),
                body: response.excerpt(),
            });
        }

        *state = LoanState::Returned;
        info!("book returned");
        Ok(())
    }

    async fn request_access(
        &self,
        session: &dyn HttpSession,
        mode: AccessMode,
    ) -> Result<BorrowOutcome, LoanError> {
        let loan_url = self.endpoints.loan();
        let book_id = self.book_id.as_str();

        // The grant_access answer carries nothing useful; only transport errors matter.
        let grant = session
            .post_form(
                &self.endpoints.search_inside(),
                &[("action", "grant_access"), ("identifier", book_id)],
            )
            .await?;
        debug!(status = grant.status(), "grant_access sent");

        let browse = session
            .post_form(&loan_url, &[("action", "browse_book"), ("identifier", book_id)])
            .await?;
        if !browse.is_success() {
            let message = error_message(&browse);
            if browse.status() == 400 && message == NOT_AVAILABLE_TO_BORROW {
                debug!("book is readable without a loan");
                return Ok(BorrowOutcome::NotRequired);
            }
            match mode {
                AccessMode::Initial => {
                    return Err(LoanError::BorrowRejected {
                        book_id: self.book_id.clone(),
                        status: browse.status(),
                        message,
                    });
                }
                AccessMode::Renew => {
                    debug!(status = browse.status(), %message, "browse_book refused during renewal, requesting token anyway");
                }
            }
        }

        let token = session
            .post_form(&loan_url, &[("action", "create_token"), ("identifier", book_id)])
            .await?;
        if token.text().contains("token") {
            Ok(BorrowOutcome::Borrowed)
        } else {
            Err(LoanError::TokenRejected {
                book_id: self.book_id.clone(),
                status: token.status(),
                body: token.excerpt(),
            })
        }
    }
}

/// Extracts the JSON `error` field of a response, or a body excerpt.
fn error_message(response: &HttpResponse) -> String {
    response
        .json::<Value>()
        .ok()
        .and_then(|body| body.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| response.excerpt())
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
