//! Error types for loan operations.

use thiserror::Error;

use super::LoanState;
use crate::session::SessionError;

/// Unexpected responses while borrowing, renewing or returning a book.
///
/// Fatal when raised by [`super::LoanManager::borrow`]; the workflow only warns
/// about [`LoanError::ReturnFailed`].
#[derive(Debug, Error)]
pub enum LoanError {
    /// The `browse_book` step was refused.
    #[error("borrowing {book_id} was refused (HTTP {status}): {message}")]
    BorrowRejected {
        /// Book identifier.
        book_id: String,
        /// Status code of the `browse_book` response.
        status: u16,
        /// Server-provided error text or body excerpt.
        message: String,
    },

    /// The `create_token` step did not hand out a token.
    #[error("no lending token for {book_id} (HTTP {status}), maybe this book can't be borrowed: {body}")]
    TokenRejected {
        /// Book identifier.
        book_id: String,
        /// Status code of the `create_token` response.
        status: u16,
        /// Body excerpt.
        body: String,
    },

    /// The `return_loan` request did not report success.
    #[error("returning {book_id} failed (HTTP {status}): {body}")]
    ReturnFailed {
        /// Book identifier.
        book_id: String,
        /// Status code of the `return_loan` response.
        status: u16,
        /// Body excerpt.
        body: String,
    },

    /// The requested transition is not allowed from the current state.
    #[error("cannot {action} a loan in state {from}")]
    InvalidTransition {
        /// State the loan was in.
        from: LoanState,
        /// Attempted operation.
        action: &'static str,
    },

    /// A loan request never got a response.
    #[error("loan request failed: {0}")]
    Session(#[from] SessionError),
}
