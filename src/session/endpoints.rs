//! Fixed archive.org endpoints, relative to an overridable base URL.

use super::constants::DEFAULT_BASE_URL;

/// URLs of the login, loan and details endpoints.
///
/// The base defaults to `https://archive.org`; tests point it at a mock server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl Endpoints {
    /// Creates endpoints rooted at `base` (trailing slashes are ignored).
    #[must_use]
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    /// Account login form.
    #[must_use]
    pub fn login(&self) -> String {
        format!("{}/account/login", self.base)
    }

    /// Loan lifecycle endpoint (`browse_book`, `create_token`, `return_loan`).
    #[must_use]
    pub fn loan(&self) -> String {
        format!("{}/services/loans/loan/", self.base)
    }

    /// Search-inside endpoint that accepts `grant_access`.
    #[must_use]
    pub fn search_inside(&self) -> String {
        format!("{}/services/loans/loan/searchInside.php", self.base)
    }

    /// Prefix every accepted book URL must start with.
    #[must_use]
    pub fn details_prefix(&self) -> String {
        format!("{}/details/", self.base)
    }

    /// Canonical details page of a book.
    #[must_use]
    pub fn details(&self, book_id: &str) -> String {
        format!("{}{book_id}", self.details_prefix())
    }
}
