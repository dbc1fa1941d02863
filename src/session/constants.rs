//! Constants for the session layer (timeouts, site defaults).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (2 minutes; page scans are a few MB at most).
pub const READ_TIMEOUT_SECS: u64 = 120;

/// Site the downloader talks to.
pub const DEFAULT_BASE_URL: &str = "https://archive.org";

/// Longest response body excerpt kept in error messages.
pub const BODY_EXCERPT_CHARS: usize = 200;
