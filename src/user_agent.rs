//! Shared User-Agent string for every request the session sends.
//!
//! The image servers reject obvious bot traffic, so the session presents itself
//! as a desktop browser for the whole run.

/// Browser User-Agent sent with login, loan, manifest and page requests.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Headers a browser sends when loading a page scan inside the book reader.
pub const PAGE_IMAGE_HEADERS: &[(&str, &str)] = &[
    ("Referer", "https://archive.org/"),
    ("Accept", "image/avif,image/webp,image/apng,image/*,*/*;q=0.8"),
    ("Sec-Fetch-Site", "same-site"),
    ("Sec-Fetch-Mode", "no-cors"),
    ("Sec-Fetch-Dest", "image"),
];
