//! Page link extraction from a book's details page.
//!
//! The details page embeds the URL of the book viewer's JSON manifest as a
//! `"url":"..."` marker. The manifest carries the title, the page image links
//! (as a list of lists, one inner list per spread) and the book metadata.

mod error;
mod metadata;

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, instrument};
use url::Url;

use crate::session::{Endpoints, HttpSession};

pub use error::{ExtractionError, MIN_PAGE_LINKS};
pub use metadata::{Metadata, UnsupportedMetadata};

/// Longest title kept for directory and file names, in characters.
pub const MAX_TITLE_CHARS: usize = 150;

/// Characters not allowed in file names on common filesystems.
const FORBIDDEN_TITLE_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

#[allow(clippy::expect_used)]
static MANIFEST_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""url":"([^"]+)""#).expect("manifest marker regex is valid") // static pattern
});

/// Everything the downloader needs to know about a book.
#[derive(Debug, Clone, PartialEq)]
pub struct BookInfo {
    /// Sanitized title, safe as a file name. May be empty.
    pub title: String,
    /// Page image links in reading order.
    pub links: Vec<String>,
    /// Book metadata from the manifest.
    pub metadata: Metadata,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    data: ManifestData,
}

#[derive(Debug, Deserialize)]
struct ManifestData {
    #[serde(rename = "brOptions")]
    br_options: ReaderOptions,
    metadata: Metadata,
}

#[derive(Debug, Deserialize)]
struct ReaderOptions {
    #[serde(rename = "bookTitle")]
    book_title: String,
    data: Vec<Vec<PageEntry>>,
}

#[derive(Debug, Deserialize)]
struct PageEntry {
    uri: String,
}

/// Extracts the book identifier from a details URL.
///
/// `https://archive.org/details/<id>/page/n5` yields `<id>`. Query strings and
/// fragments are not part of the identifier.
///
/// # Errors
///
/// - [`ExtractionError::InvalidUrl`] when the URL lacks the details prefix
/// - [`ExtractionError::MissingIdentifier`] when nothing follows the prefix
pub fn book_id_from_url(url: &str, endpoints: &Endpoints) -> Result<String, ExtractionError> {
    let prefix = endpoints.details_prefix();
    let Some(rest) = url.trim().strip_prefix(prefix.as_str()) else {
        return Err(ExtractionError::InvalidUrl {
            url: url.to_string(),
            expected_prefix: prefix,
        });
    };

    let path = rest.split(['?', '#']).next().unwrap_or_default();
    path.split('/')
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ExtractionError::MissingIdentifier {
            url: url.to_string(),
        })
}

/// Turns a raw book title into a file-name-safe one.
///
/// Trims, replaces spaces with `_`, drops `<>:"/\|?*` and keeps at most
/// [`MAX_TITLE_CHARS`] characters.
#[must_use]
pub fn sanitize_title(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| !FORBIDDEN_TITLE_CHARS.contains(c))
        .map(|c| if c == ' ' { '_' } else { c })
        .take(MAX_TITLE_CHARS)
        .collect()
}

/// Finds the viewer-manifest URL embedded in a details page, unescaped.
#[must_use]
pub fn find_manifest_url(html: &str) -> Option<String> {
    let captures = MANIFEST_MARKER.captures(html)?;
    let raw = captures.get(1)?.as_str();
    Some(raw.replace("\\u0026", "&").replace("\\/", "/"))
}

/// Parses a viewer manifest into a [`BookInfo`].
///
/// # Errors
///
/// - [`ExtractionError::Manifest`] when the JSON does not have the expected shape
/// - [`ExtractionError::TooFewPages`] when fewer than [`MIN_PAGE_LINKS`] links are listed
pub fn parse_manifest(manifest_url: &str, body: &[u8]) -> Result<BookInfo, ExtractionError> {
    let manifest: Manifest = serde_json::from_slice(body)
        .map_err(|e| ExtractionError::manifest(manifest_url, e.to_string()))?;
    let ManifestData {
        br_options,
        metadata,
    } = manifest.data;

    let links: Vec<String> = br_options
        .data
        .into_iter()
        .flatten()
        .map(|page| page.uri)
        .collect();
    if links.len() < MIN_PAGE_LINKS {
        return Err(ExtractionError::TooFewPages { found: links.len() });
    }

    Ok(BookInfo {
        title: sanitize_title(&br_options.book_title),
        links,
        metadata,
    })
}

/// Fetches the details page, follows its manifest marker and returns the
/// title, ordered page links and metadata.
///
/// # Errors
///
/// Any [`ExtractionError`]; all are fatal for the run.
#[instrument(skip(session))]
pub async fn fetch_book_info(
    session: &dyn HttpSession,
    page_url: &str,
) -> Result<BookInfo, ExtractionError> {
    let page = session.get(page_url, &[]).await?;
    if page.status() != 200 {
        return Err(ExtractionError::HttpStatus {
            url: page_url.to_string(),
            status: page.status(),
        });
    }

    let raw = find_manifest_url(&page.text()).ok_or_else(|| ExtractionError::MarkerNotFound {
        url: page_url.to_string(),
    })?;
    let manifest_url = resolve_manifest_url(page_url, &raw)?;
    debug!(%manifest_url, "found viewer manifest");

    let manifest = session.get(manifest_url.as_str(), &[]).await?;
    if manifest.status() != 200 {
        return Err(ExtractionError::HttpStatus {
            url: manifest_url.to_string(),
            status: manifest.status(),
        });
    }

    let info = parse_manifest(manifest_url.as_str(), manifest.body())?;
    info!(title = %info.title, pages = info.links.len(), "book manifest parsed");
    Ok(info)
}

/// Resolves the marker value against the details page; protocol-relative
/// values take the page's scheme.
fn resolve_manifest_url(page_url: &str, raw: &str) -> Result<Url, ExtractionError> {
    let base = Url::parse(page_url)
        .map_err(|e| ExtractionError::manifest(page_url, format!("invalid page URL: {e}")))?;
    base.join(raw)
        .map_err(|e| ExtractionError::manifest(raw, format!("invalid manifest URL: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::fake_session::{FakeSession, ok, status};

    fn manifest_json(pages: usize) -> String {
        let entries: Vec<String> = (0..pages)
            .map(|i| format!(r#"[{{"uri":"https://ia.test/page{i}.jpg?id=x"}}]"#))
            .collect();
        format!(
            r#"{{"data":{{"brOptions":{{"bookTitle":"  A Tale: of <Two> Cities ","data":[{}]}},"metadata":{{"creator":"Dickens","date":"1859"}}}}}}"#,
            entries.join(",")
        )
    }

    #[test]
    fn test_book_id_plain() {
        let id = book_id_from_url(
            "https://archive.org/details/mybook",
            &Endpoints::default(),
        )
        .unwrap();
        assert_eq!(id, "mybook");
    }

    #[test]
    fn test_book_id_with_trailing_path() {
        let id = book_id_from_url(
            "https://archive.org/details/mybook/page/n5/mode/2up",
            &Endpoints::default(),
        )
        .unwrap();
        assert_eq!(id, "mybook");
    }

    #[test]
    fn test_book_id_ignores_query() {
        let id = book_id_from_url(
            "https://archive.org/details/mybook?q=whales",
            &Endpoints::default(),
        )
        .unwrap();
        assert_eq!(id, "mybook");
    }

    #[test]
    fn test_book_id_rejects_other_sites() {
        let result = book_id_from_url("https://example.com/details/x", &Endpoints::default());
        assert!(matches!(result, Err(ExtractionError::InvalidUrl { .. })));
    }

    #[test]
    fn test_book_id_rejects_http_scheme() {
        let result = book_id_from_url("http://archive.org/details/x", &Endpoints::default());
        assert!(matches!(result, Err(ExtractionError::InvalidUrl { .. })));
    }

    #[test]
    fn test_book_id_missing_identifier() {
        let result = book_id_from_url("https://archive.org/details/", &Endpoints::default());
        assert!(matches!(
            result,
            Err(ExtractionError::MissingIdentifier { .. })
        ));
    }

    #[test]
    fn test_book_id_custom_base() {
        let endpoints = Endpoints::new("http://127.0.0.1:9999");
        let id = book_id_from_url("http://127.0.0.1:9999/details/abc", &endpoints).unwrap();
        assert_eq!(id, "abc");
    }

    #[test]
    fn test_sanitize_title() {
        assert_eq!(
            sanitize_title("  A Tale: of <Two> Cities "),
            "A_Tale_of_Two_Cities"
        );
        assert_eq!(sanitize_title("a/b\\c|d?e*f\"g"), "abcdefg");
    }

    #[test]
    fn test_sanitize_title_truncates() {
        let long = "x".repeat(400);
        assert_eq!(sanitize_title(&long).chars().count(), MAX_TITLE_CHARS);
    }

    #[test]
    fn test_sanitize_title_truncates_by_chars_not_bytes() {
        let long = "é".repeat(200);
        let title = sanitize_title(&long);
        assert_eq!(title.chars().count(), MAX_TITLE_CHARS);
    }

    #[test]
    fn test_find_manifest_url_unescapes() {
        let html = r#"<script>var x = {"url":"\/\/ia800.test\/BookReader\/BookReaderJSIA.php?id=mybook&itemPath=\/x","other":"y"};</script>"#;
        assert_eq!(
            find_manifest_url(html).as_deref(),
            Some("//ia800.test/BookReader/BookReaderJSIA.php?id=mybook&itemPath=/x")
        );
    }

    #[test]
    fn test_find_manifest_url_takes_first_marker() {
        let html = r#"{"url":"/first"} {"url":"/second"}"#;
        assert_eq!(find_manifest_url(html).as_deref(), Some("/first"));
    }

    #[test]
    fn test_find_manifest_url_absent() {
        assert_eq!(find_manifest_url("<html>nothing here</html>"), None);
    }

    #[test]
    fn test_parse_manifest_flattens_in_order() {
        let body = r#"{"data":{"brOptions":{"bookTitle":"T","data":[[{"uri":"a"},{"uri":"b"}],[{"uri":"c"}]]},"metadata":{}}}"#;
        let info = parse_manifest("m", body.as_bytes()).unwrap();
        assert_eq!(info.links, vec!["a", "b", "c"]);
        assert_eq!(info.title, "T");
    }

    #[test]
    fn test_parse_manifest_too_few_pages() {
        let body = r#"{"data":{"brOptions":{"bookTitle":"T","data":[[{"uri":"a"}]]},"metadata":{}}}"#;
        let result = parse_manifest("m", body.as_bytes());
        assert!(matches!(result, Err(ExtractionError::TooFewPages { found: 1 })));
    }

    #[test]
    fn test_parse_manifest_wrong_shape() {
        let result = parse_manifest("m", br#"{"data":{"pages":[]}}"#);
        assert!(matches!(result, Err(ExtractionError::Manifest { .. })));

        let result = parse_manifest("m", b"<html>");
        assert!(matches!(result, Err(ExtractionError::Manifest { .. })));
    }

    #[test]
    fn test_resolve_protocol_relative_takes_page_scheme() {
        let url = resolve_manifest_url("http://127.0.0.1:8080/details/x", "//cdn.test/m.php?id=x")
            .unwrap();
        assert_eq!(url.as_str(), "http://cdn.test/m.php?id=x");
    }

    #[tokio::test]
    async fn test_fetch_book_info_follows_marker() {
        let manifest = manifest_json(3);
        let session = FakeSession::new(move |request| {
            if request.url.contains("/details/") {
                ok(r#"<script>{"url":"\/\/ia.test\/manifest.php?id=x&s=1"}</script>"#)
            } else {
                ok(&manifest)
            }
        });

        let info = fetch_book_info(&session, "https://archive.test/details/x")
            .await
            .unwrap();

        assert_eq!(info.title, "A_Tale_of_Two_Cities");
        assert_eq!(info.links.len(), 3);
        assert_eq!(info.links[0], "https://ia.test/page0.jpg?id=x");
        assert_eq!(info.metadata.text("creator").unwrap().as_deref(), Some("Dickens"));

        let urls: Vec<String> = session.requests().into_iter().map(|r| r.url).collect();
        assert_eq!(urls[1], "https://ia.test/manifest.php?id=x&s=1");
    }

    #[tokio::test]
    async fn test_fetch_book_info_non_200_page() {
        let session = FakeSession::new(|_| status(404, "missing"));
        let result = fetch_book_info(&session, "https://archive.test/details/x").await;
        assert!(matches!(
            result,
            Err(ExtractionError::HttpStatus { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_book_info_missing_marker() {
        let session = FakeSession::new(|_| ok("<html>no reader here</html>"));
        let result = fetch_book_info(&session, "https://archive.test/details/x").await;
        assert!(matches!(result, Err(ExtractionError::MarkerNotFound { .. })));
    }
}
