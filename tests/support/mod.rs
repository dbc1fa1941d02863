//! Shared fixtures for integration tests: a mock archive.org site and JPEG pages.

#![allow(dead_code)]

pub mod socket_guard;

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};
use wiremock::matchers::{body_string_contains, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const BOOK_ID: &str = "mybook";
pub const EMAIL: &str = "me@example.com";
pub const PASSWORD: &str = "secret";
pub const SESSION_COOKIE: &str = "logged-in-user=me%40example.com";

/// Encodes a small solid RGB JPEG.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let pixels = vec![128_u8; (width * height * 3) as usize];
    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new(&mut out)
        .write_image(&pixels, width, height, ExtendedColorType::Rgb8)
        .expect("encode jpeg");
    out.into_inner()
}

/// Details URL of the fixture book on `server`.
pub fn details_url(server: &MockServer) -> String {
    format!("{}/details/{BOOK_ID}", server.uri())
}

/// Page links served by [`mount_book`].
pub fn page_links(server: &MockServer, pages: usize) -> Vec<String> {
    (0..pages)
        .map(|i| format!("{}/pages/{i}.jpg?id={BOOK_ID}", server.uri()))
        .collect()
}

/// Mounts login; the POST sets the session cookie.
pub async fn mount_login(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/account/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<form></form>"))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/account/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", format!("{SESSION_COOKIE}; Path=/").as_str())
                .set_body_string(r#"{"status":"ok","message":"Successful login"}"#),
        )
        .mount(server)
        .await;
}

/// Mounts the three borrow steps and the return endpoint.
pub async fn mount_loan(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/services/loans/loan/searchInside.php"))
        .and(body_string_contains("action=grant_access"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"success":true}"#))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/services/loans/loan/"))
        .and(body_string_contains("action=browse_book"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"success":true}"#))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/services/loans/loan/"))
        .and(body_string_contains("action=create_token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"{"success":true,"token":"1700000000-abc"}"#),
        )
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/services/loans/loan/"))
        .and(body_string_contains("action=return_loan"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"success":true}"#))
        .mount(server)
        .await;
}

/// Mounts the details page, the manifest and `pages` JPEG pages.
pub async fn mount_book(server: &MockServer, title: &str, pages: usize) {
    Mock::given(method("GET"))
        .and(path(format!("/details/{BOOK_ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"<html><script>var br = {{"url":"\/BookReaderJSIA.php?id={BOOK_ID}&itemPath=\/1\/items"}};</script></html>"#
        )))
        .mount(server)
        .await;

    let entries: Vec<String> = page_links(server, pages)
        .iter()
        .map(|link| format!(r#"[{{"uri":"{link}"}}]"#))
        .collect();
    let manifest = format!(
        r#"{{"data":{{"brOptions":{{"bookTitle":"{title}","data":[{}]}},"metadata":{{"identifier":"{BOOK_ID}","title":"{title}","creator":"Jane Author","date":"1923-05-01","subject":["history","maps"]}}}}}}"#,
        entries.join(",")
    );
    Mock::given(method("GET"))
        .and(path("/BookReaderJSIA.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string(manifest))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/pages/\d+\.jpg$"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/jpeg")
                .set_body_bytes(jpeg_bytes(16, 24)),
        )
        .mount(server)
        .await;
}

/// Mounts a complete site for one book.
pub async fn mount_site(server: &MockServer, title: &str, pages: usize) {
    mount_login(server).await;
    mount_loan(server).await;
    mount_book(server, title, pages).await;
}
