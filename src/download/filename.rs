//! Page file naming and collision-free path resolution.
//!
//! Page files are named by index, zero-padded to the digit width of the page
//! count, so lexical order equals reading order no matter which worker
//! finishes first.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};

/// Upper bound on numeric suffixes tried before falling back to a timestamp.
const MAX_SUFFIX: usize = 10_000;

/// File name of page `index` in a book of `total` pages.
///
/// With 120 pages, page 7 is `007.jpg`; with 3 pages, page 2 is `2.jpg`.
#[must_use]
pub fn page_file_name(total: usize, index: usize) -> String {
    let width = total.to_string().len();
    format!("{index:0width$}.jpg")
}

/// Appends the image quality parameters to a page link.
///
/// `scale` is the downscale factor; 0 requests full resolution.
#[must_use]
pub fn quality_link(link: &str, scale: u8) -> String {
    let separator = if link.contains('?') { '&' } else { '?' };
    format!("{link}{separator}rotate=0&scale={scale}")
}

/// Creates the first free directory among `base`, `base(1)`, `base(2)`, ...
/// inside `parent`.
///
/// The directory is claimed by creating it, so an existing one is never reused.
///
/// # Errors
///
/// Returns the IO error of `parent` or of a candidate that fails for a reason
/// other than already existing.
pub async fn create_unique_dir(parent: &Path, base: &str) -> io::Result<PathBuf> {
    tokio::fs::create_dir_all(parent).await?;
    for candidate in candidates(parent, base, "") {
        match tokio::fs::create_dir(&candidate).await {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e),
        }
    }
    Err(no_free_name(parent, base))
}

/// Creates the first free file among `stem.ext`, `stem(1).ext`, `stem(2).ext`, ...
/// and returns it opened for writing.
///
/// # Errors
///
/// Returns the IO error of a candidate that fails for a reason other than
/// already existing.
pub async fn create_unique_file(dir: &Path, stem: &str, ext: &str) -> io::Result<(PathBuf, File)> {
    let ext = format!(".{ext}");
    for candidate in candidates(dir, stem, &ext) {
        match OpenOptions::new().write(true).create_new(true).open(&candidate).await {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e),
        }
    }
    Err(no_free_name(dir, stem))
}

fn candidates<'a>(dir: &'a Path, stem: &'a str, ext: &'a str) -> impl Iterator<Item = PathBuf> + Send + 'a {
    let plain = std::iter::once(dir.join(format!("{stem}{ext}")));
    let numbered = (1..MAX_SUFFIX).map(move |i| dir.join(format!("{stem}({i}){ext}")));
    let stamped = std::iter::once_with(move || {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        dir.join(format!("{stem}({timestamp}){ext}"))
    });
    plain.chain(numbered).chain(stamped)
}

fn no_free_name(dir: &Path, stem: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free name for '{stem}' in {}", dir.display()),
    )
}
