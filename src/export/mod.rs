//! Output artifacts of a run: the PDF, `metadata.json` and the optional
//! Google Drive upload.

mod cloud;
mod error;
mod metadata;
mod pdf;

use std::path::{Path, PathBuf};

use crate::extract::Metadata;

pub use cloud::{DRIVE_API_BASE, DRIVE_FOLDER_NAME, GoogleDriveUploader, Uploader};
pub use error::{AssemblyError, UploadError};
pub use metadata::PdfMetadata;
pub use pdf::{Assembler, PdfAssembler, save_artifact};

/// File name of the metadata dump inside the page directory.
pub const METADATA_FILE_NAME: &str = "metadata.json";

/// Writes the book metadata as `metadata.json` into `dir`.
///
/// # Errors
///
/// Returns the IO error if the file cannot be written.
pub async fn write_metadata_json(dir: &Path, metadata: &Metadata) -> std::io::Result<PathBuf> {
    let path = dir.join(METADATA_FILE_NAME);
    let bytes = serde_json::to_vec(metadata)?;
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}
