//! Upload of the finished PDF to Google Drive.
//!
//! Talks to the Drive v3 REST API with an OAuth access token:
//! find or create the `archive.org` folder, upload the file, move it into the
//! folder under its local file name, then share it with anyone holding the
//! link.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder};
use serde_json::{Value, json};
use tracing::{debug, info, instrument};
use url::Url;

use super::UploadError;
use crate::session::SessionTimeouts;
use crate::session::constants::BODY_EXCERPT_CHARS;

/// Public Google API host.
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com";

/// Drive folder uploads are placed in.
pub const DRIVE_FOLDER_NAME: &str = "archive.org";

const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Publishes a local file and returns a shareable link to it.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Uploads `path`.
    ///
    /// # Errors
    ///
    /// Any [`UploadError`]; callers report it and fall back to the local path.
    async fn upload(&self, path: &Path) -> Result<String, UploadError>;
}

/// [`Uploader`] for Google Drive.
#[derive(Debug, Clone)]
pub struct GoogleDriveUploader {
    client: Client,
    access_token: String,
    api_base: String,
}

impl GoogleDriveUploader {
    /// Creates an uploader for the public Drive API.
    ///
    /// # Errors
    ///
    /// - [`UploadError::MissingToken`] when `access_token` is blank
    /// - [`UploadError::ClientBuild`] if the HTTP client cannot be built
    pub fn new(access_token: impl Into<String>, timeouts: SessionTimeouts) -> Result<Self, UploadError> {
        let access_token = access_token.into();
        if access_token.trim().is_empty() {
            return Err(UploadError::MissingToken);
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .timeout(Duration::from_secs(timeouts.read_secs))
            .build()
            .map_err(|e| UploadError::ClientBuild {
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            access_token,
            api_base: DRIVE_API_BASE.to_string(),
        })
    }

    /// Points the uploader at another API host.
    #[must_use]
    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, UploadError> {
        let raw = format!("{}{path}", self.api_base);
        let mut url = Url::parse(&raw).map_err(|_| UploadError::InvalidUrl { url: raw })?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter().copied());
        }
        Ok(url)
    }

    async fn call(&self, step: &'static str, request: RequestBuilder) -> Result<Value, UploadError> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|source| UploadError::Network { step, source })?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|source| UploadError::Network { step, source })?;

        if !(200..300).contains(&status) {
            return Err(UploadError::Api {
                step,
                status,
                body: String::from_utf8_lossy(&body)
                    .chars()
                    .take(BODY_EXCERPT_CHARS)
                    .collect(),
            });
        }
        debug!(step, status, "drive call succeeded");
        Ok(serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    async fn find_or_create_folder(&self) -> Result<String, UploadError> {
        let query = format!(
            "name = '{DRIVE_FOLDER_NAME}' and mimeType = '{FOLDER_MIME_TYPE}' and trashed = false"
        );
        let url = self.url(
            "/drive/v3/files",
            &[("q", query.as_str()), ("fields", "files(id,name)"), ("spaces", "drive")],
        )?;
        let found = self.call("folder lookup", self.client.get(url)).await?;
        if let Some(id) = found
            .get("files")
            .and_then(Value::as_array)
            .and_then(|files| files.first())
            .and_then(|file| file.get("id"))
            .and_then(Value::as_str)
        {
            return Ok(id.to_string());
        }

        let url = self.url("/drive/v3/files", &[("fields", "id")])?;
        let body = json!({ "name": DRIVE_FOLDER_NAME, "mimeType": FOLDER_MIME_TYPE });
        let created = self
            .call("folder creation", self.client.post(url).json(&body))
            .await?;
        info!(folder = DRIVE_FOLDER_NAME, "created Drive folder");
        string_field(&created, "folder creation", "id")
    }
}

#[async_trait]
impl Uploader for GoogleDriveUploader {
    #[instrument(skip(self), fields(path = %path.display()))]
    async fn upload(&self, path: &Path) -> Result<String, UploadError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| UploadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "book.pdf".to_string());

        let folder_id = self.find_or_create_folder().await?;

        let url = self.url(
            "/upload/drive/v3/files",
            &[("uploadType", "media"), ("fields", "id")],
        )?;
        let uploaded = self
            .call(
                "upload",
                self.client
                    .post(url)
                    .header(CONTENT_TYPE, "application/pdf")
                    .body(bytes),
            )
            .await?;
        let file_id = string_field(&uploaded, "upload", "id")?;

        let url = self.url(
            &format!("/drive/v3/files/{file_id}"),
            &[
                ("addParents", folder_id.as_str()),
                ("removeParents", "root"),
                ("fields", "id"),
            ],
        )?;
        self.call(
            "move",
            self.client.patch(url).json(&json!({ "name": file_name })),
        )
        .await?;

        let url = self.url(&format!("/drive/v3/files/{file_id}/permissions"), &[])?;
        self.call(
            "share",
            self.client
                .post(url)
                .json(&json!({ "role": "reader", "type": "anyone" })),
        )
        .await?;

        let link = format!("https://drive.google.com/file/d/{file_id}/view");
        info!(%link, "uploaded to Google Drive");
        Ok(link)
    }
}

fn string_field(value: &Value, step: &'static str, field: &'static str) -> Result<String, UploadError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(UploadError::MissingField { step, field })
}
