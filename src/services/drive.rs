use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use std::time::Duration;

/// Drive caps `pageSize` at 100 for file listings.
const MAX_PAGE_SIZE: usize = 100;
const LIST_FIELDS: &str = "nextPageToken, files(id, name, mimeType)";

/// An image file discovered in a Drive folder.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
}

/// Enumerates and fetches image files from a remote folder.
#[async_trait]
pub trait FolderSource: Send + Sync {
    /// List up to `max_images` image files. An empty folder is not an error.
    async fn list_images(
        &self,
        folder_id: &str,
        max_images: usize,
    ) -> Result<Vec<DriveFile>, DriveError>;

    async fn download(&self, file: &DriveFile) -> Result<Vec<u8>, DriveError>;
}

/// Client for the Google Drive v3 REST API using an API key.
///
/// Only folders shared as "anyone with the link" are readable this way.
pub struct DriveClient {
    http: Client,
    api_base: String,
    api_key: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileListResponse {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

impl DriveClient {
    pub fn new(api_base: &str, api_key: &str, timeout: Duration) -> Result<Self, DriveError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(DriveError::Http)?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl FolderSource for DriveClient {
    async fn list_images(
        &self,
        folder_id: &str,
        max_images: usize,
    ) -> Result<Vec<DriveFile>, DriveError> {
        let url = format!("{}/drive/v3/files", self.api_base);
        let query = format!(
            "'{}' in parents and mimeType contains 'image/' and trashed = false",
            folder_id
        );

        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        while files.len() < max_images {
            let page_size = (max_images - files.len()).min(MAX_PAGE_SIZE).to_string();
            let mut request = self.http.get(&url).query(&[
                ("q", query.as_str()),
                ("pageSize", page_size.as_str()),
                ("fields", LIST_FIELDS),
                ("key", self.api_key.as_str()),
            ]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = ensure_success(request.send().await?).await?;
            let page: FileListResponse = response.json().await?;

            tracing::debug!(
                folder_id = %folder_id,
                page_files = page.files.len(),
                "Fetched Drive listing page"
            );

            files.extend(page.files);
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        files.truncate(max_images);
        Ok(files)
    }

    async fn download(&self, file: &DriveFile) -> Result<Vec<u8>, DriveError> {
        let url = format!("{}/drive/v3/files/{}", self.api_base, file.id);
        let response = self
            .http
            .get(&url)
            .query(&[("alt", "media"), ("key", self.api_key.as_str())])
            .send()
            .await?;

        let bytes = ensure_success(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

async fn ensure_success(response: Response) -> Result<Response, DriveError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    Err(DriveError::Status {
        status: status.as_u16(),
        message,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error("Drive request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Drive returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
}
