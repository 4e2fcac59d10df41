pub mod error;
pub mod types;

pub use error::{AuditError, Result};
pub use types::{AuditFiles, SignalsResponse, UploadFiles, UploadResponse};

use std::path::Path;

use futures::stream::{BoxStream, StreamExt};
use reqwest::multipart::{Form, Part};

/// Raw response body of an audit run, chunk by chunk, in arrival order.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>>>;

pub struct AuditClient {
    client: reqwest::Client,
    base_url: String,
}

impl AuditClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Start an analysis run. Returns once response headers arrive; the body
    /// is handed back unread as a stream of NDJSON fragments.
    pub async fn start_audit(&self, files: &AuditFiles) -> Result<ByteStream> {
        let url = format!("{}/api/audit", self.base_url);
        tracing::info!(url = %url, overrides = !files.is_empty(), "Starting audit run");

        let resp = self.client.post(&url).json(files).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuditError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let chunks = resp
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(AuditError::from));
        Ok(chunks.boxed())
    }

    /// Fetch the full persisted catalog.
    pub async fn fetch_signals(&self) -> Result<SignalsResponse> {
        let url = format!("{}/api/signals", self.base_url);
        let resp = self.client.get(&url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuditError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let catalog: SignalsResponse = serde_json::from_str(&resp.text().await?)?;
        if catalog.status != "success" {
            return Err(AuditError::Backend(
                catalog
                    .message
                    .unwrap_or_else(|| format!("catalog status {}", catalog.status)),
            ));
        }

        tracing::debug!(count = catalog.signals.len(), "Fetched signal catalog");
        Ok(catalog)
    }

    /// Upload the three input datasets. The returned filenames are what a
    /// following `start_audit` call should reference.
    pub async fn upload(&self, files: &UploadFiles) -> Result<AuditFiles> {
        let url = format!("{}/api/upload", self.base_url);

        let form = Form::new()
            .part("sales", file_part(&files.sales).await?)
            .part("context", file_part(&files.context).await?)
            .part("backlog", file_part(&files.backlog).await?);

        let resp = self.client.post(&url).multipart(form).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuditError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let upload: UploadResponse = serde_json::from_str(&resp.text().await?)?;
        if let Some(message) = upload.error {
            return Err(AuditError::Backend(message));
        }

        let filenames = upload
            .filenames
            .ok_or_else(|| AuditError::Parse("upload response has no filenames".to_string()))?;
        tracing::info!(
            sales = ?filenames.sales,
            context = ?filenames.context,
            backlog = ?filenames.backlog,
            "Uploaded audit inputs"
        );
        Ok(filenames)
    }
}

async fn file_part(path: &Path) -> Result<Part> {
    let data = tokio::fs::read(path).await.map_err(|e| AuditError::File {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    Ok(Part::bytes(data).file_name(name))
}
