// Trait abstraction over the analysis backend.
//
// AuditSource covers the three calls the dashboard makes. AuditClient is the
// real implementation; tests substitute a scripted source, so the dashboard
// loop runs with no network.

use async_trait::async_trait;
use serde_json::Value;

use audit_client::{AuditClient, AuditFiles, ByteStream, Result, UploadFiles};

#[async_trait]
pub trait AuditSource: Send + Sync {
    /// Start an audit run; the NDJSON body arrives as raw chunks.
    async fn start_audit(&self, files: &AuditFiles) -> Result<ByteStream>;

    /// Raw records of the stored catalog.
    async fn fetch_catalog(&self) -> Result<Vec<Value>>;

    /// Upload the three input files; returns the names for the next audit.
    async fn upload(&self, files: &UploadFiles) -> Result<AuditFiles>;
}

#[async_trait]
impl AuditSource for AuditClient {
    async fn start_audit(&self, files: &AuditFiles) -> Result<ByteStream> {
        AuditClient::start_audit(self, files).await
    }

    async fn fetch_catalog(&self) -> Result<Vec<Value>> {
        Ok(self.fetch_signals().await?.signals)
    }

    async fn upload(&self, files: &UploadFiles) -> Result<AuditFiles> {
        AuditClient::upload(self, files).await
    }
}
