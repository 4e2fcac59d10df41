use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// --- Audit request ---

/// Filename overrides for `POST /api/audit`. Unset fields keep the
/// backend's bundled datasets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFiles {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sales: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backlog: Option<String>,
}

impl AuditFiles {
    pub fn is_empty(&self) -> bool {
        self.sales.is_none() && self.context.is_none() && self.backlog.is_none()
    }
}

// --- Catalog ---

/// Response of `GET /api/signals`. Records stay raw so the caller can
/// validate them one at a time.
#[derive(Debug, Clone, Deserialize)]
pub struct SignalsResponse {
    pub status: String,
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub signals: Vec<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
}

// --- Upload ---

/// Local files sent as the `sales`, `context` and `backlog` multipart parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFiles {
    pub sales: PathBuf,
    pub context: PathBuf,
    pub backlog: PathBuf,
}

/// Response of `POST /api/upload`. The backend answers 200 with either a
/// `status`/`filenames` pair or a bare `error`.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub filenames: Option<AuditFiles>,
    #[serde(default)]
    pub error: Option<String>,
}
