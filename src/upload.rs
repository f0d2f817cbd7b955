use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::CoordinatorError;
use crate::service::RemoteService;

pub const NO_DOCUMENT_MESSAGE: &str = "Please select a file.";
pub const UPLOAD_FAILED_MESSAGE: &str = "Error uploading file. Please try again.";

/// PII category -> matched strings. Categories keep the order the service
/// sent them in.
pub type PiiMatches = IndexMap<String, Vec<String>>;

/// A file selected for upload. Owned by the caller until the request completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Document {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        Ok(Self { filename, bytes })
    }
}

/// Sensitivity tier sent as the `redaction_level` form field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedactionLevel {
    #[default]
    Basic,
    Intermediate,
    Critical,
}

impl RedactionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedactionLevel::Basic => "basic",
            RedactionLevel::Intermediate => "intermediate",
            RedactionLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for RedactionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RedactionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(RedactionLevel::Basic),
            "intermediate" => Ok(RedactionLevel::Intermediate),
            "critical" => Ok(RedactionLevel::Critical),
            other => Err(format!(
                "unknown redaction level '{other}' (expected basic, intermediate or critical)"
            )),
        }
    }
}

/// Successful upload response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    #[serde(rename = "text")]
    pub original_text: String,
    pub redacted_text: String,
    #[serde(default)]
    pub detected_pii: PiiMatches,
    #[serde(default)]
    pub redacted_file_url: Option<String>,
}

/// Issues document uploads. Does not queue or retry; the coordinator gates
/// submissions behind its busy flag.
#[derive(Clone)]
pub struct UploadRequestManager {
    service: Arc<dyn RemoteService>,
}

impl UploadRequestManager {
    pub fn new(service: Arc<dyn RemoteService>) -> Self {
        Self { service }
    }

    /// Precondition of every submission; checked before any network call.
    pub fn require_document(document: Option<Document>) -> Result<Document, CoordinatorError> {
        document.ok_or_else(|| CoordinatorError::InvalidInput(NO_DOCUMENT_MESSAGE.into()))
    }

    pub async fn submit(
        &self,
        document: Option<Document>,
        level: RedactionLevel,
    ) -> Result<UploadResult, CoordinatorError> {
        let document = Self::require_document(document)?;

        log::info!(
            "Uploading {} ({} bytes) at level {level}",
            document.filename,
            document.bytes.len()
        );

        match self.service.upload(document, level).await {
            Ok(result) => {
                log::info!(
                    "Upload complete: {} PII categories",
                    result.detected_pii.len()
                );
                Ok(result)
            }
            Err(e) => {
                log::error!("Upload failed: {e}");
                Err(CoordinatorError::RequestFailure(UPLOAD_FAILED_MESSAGE.into()))
            }
        }
    }
}
