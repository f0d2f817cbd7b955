use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

use crate::config::Config;
use crate::error::ServiceError;
use crate::upload::{Document, RedactionLevel, UploadResult};

/// Acknowledgement of a start-transcription request. Its content has no
/// effect on the session flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartAck {
    pub status: u16,
    pub body: String,
}

/// Request/response calls against the redaction service.
#[async_trait]
pub trait RemoteService: Send + Sync {
    async fn upload(
        &self,
        document: Document,
        level: RedactionLevel,
    ) -> Result<UploadResult, ServiceError>;

    /// Ask the service to begin streaming transcription. Only a transport
    /// failure (no response at all) is an error.
    async fn start_transcription(&self) -> Result<StartAck, ServiceError>;
}

pub struct HttpService {
    client: reqwest::Client,
    upload_url: String,
    start_url: String,
}

impl HttpService {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            upload_url: config.endpoint(&config.upload_path),
            start_url: config.endpoint(&config.live_transcription_path),
        }
    }
}

#[async_trait]
impl RemoteService for HttpService {
    async fn upload(
        &self,
        document: Document,
        level: RedactionLevel,
    ) -> Result<UploadResult, ServiceError> {
        let part = Part::bytes(document.bytes).file_name(document.filename);
        let form = Form::new()
            .part("file", part)
            .text("redaction_level", level.as_str());

        let resp = self
            .client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::Status { status, body });
        }

        Ok(resp.json().await?)
    }

    async fn start_transcription(&self) -> Result<StartAck, ServiceError> {
        let resp = self.client.get(&self.start_url).send().await?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            log::warn!("Start transcription answered {status}: {body}");
        }
        Ok(StartAck {
            status: status.as_u16(),
            body,
        })
    }
}
