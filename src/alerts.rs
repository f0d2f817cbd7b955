use chrono::{DateTime, Local};

use crate::channel::{ChannelEvent, TranscriptionAlert};
use crate::error::CoordinatorError;
use crate::upload::PiiMatches;

pub const CONNECTION_FAILED_MESSAGE: &str =
    "Failed to connect to the server. Please refresh the page.";

/// A transcription alert as recorded in the session log.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedAlert {
    pub alert: TranscriptionAlert,
    pub received_at: DateTime<Local>,
}

/// Side effects the coordinator must apply after folding one event.
#[derive(Debug, Default, PartialEq)]
pub struct FoldEffect {
    pub error: Option<CoordinatorError>,
    pub audible: bool,
}

/// Folds pushed channel events into alert state. Every event is recorded;
/// nothing is deduplicated.
#[derive(Debug, Default)]
pub struct AlertAggregator {
    document_notice: Option<String>,
    transcription_log: Vec<LoggedAlert>,
    transcript: Vec<String>,
    remote_status: Option<String>,
}

pub fn document_notice(detected_pii: &PiiMatches) -> String {
    let rendered =
        serde_json::to_string(detected_pii).unwrap_or_else(|_| format!("{detected_pii:?}"));
    format!("PII Detected: {rendered}")
}

impl AlertAggregator {
    /// Fold one event. `session_active` is the flag at the time of arrival.
    pub fn on_event(&mut self, event: ChannelEvent, session_active: bool) -> FoldEffect {
        match event {
            ChannelEvent::DocumentAlert { detected_pii } => {
                self.document_notice = if detected_pii.is_empty() {
                    None
                } else {
                    Some(document_notice(&detected_pii))
                };
                FoldEffect::default()
            }
            ChannelEvent::TranscriptionAlert(alert) => {
                log::info!("Transcription PII: {} ({})", alert.pii_type, alert.value);
                self.transcription_log.push(LoggedAlert {
                    alert,
                    received_at: Local::now(),
                });
                FoldEffect {
                    error: None,
                    audible: session_active,
                }
            }
            ChannelEvent::TranscriptionUpdate { text } => {
                self.transcript.push(text);
                FoldEffect::default()
            }
            ChannelEvent::TranscriptionStatus { status } => {
                self.remote_status = Some(status);
                FoldEffect::default()
            }
            ChannelEvent::ServerError { message } => {
                log::warn!("Service error event: {message}");
                FoldEffect {
                    error: Some(CoordinatorError::TransportError(message)),
                    audible: false,
                }
            }
            ChannelEvent::ConnectionError { reason } => {
                log::error!("Event channel failed: {reason}");
                FoldEffect {
                    error: Some(CoordinatorError::ConnectionFailure(
                        CONNECTION_FAILED_MESSAGE.into(),
                    )),
                    audible: false,
                }
            }
        }
    }

    /// Reset per-session state when a new live session starts.
    pub fn start_session(&mut self) {
        self.transcription_log.clear();
        self.transcript.clear();
        self.remote_status = None;
    }

    pub fn clear_document_notice(&mut self) {
        self.document_notice = None;
    }

    pub fn document_alert(&self) -> Option<&str> {
        self.document_notice.as_deref()
    }

    pub fn transcription_log(&self) -> &[LoggedAlert] {
        &self.transcription_log
    }

    pub fn transcript(&self) -> String {
        self.transcript.join(" ")
    }

    pub fn remote_status(&self) -> Option<&str> {
        self.remote_status.as_deref()
    }
}
