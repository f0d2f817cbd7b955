use thiserror::Error;

/// User-visible error taxonomy. Every variant is recovered into a snapshot
/// field; none of them stops the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    /// Local validation failed before any request went out.
    #[error("{0}")]
    InvalidInput(String),

    /// Upload or start-session call failed.
    #[error("{0}")]
    RequestFailure(String),

    /// The event channel gave up reconnecting.
    #[error("{0}")]
    ConnectionFailure(String),

    /// Error event on an otherwise open channel.
    #[error("{0}")]
    TransportError(String),
}

impl CoordinatorError {
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Raised by a user request, so superseded by the next submission.
    /// Channel errors stay until the channel reports something newer.
    pub fn is_request_scoped(&self) -> bool {
        matches!(
            self,
            CoordinatorError::InvalidInput(_) | CoordinatorError::RequestFailure(_)
        )
    }
}

/// Failures of a call against the remote redaction service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Failures of the persistent event link.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("event source returned status {0}")]
    Status(u16),

    #[error("stream interrupted: {0}")]
    Stream(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinator_error_displays_its_message_verbatim() {
        let err = CoordinatorError::RequestFailure("Error uploading file. Please try again.".into());
        assert_eq!(err.message(), "Error uploading file. Please try again.");
    }

    #[test]
    fn only_request_errors_are_request_scoped() {
        assert!(CoordinatorError::InvalidInput("x".into()).is_request_scoped());
        assert!(CoordinatorError::RequestFailure("x".into()).is_request_scoped());
        assert!(!CoordinatorError::ConnectionFailure("x".into()).is_request_scoped());
        assert!(!CoordinatorError::TransportError("x".into()).is_request_scoped());
    }

    #[test]
    fn channel_error_mentions_status_code() {
        assert_eq!(
            ChannelError::Status(503).to_string(),
            "event source returned status 503"
        );
    }
}
