use std::sync::Arc;

use crate::error::CoordinatorError;
use crate::service::{RemoteService, StartAck};

pub const START_FAILED_MESSAGE: &str = "Error starting live transcription. Please try again.";

/// User-facing live transcription toggle.
///
/// `start` flips the flag before the request goes out and touches the
/// network; `stop` is local only. The flag follows user intent, not the
/// state of the event channel.
pub struct LiveSessionController {
    service: Arc<dyn RemoteService>,
    active: bool,
    generation: u64,
}

/// An in-flight start request, tagged with the session it belongs to.
pub struct SessionStart {
    pub generation: u64,
    service: Arc<dyn RemoteService>,
}

impl SessionStart {
    pub async fn send(self) -> Result<StartAck, CoordinatorError> {
        match self.service.start_transcription().await {
            Ok(ack) => {
                log::info!("Transcription start acknowledged ({})", ack.status);
                Ok(ack)
            }
            Err(e) => {
                log::error!("Start transcription failed: {e}");
                Err(CoordinatorError::RequestFailure(START_FAILED_MESSAGE.into()))
            }
        }
    }
}

impl LiveSessionController {
    pub fn new(service: Arc<dyn RemoteService>) -> Self {
        Self {
            service,
            active: false,
            generation: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Mark the session active and hand back the request to dispatch.
    /// `None` if a session is already active.
    pub fn start(&mut self) -> Option<SessionStart> {
        if self.active {
            log::info!("Transcription session already active");
            return None;
        }
        self.active = true;
        self.generation += 1;
        log::info!("Transcription session {} started", self.generation);
        Some(SessionStart {
            generation: self.generation,
            service: self.service.clone(),
        })
    }

    pub fn stop(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        self.generation += 1;
        log::info!("Transcription session stopped");
    }

    /// Revert after a transport-level start failure. Ignored if the user has
    /// stopped or restarted since. Returns whether the flag was reverted.
    pub fn start_failed(&mut self, generation: u64) -> bool {
        if generation != self.generation || !self.active {
            log::debug!("Stale start failure for session {generation}");
            return false;
        }
        self.active = false;
        true
    }
}
