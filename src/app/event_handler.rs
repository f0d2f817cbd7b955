use super::state::{Coordinator, CoordinatorEvent, Flow, UploadState};
use crate::error::CoordinatorError;
use crate::upload::UploadRequestManager;

impl Coordinator {
    /// Handle one event. This is the core state machine.
    pub fn handle(&mut self, event: CoordinatorEvent) -> Flow {
        match event {
            CoordinatorEvent::SubmitUpload { document, level } => {
                if self.busy {
                    log::info!("Ignoring upload while another is in flight");
                    return Flow::Continue;
                }
                let document = match UploadRequestManager::require_document(document) {
                    Ok(document) => document,
                    Err(e) => {
                        self.error = Some(e);
                        return Flow::Continue;
                    }
                };
                let level = level.unwrap_or(self.level);
                self.busy = true;
                if self.error.as_ref().is_some_and(CoordinatorError::is_request_scoped) {
                    self.error = None;
                }
                self.upload = UploadState::Pending;
                self.alerts.clear_document_notice();
                self.dispatch_upload(document, level);
            }
            CoordinatorEvent::SetLevel(level) => {
                log::info!("Redaction level set to {level}");
                self.level = level;
            }
            CoordinatorEvent::UploadFinished(result) => {
                self.busy = false;
                self.upload = match result {
                    Ok(result) => UploadState::Succeeded(result),
                    Err(e) => {
                        let message = e.message();
                        self.error = Some(e);
                        UploadState::Failed(message)
                    }
                };
            }
            CoordinatorEvent::StartSession => self.start_session(),
            CoordinatorEvent::StopSession => self.session.stop(),
            CoordinatorEvent::ToggleSession => {
                if self.session.is_active() {
                    self.session.stop();
                } else {
                    self.start_session();
                }
            }
            CoordinatorEvent::SessionStartFinished { generation, result } => match result {
                Ok(ack) => log::debug!("Session {generation} start answered: {}", ack.body),
                Err(e) => {
                    if self.session.start_failed(generation) {
                        log::warn!("Session {generation} reverted after start failure");
                    }
                    self.error = Some(e);
                }
            },
            CoordinatorEvent::Channel(event) => {
                let effect = self.alerts.on_event(event, self.session.is_active());
                if let Some(e) = effect.error {
                    self.error = Some(e);
                }
                if effect.audible {
                    self.alert_sink.play();
                }
            }
            CoordinatorEvent::ConnectionChanged(status) => {
                log::info!("Event channel {status}");
                self.connection = status;
            }
            CoordinatorEvent::Shutdown => return Flow::Exit,
        }
        Flow::Continue
    }

    fn start_session(&mut self) {
        if let Some(start) = self.session.start() {
            self.alerts.start_session();
            self.dispatch_session_start(start);
        }
    }
}
