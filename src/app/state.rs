use std::sync::Arc;

use tokio::sync::watch;

use crate::alerts::{AlertAggregator, LoggedAlert};
use crate::audio_feedback::AlertSink;
use crate::channel::{ChannelEvent, ConnectionStatus};
use crate::error::CoordinatorError;
use crate::service::{RemoteService, StartAck};
use crate::session::LiveSessionController;
use crate::upload::{Document, RedactionLevel, UploadRequestManager, UploadResult};

/// Everything that can change coordinator state. User commands, request
/// completions and channel events all arrive through the same queue.
#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    /// `level` falls back to the currently selected level.
    SubmitUpload {
        document: Option<Document>,
        level: Option<RedactionLevel>,
    },
    SetLevel(RedactionLevel),
    UploadFinished(Result<UploadResult, CoordinatorError>),
    StartSession,
    StopSession,
    ToggleSession,
    SessionStartFinished {
        generation: u64,
        result: Result<StartAck, CoordinatorError>,
    },
    Channel(ChannelEvent),
    ConnectionChanged(ConnectionStatus),
    Shutdown,
}

/// The single current upload outcome.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum UploadState {
    #[default]
    Idle,
    Pending,
    Succeeded(UploadResult),
    Failed(String),
}

/// Presentation-ready view of the coordinator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub busy: bool,
    pub error_message: Option<String>,
    pub alert_notice: Option<String>,
    pub upload: UploadState,
    pub level: RedactionLevel,
    pub session_active: bool,
    pub transcription_log: Vec<LoggedAlert>,
    pub transcript: String,
    pub remote_status: Option<String>,
    pub connection: ConnectionStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Composition root. Owned by one task; events are handled one at a time.
pub struct Coordinator {
    pub(super) uploads: UploadRequestManager,
    pub(super) session: LiveSessionController,
    pub(super) alerts: AlertAggregator,
    pub(super) alert_sink: Arc<dyn AlertSink>,
    pub(super) upload: UploadState,
    pub(super) busy: bool,
    pub(super) error: Option<CoordinatorError>,
    pub(super) level: RedactionLevel,
    pub(super) connection: ConnectionStatus,
    pub(super) sender: async_channel::Sender<CoordinatorEvent>,
    snapshots: watch::Sender<Snapshot>,
}

impl Coordinator {
    pub fn new(
        service: Arc<dyn RemoteService>,
        alert_sink: Arc<dyn AlertSink>,
        level: RedactionLevel,
        sender: async_channel::Sender<CoordinatorEvent>,
    ) -> (Self, watch::Receiver<Snapshot>) {
        let (snapshots, receiver) = watch::channel(Snapshot {
            level,
            ..Snapshot::default()
        });
        let coordinator = Self {
            uploads: UploadRequestManager::new(service.clone()),
            session: LiveSessionController::new(service),
            alerts: AlertAggregator::default(),
            alert_sink,
            upload: UploadState::Idle,
            busy: false,
            error: None,
            level,
            connection: ConnectionStatus::Connecting,
            sender,
            snapshots,
        };
        (coordinator, receiver)
    }

    /// Compose the view from the current value of every component.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            busy: self.busy,
            error_message: self.error.as_ref().map(CoordinatorError::message),
            alert_notice: self.alerts.document_alert().map(str::to_string),
            upload: self.upload.clone(),
            level: self.level,
            session_active: self.session.is_active(),
            transcription_log: self.alerts.transcription_log().to_vec(),
            transcript: self.alerts.transcript(),
            remote_status: self.alerts.remote_status().map(str::to_string),
            connection: self.connection,
        }
    }

    fn publish(&self) {
        self.snapshots.send_if_modified(|current| {
            let next = self.snapshot();
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    /// Drain the event queue until shutdown or until every sender is gone.
    pub async fn run(mut self, events: async_channel::Receiver<CoordinatorEvent>) {
        self.publish();
        while let Ok(event) = events.recv().await {
            let flow = self.handle(event);
            self.publish();
            if flow == Flow::Exit {
                break;
            }
        }
        log::info!("Coordinator stopped");
    }
}
