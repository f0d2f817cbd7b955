use super::state::{Coordinator, CoordinatorEvent};
use crate::session::SessionStart;
use crate::upload::{Document, RedactionLevel};

impl Coordinator {
    /// Run the upload on the runtime and report back through the queue.
    pub(super) fn dispatch_upload(&self, document: Document, level: RedactionLevel) {
        let uploads = self.uploads.clone();
        let sender = self.sender.clone();

        tokio::spawn(async move {
            let result = uploads.submit(Some(document), level).await;
            if sender.send(CoordinatorEvent::UploadFinished(result)).await.is_err() {
                log::debug!("Upload finished after coordinator shut down");
            }
        });
    }

    pub(super) fn dispatch_session_start(&self, start: SessionStart) {
        let sender = self.sender.clone();

        tokio::spawn(async move {
            let generation = start.generation;
            let result = start.send().await;
            if sender
                .send(CoordinatorEvent::SessionStartFinished { generation, result })
                .await
                .is_err()
            {
                log::debug!("Start acknowledged after coordinator shut down");
            }
        });
    }
}
