mod event_handler;
mod pipeline;
mod state;

pub use state::{Coordinator, CoordinatorEvent, Snapshot, UploadState};
