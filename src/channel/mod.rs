//! Persistent, auto-reconnecting subscription to the service's pushed events.
//!
//! The connection owns exactly one link task. Events are handed to the
//! registered handlers on that task, one at a time and in arrival order.
//! Events emitted while the link is down are lost; nothing is replayed.

mod sse;

pub use sse::SseTransport;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;

use crate::config::ReconnectConfig;
use crate::error::ChannelError;
use crate::upload::PiiMatches;

/// One PII hit reported by the live transcription stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionAlert {
    #[serde(rename = "type")]
    pub pii_type: String,
    pub value: String,
    /// `context` or `content`
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    DocumentAlert { detected_pii: PiiMatches },
    TranscriptionAlert(TranscriptionAlert),
    TranscriptionUpdate { text: String },
    TranscriptionStatus { status: String },
    /// Error pushed by the service while the link is up.
    ServerError { message: String },
    /// Raised locally once reconnect attempts are exhausted.
    ConnectionError { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    DocumentAlert,
    TranscriptionAlert,
    TranscriptionUpdate,
    TranscriptionStatus,
    ServerError,
    ConnectionError,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::DocumentAlert,
        EventKind::TranscriptionAlert,
        EventKind::TranscriptionUpdate,
        EventKind::TranscriptionStatus,
        EventKind::ServerError,
        EventKind::ConnectionError,
    ];
}

impl ChannelEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ChannelEvent::DocumentAlert { .. } => EventKind::DocumentAlert,
            ChannelEvent::TranscriptionAlert(_) => EventKind::TranscriptionAlert,
            ChannelEvent::TranscriptionUpdate { .. } => EventKind::TranscriptionUpdate,
            ChannelEvent::TranscriptionStatus { .. } => EventKind::TranscriptionStatus,
            ChannelEvent::ServerError { .. } => EventKind::ServerError,
            ChannelEvent::ConnectionError { .. } => EventKind::ConnectionError,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    #[default]
    Connecting,
    Open,
    Reconnecting,
    Failed,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Open => "open",
            ConnectionStatus::Reconnecting => "reconnecting",
            ConnectionStatus::Failed => "failed",
        })
    }
}

pub type EventStream = BoxStream<'static, Result<ChannelEvent, ChannelError>>;

/// Establishes one link to the event source. The returned stream ends (or
/// yields an error) when the link is lost.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<EventStream, ChannelError>;
}

pub type EventHandler = Arc<dyn Fn(&ChannelEvent) + Send + Sync>;
pub type StatusHandler = Arc<dyn Fn(ConnectionStatus) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    kind: EventKind,
    handler: EventHandler,
}

#[derive(Default)]
struct Shared {
    subscriptions: Mutex<Vec<Subscription>>,
    status_handlers: Mutex<Vec<StatusHandler>>,
    status: Mutex<ConnectionStatus>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn set_status(&self, status: ConnectionStatus) {
        {
            let mut current = lock(&self.status);
            if *current == status {
                return;
            }
            *current = status;
        }
        log::debug!("Event channel status: {status}");
        let handlers: Vec<StatusHandler> = lock(&self.status_handlers).clone();
        for handler in handlers {
            if self.is_closed() {
                return;
            }
            handler(status);
        }
    }

    fn dispatch(&self, event: &ChannelEvent) {
        let kind = event.kind();
        let handlers: Vec<EventHandler> = lock(&self.subscriptions)
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| s.handler.clone())
            .collect();
        if handlers.is_empty() {
            log::debug!("No subscriber for {kind:?}, dropping event");
        }
        for handler in handlers {
            if self.is_closed() {
                return;
            }
            handler(event);
        }
    }
}

/// Handle to the persistent event link.
pub struct ChannelConnection {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelConnection {
    /// Spawn the link task. Subscribe before yielding to the runtime so no
    /// early event goes unobserved.
    pub fn open(
        endpoint: impl Into<String>,
        transport: Arc<dyn Transport>,
        policy: ReconnectConfig,
    ) -> Self {
        let shared = Arc::new(Shared::default());
        let task = tokio::spawn(run_link(
            shared.clone(),
            transport,
            endpoint.into(),
            policy,
        ));
        Self {
            shared,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn subscribe(
        &self,
        kind: EventKind,
        handler: impl Fn(&ChannelEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        if self.shared.is_closed() {
            log::warn!("Subscribe on a closed event channel ignored");
            return id;
        }
        lock(&self.shared.subscriptions).push(Subscription {
            id,
            kind,
            handler: Arc::new(handler),
        });
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        lock(&self.shared.subscriptions).retain(|s| s.id != id);
    }

    pub fn on_status_change(&self, handler: impl Fn(ConnectionStatus) + Send + Sync + 'static) {
        if self.shared.is_closed() {
            return;
        }
        lock(&self.shared.status_handlers).push(Arc::new(handler));
    }

    pub fn status(&self) -> ConnectionStatus {
        *lock(&self.shared.status)
    }

    /// Unregister every handler, then tear the link down. Safe to call more
    /// than once.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        lock(&self.shared.subscriptions).clear();
        lock(&self.shared.status_handlers).clear();
        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }
        log::info!("Event channel closed");
    }
}

impl Drop for ChannelConnection {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_link(
    shared: Arc<Shared>,
    transport: Arc<dyn Transport>,
    endpoint: String,
    policy: ReconnectConfig,
) {
    let mut failures: u32 = 0;
    shared.set_status(ConnectionStatus::Connecting);

    loop {
        match transport.connect(&endpoint).await {
            Ok(mut events) => {
                failures = 0;
                shared.set_status(ConnectionStatus::Open);
                log::info!("Event channel open: {endpoint}");

                while let Some(item) = events.next().await {
                    match item {
                        Ok(event) => shared.dispatch(&event),
                        Err(e) => {
                            log::warn!("Event channel error: {e}");
                            break;
                        }
                    }
                }
                if shared.is_closed() {
                    return;
                }
                log::warn!("Event channel lost, reconnecting");
            }
            Err(e) => {
                failures += 1;
                log::warn!(
                    "Event channel attempt {failures}/{} failed: {e}",
                    policy.attempts
                );
                if failures >= policy.attempts {
                    log::error!("Event channel giving up after {failures} attempts");
                    shared.set_status(ConnectionStatus::Failed);
                    shared.dispatch(&ChannelEvent::ConnectionError {
                        reason: e.to_string(),
                    });
                    return;
                }
            }
        }

        shared.set_status(ConnectionStatus::Reconnecting);
        tokio::time::sleep(policy.delay()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    enum Script {
        Fail,
        /// Deliver the events, then either drop the link or hold it open.
        Deliver(Vec<ChannelEvent>, bool),
    }

    #[derive(Default)]
    struct ScriptedTransport {
        script: Mutex<VecDeque<Script>>,
        connects: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                connects: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn connect(&self, _endpoint: &str) -> Result<EventStream, ChannelError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Script::Deliver(events, hold_open)) => {
                    let delivered = stream::iter(events.into_iter().map(Ok));
                    if hold_open {
                        Ok(delivered.chain(stream::pending()).boxed())
                    } else {
                        Ok(delivered.boxed())
                    }
                }
                Some(Script::Fail) | None => Err(ChannelError::Connect("connection refused".into())),
            }
        }
    }

    fn alert(n: usize) -> ChannelEvent {
        ChannelEvent::TranscriptionAlert(TranscriptionAlert {
            pii_type: "PHONE_NUMBER".into(),
            value: format!("call me at 98765432{n:02}"),
            source: Some("content".into()),
            timestamp: None,
        })
    }

    fn policy() -> ReconnectConfig {
        ReconnectConfig {
            attempts: 5,
            delay_ms: 1000,
        }
    }

    fn record(conn: &ChannelConnection) -> (Arc<Mutex<Vec<ChannelEvent>>>, Arc<Mutex<Vec<ConnectionStatus>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let statuses = Arc::new(Mutex::new(Vec::new()));
        for kind in EventKind::ALL {
            let sink = events.clone();
            conn.subscribe(kind, move |e| sink.lock().unwrap().push(e.clone()));
        }
        let sink = statuses.clone();
        conn.on_status_change(move |s| sink.lock().unwrap().push(s));
        (events, statuses)
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_within_bound_resumes_open_without_failure() {
        let transport = ScriptedTransport::new(vec![
            Script::Deliver(vec![alert(1)], false),
            Script::Fail,
            Script::Deliver(vec![alert(2)], true),
        ]);
        let conn = ChannelConnection::open("http://svc/events", transport.clone(), policy());
        let (events, statuses) = record(&conn);

        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(
            *statuses.lock().unwrap(),
            vec![
                ConnectionStatus::Open,
                ConnectionStatus::Reconnecting,
                ConnectionStatus::Open
            ]
        );
        assert_eq!(conn.status(), ConnectionStatus::Open);
        assert_eq!(*events.lock().unwrap(), vec![alert(1), alert(2)]);
        assert_eq!(transport.connects.load(Ordering::SeqCst), 3);
        conn.close();
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_reconnects_report_one_connection_error() {
        let transport = ScriptedTransport::new(vec![Script::Deliver(vec![], false)]);
        let conn = ChannelConnection::open("http://svc/events", transport.clone(), policy());
        let (events, statuses) = record(&conn);

        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(conn.status(), ConnectionStatus::Failed);
        assert_eq!(statuses.lock().unwrap().last(), Some(&ConnectionStatus::Failed));
        let errors: Vec<_> = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind() == EventKind::ConnectionError)
            .cloned()
            .collect();
        assert_eq!(errors.len(), 1);
        // one successful link plus five failed reconnects, then silence
        assert_eq!(transport.connects.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn events_keep_arrival_order() {
        let burst: Vec<ChannelEvent> = (0..20).map(alert).collect();
        let transport = ScriptedTransport::new(vec![Script::Deliver(burst.clone(), true)]);
        let conn = ChannelConnection::open("http://svc/events", transport, policy());
        let (events, _) = record(&conn);

        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(*events.lock().unwrap(), burst);
    }

    #[tokio::test(start_paused = true)]
    async fn close_unregisters_handlers_and_is_idempotent() {
        let transport = ScriptedTransport::new(vec![
            Script::Deliver(vec![], false),
            Script::Deliver(vec![alert(1)], true),
        ]);
        let conn = ChannelConnection::open("http://svc/events", transport.clone(), policy());
        let (events, _) = record(&conn);

        conn.close();
        conn.close();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(events.lock().unwrap().is_empty());
        assert!(transport.connects.load(Ordering::SeqCst) <= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unsubscribed_handler_stops_receiving() {
        let transport = ScriptedTransport::new(vec![
            Script::Deliver(vec![alert(1)], false),
            Script::Deliver(vec![alert(2)], true),
        ]);
        let conn = ChannelConnection::open("http://svc/events", transport, policy());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = conn.subscribe(EventKind::TranscriptionAlert, move |e| {
            sink.lock().unwrap().push(e.clone())
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        conn.unsubscribe(id);
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(*seen.lock().unwrap(), vec![alert(1)]);
        conn.close();
    }
}
