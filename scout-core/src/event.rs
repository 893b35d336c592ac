use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use tokio::sync::broadcast;

use crate::colorize::Fragment;
use crate::project::ProjectKey;
use crate::session::WatchState;

/// Notifications the core emits for the presentation layer
#[derive(Clone, Debug, PartialEq)]
pub enum AppEvent {
    /// The project collection changed (create, update, delete, clear)
    Changed,
    /// A project became the selected one
    Select { key: ProjectKey },
    /// A project was selected and its configuration pane shown
    SelectAndConfigure { key: ProjectKey },
    /// A start was requested for a project
    WatchStart { key: ProjectKey },
    /// A stop was requested for a project
    WatchStop { key: ProjectKey },
    /// Any watch state transition
    StateChanged { key: ProjectKey, state: WatchState },
    /// The watcher reported it is running
    Started { key: ProjectKey },
    /// The watcher is gone, whether stopped, crashed or torn down
    Stopped { key: ProjectKey },
    /// The watcher could not be spawned
    SpawnFailed { key: ProjectKey, message: String },
    /// Colorized output appended to a project's log
    NewLogOutput {
        key: ProjectKey,
        fragments: Vec<Fragment>,
    },
}

impl AppEvent {
    /// Wire name of the event, as the presentation layer subscribes to it
    pub fn name(&self) -> &'static str {
        match self {
            AppEvent::Changed => "changed",
            AppEvent::Select { .. } => "select",
            AppEvent::SelectAndConfigure { .. } => "select_and_configure",
            AppEvent::WatchStart { .. } => "watch:start",
            AppEvent::WatchStop { .. } => "watch:stop",
            AppEvent::StateChanged { .. } => "state",
            AppEvent::Started { .. } => "started",
            AppEvent::Stopped { .. } => "stopped",
            AppEvent::SpawnFailed { .. } => "spawn_failed",
            AppEvent::NewLogOutput { .. } => "newLogOutput",
        }
    }

    pub fn key(&self) -> Option<&ProjectKey> {
        match self {
            AppEvent::Changed => None,
            AppEvent::Select { key }
            | AppEvent::SelectAndConfigure { key }
            | AppEvent::WatchStart { key }
            | AppEvent::WatchStop { key }
            | AppEvent::StateChanged { key, .. }
            | AppEvent::Started { key }
            | AppEvent::Stopped { key }
            | AppEvent::SpawnFailed { key, .. }
            | AppEvent::NewLogOutput { key, .. } => Some(key),
        }
    }
}

#[derive(Clone, Debug)]
pub struct EventEnvelope {
    pub id: u64,
    pub at: SystemTime,
    pub event: AppEvent,
}

/// Broadcast bus stamping every event with a monotonically increasing id
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: AppEvent) {
        tracing::trace!(event = event.name(), "emit");
        // No subscribers is fine: nobody is rendering yet.
        let _ = self.tx.send(EventEnvelope {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            at: SystemTime::now(),
            event,
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Drain everything currently queued on a receiver
pub fn drain(rx: &mut broadcast::Receiver<EventEnvelope>) -> Vec<AppEvent> {
    drain_envelopes(rx).into_iter().map(|env| env.event).collect()
}

/// Like [`drain`], keeping ids and timestamps
pub fn drain_envelopes(rx: &mut broadcast::Receiver<EventEnvelope>) -> Vec<EventEnvelope> {
    let mut envelopes = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(env) => envelopes.push(env),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    envelopes
}
