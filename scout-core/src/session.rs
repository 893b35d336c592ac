//! Watch sessions: the one-watcher-per-project state machine
//!
//! ```text
//! stopped --start--> starting --running--> started --stop--> stopping --exited--> stopped
//! ```
//!
//! An `exited` report from any state lands in `stopped`. A missing session is
//! `stopped`. Runner events are matched against the session's run id, so a
//! late report from a run that was already torn down cannot touch a newer one.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::event::{AppEvent, EventBus};
use crate::project::{ProjectKey, ProjectRecord};
use crate::runner::{ProcessRunner, RunId, RunnerEvent, RunnerEvents, WatchContext};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchState {
    #[default]
    Stopped,
    Starting,
    Started,
    Stopping,
}

impl WatchState {
    /// Class name the presentation layer styles a project entry with
    pub fn class(&self) -> &'static str {
        match self {
            WatchState::Stopped => "stopped",
            WatchState::Starting => "starting",
            WatchState::Started => "started",
            WatchState::Stopping => "stopping",
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, WatchState::Stopped)
    }

    /// Whether output chunks are accepted in this state
    pub fn accepts_output(&self) -> bool {
        matches!(self, WatchState::Starting | WatchState::Started)
    }
}

#[derive(Clone, Debug)]
struct WatchSession {
    run: RunId,
    state: WatchState,
}

/// Result of a start request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    /// A watcher is being launched
    Starting,
    /// A session already exists; nothing was spawned
    AlreadyActive(WatchState),
    /// The runner refused; the session is back to stopped
    SpawnFailed(String),
}

/// Result of a stop request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopOutcome {
    Stopping,
    /// Already stopping, or nothing to stop
    NotActive(WatchState),
}

pub struct WatchSessionManager {
    sessions: BTreeMap<ProjectKey, WatchSession>,
    runner: Box<dyn ProcessRunner>,
    events_tx: mpsc::UnboundedSender<RunnerEvent>,
    bus: EventBus,
    next_run: RunId,
}

impl WatchSessionManager {
    /// Build a manager around `runner`. The returned receiver yields the
    /// runner's reports, which must be fed back through [`Self::handle`].
    pub fn new(
        runner: Box<dyn ProcessRunner>,
        bus: EventBus,
    ) -> (Self, mpsc::UnboundedReceiver<RunnerEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let manager = Self {
            sessions: BTreeMap::new(),
            runner,
            events_tx,
            bus,
            next_run: 1,
        };
        (manager, events_rx)
    }

    pub fn runner_name(&self) -> &'static str {
        self.runner.name()
    }

    pub fn state(&self, key: &ProjectKey) -> WatchState {
        self.sessions
            .get(key)
            .map(|s| s.state)
            .unwrap_or(WatchState::Stopped)
    }

    /// Keys with a session in any non-stopped state
    pub fn active_keys(&self) -> Vec<ProjectKey> {
        self.sessions.keys().cloned().collect()
    }

    fn transition(&mut self, key: &ProjectKey, state: WatchState) {
        tracing::debug!(key = %key, state = state.class(), "watch state");
        match state {
            WatchState::Stopped => {
                self.sessions.remove(key);
            }
            _ => {
                if let Some(session) = self.sessions.get_mut(key) {
                    session.state = state;
                }
            }
        }
        self.bus.emit(AppEvent::StateChanged {
            key: key.clone(),
            state,
        });
        match state {
            WatchState::Started => self.bus.emit(AppEvent::Started { key: key.clone() }),
            WatchState::Stopped => self.bus.emit(AppEvent::Stopped { key: key.clone() }),
            _ => {}
        }
    }

    /// Start watching `record`. The existence check and the move to
    /// `starting` happen in this one call, before the runner is touched.
    pub fn start(&mut self, record: &ProjectRecord) -> StartOutcome {
        let key = &record.key;
        if let Some(existing) = self.sessions.get(key) {
            tracing::debug!(key = %key, state = existing.state.class(), "start ignored");
            return StartOutcome::AlreadyActive(existing.state);
        }

        let run = self.next_run;
        self.next_run += 1;
        self.sessions.insert(
            key.clone(),
            WatchSession {
                run,
                state: WatchState::Starting,
            },
        );
        self.transition(key, WatchState::Starting);

        let events = RunnerEvents::new(key.clone(), run, self.events_tx.clone());
        match self.runner.start(WatchContext::from_record(record), events) {
            Ok(()) => {
                tracing::info!(key = %key, name = %record.name, run, runner = self.runner.name(), "watcher starting");
                StartOutcome::Starting
            }
            Err(err) => {
                let message = err.to_string();
                tracing::warn!(key = %key, error = %message, "watcher spawn failed");
                self.transition(key, WatchState::Stopped);
                self.bus.emit(AppEvent::SpawnFailed {
                    key: key.clone(),
                    message: message.clone(),
                });
                StartOutcome::SpawnFailed(message)
            }
        }
    }

    /// Ask the watcher to terminate. The session stays in `stopping` until
    /// the runner reports the exit.
    pub fn stop(&mut self, key: &ProjectKey) -> StopOutcome {
        let Some(session) = self.sessions.get(key) else {
            return StopOutcome::NotActive(WatchState::Stopped);
        };
        if !session.state.accepts_output() {
            return StopOutcome::NotActive(session.state);
        }

        let run = session.run;
        self.transition(key, WatchState::Stopping);
        if let Err(err) = self.runner.stop(key, run) {
            tracing::warn!(key = %key, error = %err, "stop signal failed");
        }
        StopOutcome::Stopping
    }

    /// Signal the watcher if there is one and drop the session right away,
    /// without waiting for the exit report. Returns whether a session existed.
    pub fn force_stop(&mut self, key: &ProjectKey) -> bool {
        let Some(session) = self.sessions.get(key) else {
            return false;
        };
        let run = session.run;
        if session.state != WatchState::Stopping {
            if let Err(err) = self.runner.stop(key, run) {
                tracing::warn!(key = %key, error = %err, "stop signal failed");
            }
        }
        self.transition(key, WatchState::Stopped);
        true
    }

    pub fn stop_all(&mut self) {
        for key in self.active_keys() {
            self.force_stop(&key);
        }
    }

    /// Apply a runner report. Returns the output chunk to log, if any.
    pub fn handle(&mut self, event: RunnerEvent) -> Option<(ProjectKey, String)> {
        let current = self.sessions.get(event.key()).map(|s| (s.run, s.state));
        let state = match current {
            Some((run, state)) if run == event.run() => state,
            _ => {
                tracing::debug!(key = %event.key(), run = event.run(), "stale runner event dropped");
                return None;
            }
        };

        match event {
            RunnerEvent::Running { key, .. } => {
                if state == WatchState::Starting {
                    tracing::info!(key = %key, "watcher running");
                    self.transition(&key, WatchState::Started);
                }
                None
            }
            RunnerEvent::Output { key, chunk, .. } => {
                if state.accepts_output() {
                    Some((key, chunk))
                } else {
                    None
                }
            }
            RunnerEvent::Exited { key, code, .. } => {
                if state == WatchState::Stopping {
                    tracing::info!(key = %key, ?code, "watcher stopped");
                } else {
                    tracing::warn!(key = %key, ?code, state = state.class(), "watcher exited unexpectedly");
                }
                self.transition(&key, WatchState::Stopped);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::drain;
    use crate::project::NewProject;
    use crate::testing::ScriptedRunner;

    fn setup() -> (
        WatchSessionManager,
        mpsc::UnboundedReceiver<RunnerEvent>,
        ScriptedRunner,
        EventBus,
    ) {
        let runner = ScriptedRunner::new();
        let bus = EventBus::new(256);
        let (manager, rx) = WatchSessionManager::new(Box::new(runner.clone()), bus.clone());
        (manager, rx, runner, bus)
    }

    fn record(key: &str) -> ProjectRecord {
        NewProject::new(key, format!("/tmp/{}", key)).into_record(ProjectKey::from(key))
    }

    fn pump(manager: &mut WatchSessionManager, rx: &mut mpsc::UnboundedReceiver<RunnerEvent>) -> Vec<String> {
        let mut chunks = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            if let Some((_, chunk)) = manager.handle(ev) {
                chunks.push(chunk);
            }
        }
        chunks
    }

    fn states(events: Vec<AppEvent>) -> Vec<WatchState> {
        events
            .into_iter()
            .filter_map(|e| match e {
                AppEvent::StateChanged { state, .. } => Some(state),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_full_cycle() {
        let (mut manager, mut rx, runner, bus) = setup();
        let mut sub = bus.subscribe();
        let p = record("p1");

        assert_eq!(manager.start(&p), StartOutcome::Starting);
        assert_eq!(manager.state(&p.key), WatchState::Starting);

        runner.running(&p.key);
        pump(&mut manager, &mut rx);
        assert_eq!(manager.state(&p.key), WatchState::Started);

        assert_eq!(manager.stop(&p.key), StopOutcome::Stopping);
        assert_eq!(runner.stops(), vec![(p.key.clone(), 1)]);

        runner.exited(&p.key);
        pump(&mut manager, &mut rx);
        assert_eq!(manager.state(&p.key), WatchState::Stopped);

        assert_eq!(
            states(drain(&mut sub)),
            vec![
                WatchState::Starting,
                WatchState::Started,
                WatchState::Stopping,
                WatchState::Stopped
            ]
        );
    }

    #[test]
    fn test_repeated_start_spawns_once() {
        let (mut manager, mut rx, runner, _bus) = setup();
        let p = record("p1");

        assert_eq!(manager.start(&p), StartOutcome::Starting);
        for _ in 0..5 {
            assert_eq!(
                manager.start(&p),
                StartOutcome::AlreadyActive(WatchState::Starting)
            );
        }
        runner.running(&p.key);
        pump(&mut manager, &mut rx);
        assert_eq!(
            manager.start(&p),
            StartOutcome::AlreadyActive(WatchState::Started)
        );
        manager.stop(&p.key);
        assert_eq!(
            manager.start(&p),
            StartOutcome::AlreadyActive(WatchState::Stopping)
        );
        assert_eq!(runner.starts().len(), 1);
    }

    #[test]
    fn test_crash_reports_stopped() {
        let (mut manager, mut rx, runner, bus) = setup();
        let mut sub = bus.subscribe();
        let p = record("p1");

        manager.start(&p);
        runner.running(&p.key);
        runner.exited(&p.key);
        pump(&mut manager, &mut rx);

        assert_eq!(manager.state(&p.key), WatchState::Stopped);
        let events = drain(&mut sub);
        assert!(events.contains(&AppEvent::Stopped { key: p.key.clone() }));
    }

    #[test]
    fn test_spawn_failure_returns_to_stopped() {
        let (mut manager, _rx, runner, bus) = setup();
        let mut sub = bus.subscribe();
        let p = record("p1");
        runner.fail_next_spawn("compass: command not found");

        let outcome = manager.start(&p);
        assert!(matches!(outcome, StartOutcome::SpawnFailed(ref m) if m.contains("command not found")));
        assert_eq!(manager.state(&p.key), WatchState::Stopped);

        let events = drain(&mut sub);
        assert_eq!(
            states(events.clone()),
            vec![WatchState::Starting, WatchState::Stopped]
        );
        assert!(events.iter().any(|e| matches!(e, AppEvent::SpawnFailed { .. })));

        // A later start is allowed again.
        assert_eq!(manager.start(&p), StartOutcome::Starting);
    }

    #[test]
    fn test_output_only_while_starting_or_started() {
        let (mut manager, mut rx, runner, _bus) = setup();
        let p = record("p1");

        manager.start(&p);
        runner.output(&p.key, "booting");
        runner.running(&p.key);
        runner.output(&p.key, "watching");
        assert_eq!(pump(&mut manager, &mut rx), vec!["booting", "watching"]);

        manager.stop(&p.key);
        runner.output(&p.key, "late");
        assert!(pump(&mut manager, &mut rx).is_empty());
    }

    #[test]
    fn test_stale_run_is_ignored() {
        let (mut manager, mut rx, runner, _bus) = setup();
        let p = record("p1");

        manager.start(&p);
        let old = runner.events_for(&p.key).unwrap();
        assert!(manager.force_stop(&p.key));

        manager.start(&p);
        // The torn-down run confirms its exit only now.
        old.exited(Some(143));
        pump(&mut manager, &mut rx);
        assert_eq!(manager.state(&p.key), WatchState::Starting);

        runner.running(&p.key);
        pump(&mut manager, &mut rx);
        assert_eq!(manager.state(&p.key), WatchState::Started);
    }

    #[test]
    fn test_force_stop_and_stop_all() {
        let (mut manager, mut rx, runner, _bus) = setup();
        let a = record("a");
        let b = record("b");

        manager.start(&a);
        manager.start(&b);
        runner.running(&a.key);
        pump(&mut manager, &mut rx);

        manager.stop_all();
        assert_eq!(manager.state(&a.key), WatchState::Stopped);
        assert_eq!(manager.state(&b.key), WatchState::Stopped);
        assert!(manager.active_keys().is_empty());
        assert_eq!(runner.stops().len(), 2);

        runner.exited(&a.key);
        pump(&mut manager, &mut rx);
        assert!(!manager.force_stop(&a.key));
    }

    #[test]
    fn test_stop_when_stopped_is_noop() {
        let (mut manager, _rx, runner, _bus) = setup();
        assert_eq!(
            manager.stop(&ProjectKey::from("nope")),
            StopOutcome::NotActive(WatchState::Stopped)
        );
        assert!(runner.stops().is_empty());
    }
}
