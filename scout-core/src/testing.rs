//! In-process runner driven by hand from tests

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::project::ProjectKey;
use crate::runner::{ProcessRunner, RunId, RunnerError, RunnerEvents, WatchContext};

#[derive(Default)]
struct Script {
    starts: Vec<WatchContext>,
    stops: Vec<(ProjectKey, RunId)>,
    live: BTreeMap<ProjectKey, RunnerEvents>,
    fail_next: Option<String>,
}

/// Records every start/stop and lets the test report `running`, output and
/// exits for whichever run was started last for a key.
#[derive(Clone, Default)]
pub struct ScriptedRunner {
    script: Arc<Mutex<Script>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_spawn(&self, message: &str) {
        self.script.lock().unwrap().fail_next = Some(message.to_string());
    }

    pub fn starts(&self) -> Vec<WatchContext> {
        self.script.lock().unwrap().starts.clone()
    }

    pub fn stops(&self) -> Vec<(ProjectKey, RunId)> {
        self.script.lock().unwrap().stops.clone()
    }

    pub fn events_for(&self, key: &ProjectKey) -> Option<RunnerEvents> {
        self.script.lock().unwrap().live.get(key).cloned()
    }

    pub fn running(&self, key: &ProjectKey) {
        if let Some(events) = self.events_for(key) {
            events.running();
        }
    }

    pub fn output(&self, key: &ProjectKey, chunk: &str) {
        if let Some(events) = self.events_for(key) {
            events.output(chunk);
        }
    }

    pub fn exited(&self, key: &ProjectKey) {
        if let Some(events) = self.events_for(key) {
            events.exited(Some(0));
        }
    }
}

impl ProcessRunner for ScriptedRunner {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn start(&mut self, ctx: WatchContext, events: RunnerEvents) -> Result<(), RunnerError> {
        let mut script = self.script.lock().unwrap();
        if let Some(message) = script.fail_next.take() {
            return Err(RunnerError::SpawnFailed { key: ctx.key, message });
        }
        script.live.insert(ctx.key.clone(), events);
        script.starts.push(ctx);
        Ok(())
    }

    fn stop(&mut self, key: &ProjectKey, run: RunId) -> Result<(), RunnerError> {
        self.script.lock().unwrap().stops.push((key.clone(), run));
        Ok(())
    }
}
