//! Process runner contract
//!
//! A runner owns the actual watcher processes. The session manager asks it to
//! start or stop one per project and learns what happened through
//! [`RunnerEvent`]s sent back on a channel, never through return values of a
//! long-running call.

use thiserror::Error;
use tokio::sync::mpsc;

use crate::project::{DirField, Environment, OutputStyle, ProjectKey, ProjectRecord};

/// Identifies one start of one project; bumps on every start
pub type RunId = u64;

/// Errors a runner can report synchronously
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RunnerError {
    #[error("failed to spawn watcher for {key}: {message}")]
    SpawnFailed { key: ProjectKey, message: String },
    #[error("failed to stop watcher for {key}: {message}")]
    StopFailed { key: ProjectKey, message: String },
}

/// Events a runner reports back for a run
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunnerEvent {
    /// The process is up and watching
    Running { key: ProjectKey, run: RunId },
    /// A chunk of stdout/stderr text, escapes untouched
    Output {
        key: ProjectKey,
        run: RunId,
        chunk: String,
    },
    /// The process is gone, requested or not
    Exited {
        key: ProjectKey,
        run: RunId,
        code: Option<i32>,
    },
}

impl RunnerEvent {
    pub fn key(&self) -> &ProjectKey {
        match self {
            RunnerEvent::Running { key, .. }
            | RunnerEvent::Output { key, .. }
            | RunnerEvent::Exited { key, .. } => key,
        }
    }

    pub fn run(&self) -> RunId {
        match self {
            RunnerEvent::Running { run, .. }
            | RunnerEvent::Output { run, .. }
            | RunnerEvent::Exited { run, .. } => *run,
        }
    }
}

/// Sender bound to one project run, handed to the runner on start
#[derive(Clone, Debug)]
pub struct RunnerEvents {
    key: ProjectKey,
    run: RunId,
    tx: mpsc::UnboundedSender<RunnerEvent>,
}

impl RunnerEvents {
    pub fn new(key: ProjectKey, run: RunId, tx: mpsc::UnboundedSender<RunnerEvent>) -> Self {
        Self { key, run, tx }
    }

    pub fn key(&self) -> &ProjectKey {
        &self.key
    }

    pub fn run(&self) -> RunId {
        self.run
    }

    fn send(&self, event: RunnerEvent) {
        // The receiver only goes away on shutdown.
        let _ = self.tx.send(event);
    }

    pub fn running(&self) {
        self.send(RunnerEvent::Running {
            key: self.key.clone(),
            run: self.run,
        });
    }

    pub fn output(&self, chunk: impl Into<String>) {
        self.send(RunnerEvent::Output {
            key: self.key.clone(),
            run: self.run,
            chunk: chunk.into(),
        });
    }

    pub fn exited(&self, code: Option<i32>) {
        self.send(RunnerEvent::Exited {
            key: self.key.clone(),
            run: self.run,
            code,
        });
    }
}

/// Everything a runner needs to launch a watcher for a project
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchContext {
    pub key: ProjectKey,
    pub name: String,
    pub project_dir: String,
    /// Only the directories that are set, in flag order
    pub dirs: Vec<(DirField, String)>,
    pub environment: Environment,
    pub output_style: OutputStyle,
}

impl WatchContext {
    pub fn from_record(record: &ProjectRecord) -> Self {
        Self {
            key: record.key.clone(),
            name: record.name.clone(),
            project_dir: record.project_dir.clone(),
            dirs: DirField::ALL
                .iter()
                .filter(|f| !record.dir(**f).is_empty())
                .map(|f| (*f, record.dir(*f).to_string()))
                .collect(),
            environment: record.environment,
            output_style: record.output_style,
        }
    }

    /// Arguments following the compass command itself
    pub fn compass_args(&self) -> Vec<String> {
        let mut args = vec![self.project_dir.clone()];
        for (field, dir) in &self.dirs {
            args.push(field.flag().to_string());
            args.push(dir.clone());
        }
        args.push("-e".into());
        args.push(self.environment.as_str().into());
        args.push("-s".into());
        args.push(self.output_style.as_str().into());
        args
    }
}

/// Backend that launches and terminates watcher processes.
///
/// Both calls must return without waiting on the process: `start` reports
/// `running` and `exited` later through `events`, `stop` only signals.
pub trait ProcessRunner: Send {
    fn name(&self) -> &'static str;

    fn start(&mut self, ctx: WatchContext, events: RunnerEvents) -> Result<(), RunnerError>;

    fn stop(&mut self, key: &ProjectKey, run: RunId) -> Result<(), RunnerError>;
}
