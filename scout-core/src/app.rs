//! Application facade
//!
//! Ties the store, the session manager, the log buffers and the view state
//! together and implements the user-facing flows: create, configure, start,
//! stop, delete and nuke. Everything runs on one event loop; the only
//! suspension points are store calls and the directory picker.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::colorize::colorize;
use crate::event::{AppEvent, EventBus};
use crate::log::{LogEntry, LogStore};
use crate::picker::DirectoryPicker;
use crate::project::{
    DirField, Environment, NewProject, OutputStyle, ProjectKey, ProjectRecord, dir_from_uri,
};
use crate::runner::{ProcessRunner, RunnerEvent};
use crate::session::{StartOutcome, StopOutcome, WatchSessionManager, WatchState};
use crate::store::{ProjectStore, StoreError};
use crate::view::{CurrentView, Pane, ViewState};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("project not found: {0}")]
    NotFound(String),
    #[error("project {key} is already {}", .state.class())]
    AlreadyActive { key: ProjectKey, state: WatchState },
    #[error("directory selection cancelled")]
    PickerCancelled,
    #[error("could not start watcher for {key}: {message}")]
    ProcessSpawnFailure { key: ProjectKey, message: String },
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { key } => AppError::NotFound(key.to_string()),
            StoreError::NoMatch => AppError::NotFound("no matching project".into()),
            other => AppError::Store(other),
        }
    }
}

impl StartOutcome {
    /// Strict view of an outcome, for callers that want the quiet cases as errors
    pub fn into_result(self, key: &ProjectKey) -> Result<(), AppError> {
        match self {
            StartOutcome::Starting => Ok(()),
            StartOutcome::AlreadyActive(state) => Err(AppError::AlreadyActive {
                key: key.clone(),
                state,
            }),
            StartOutcome::SpawnFailed(message) => Err(AppError::ProcessSpawnFailure {
                key: key.clone(),
                message,
            }),
        }
    }
}

pub struct App {
    store: Arc<dyn ProjectStore>,
    sessions: WatchSessionManager,
    runner_rx: mpsc::UnboundedReceiver<RunnerEvent>,
    logs: LogStore,
    view: ViewState,
    bus: EventBus,
}

impl App {
    pub fn new(
        store: Arc<dyn ProjectStore>,
        runner: Box<dyn ProcessRunner>,
        bus: EventBus,
        log_capacity: usize,
    ) -> Self {
        let (sessions, runner_rx) = WatchSessionManager::new(runner, bus.clone());
        Self {
            store,
            sessions,
            runner_rx,
            logs: LogStore::new(log_capacity),
            view: ViewState::new(),
            bus,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub async fn projects(&self) -> Result<Vec<ProjectRecord>, AppError> {
        Ok(self.store.all().await?)
    }

    pub async fn project(&self, key: &ProjectKey) -> Result<ProjectRecord, AppError> {
        Ok(self.store.get(key).await?)
    }

    pub async fn find_by_name(&self, name: &str) -> Result<ProjectRecord, AppError> {
        self.store
            .find_by_name(name)
            .await
            .map_err(|e| match e {
                StoreError::NoMatch => AppError::NotFound(name.to_string()),
                other => other.into(),
            })
    }

    // --- creation -------------------------------------------------------

    /// Create a project, then select it with its configuration pane open
    pub async fn create_project(&mut self, fields: NewProject) -> Result<ProjectKey, AppError> {
        let key = self.store.create(fields).await?;
        self.view.select_project(&key);
        self.view.select_pane(&key, Pane::Configuration);
        self.bus.emit(AppEvent::SelectAndConfigure { key: key.clone() });
        Ok(key)
    }

    /// Create a project named after the last segment of `dir`
    pub async fn create_project_from_dir(&mut self, dir: &str) -> Result<ProjectKey, AppError> {
        self.create_project(NewProject::from_dir(dir)).await
    }

    /// Create a project from a dropped uri-list value
    pub async fn create_project_by_dropping(&mut self, uri: &str) -> Result<ProjectKey, AppError> {
        let dir = dir_from_uri(uri);
        self.create_project_from_dir(&dir).await
    }

    /// Ask the picker for a directory and create a project from it.
    /// `Ok(None)` when the user cancelled.
    pub async fn create_project_by_browsing(
        &mut self,
        picker: &dyn DirectoryPicker,
        start: &Path,
    ) -> Result<Option<ProjectKey>, AppError> {
        match browse(picker, start).await {
            Ok(dir) => Ok(Some(
                self.create_project_from_dir(&dir.to_string_lossy()).await?,
            )),
            Err(AppError::PickerCancelled) => Ok(None),
            Err(e) => Err(e),
        }
    }

    // --- configuration --------------------------------------------------

    /// Browse from the project directory and store the choice in `field`.
    /// Returns the updated record, or `None` when the user cancelled.
    pub async fn choose_directory(
        &mut self,
        key: &ProjectKey,
        field: DirField,
        picker: &dyn DirectoryPicker,
    ) -> Result<Option<ProjectRecord>, AppError> {
        let record = self.store.get(key).await?;
        let dir = match browse(picker, Path::new(&record.project_dir)).await {
            Ok(dir) => dir,
            Err(AppError::PickerCancelled) => {
                tracing::debug!(key = %key, field = field.label(), "directory selection cancelled");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        // Re-read: the picker may have been open for a while.
        let mut record = self.store.get(key).await?;
        record.set_dir(field, dir.to_string_lossy());
        self.store.update(record.clone()).await?;
        tracing::info!(key = %key, field = field.label(), dir = %dir.display(), "directory set");
        Ok(Some(record))
    }

    pub async fn set_directory(
        &mut self,
        key: &ProjectKey,
        field: DirField,
        dir: &str,
    ) -> Result<ProjectRecord, AppError> {
        self.modify(key, |r| r.set_dir(field, dir)).await
    }

    pub async fn set_environment(
        &mut self,
        key: &ProjectKey,
        environment: Environment,
    ) -> Result<ProjectRecord, AppError> {
        self.modify(key, |r| r.environment = environment).await
    }

    pub async fn set_output_style(
        &mut self,
        key: &ProjectKey,
        output_style: OutputStyle,
    ) -> Result<ProjectRecord, AppError> {
        self.modify(key, |r| r.output_style = output_style).await
    }

    async fn modify(
        &mut self,
        key: &ProjectKey,
        edit: impl FnOnce(&mut ProjectRecord),
    ) -> Result<ProjectRecord, AppError> {
        let mut record = self.store.get(key).await?;
        edit(&mut record);
        self.store.update(record.clone()).await?;
        Ok(record)
    }

    // --- watching -------------------------------------------------------

    /// Start watching a project and switch to its log. A start for a project
    /// that already has a session is ignored.
    pub async fn start_watching(&mut self, key: &ProjectKey) -> Result<StartOutcome, AppError> {
        let record = self.store.get(key).await?;
        self.bus.emit(AppEvent::WatchStart { key: key.clone() });
        let outcome = self.sessions.start(&record);
        self.select_project(key);
        self.select_pane(key, Pane::Log);
        Ok(outcome)
    }

    pub async fn stop_watching(&mut self, key: &ProjectKey) -> Result<StopOutcome, AppError> {
        self.store.get(key).await?;
        self.bus.emit(AppEvent::WatchStop { key: key.clone() });
        Ok(self.sessions.stop(key))
    }

    pub fn state(&self, key: &ProjectKey) -> WatchState {
        self.sessions.state(key)
    }

    pub fn active_keys(&self) -> Vec<ProjectKey> {
        self.sessions.active_keys()
    }

    pub fn runner_name(&self) -> &'static str {
        self.sessions.runner_name()
    }

    /// Wait for the next runner report. `None` once the runner side is gone.
    pub async fn next_runner_event(&mut self) -> Option<RunnerEvent> {
        self.runner_rx.recv().await
    }

    /// Apply a runner report: move the state machine, log colorized output
    pub fn handle_runner_event(&mut self, event: RunnerEvent) {
        if let Some((key, chunk)) = self.sessions.handle(event) {
            let fragments = colorize(&chunk);
            self.logs.push(&key, fragments.clone());
            self.bus.emit(AppEvent::NewLogOutput { key, fragments });
        }
    }

    /// Apply every runner report already queued, without waiting
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.runner_rx.try_recv() {
            self.handle_runner_event(event);
            handled += 1;
        }
        handled
    }

    // --- teardown -------------------------------------------------------

    /// Stop the watcher (without waiting for it), then remove the project
    pub async fn delete_project(&mut self, key: &ProjectKey) -> Result<(), AppError> {
        self.sessions.force_stop(key);
        self.store.delete(key).await?;
        self.logs.clear(key);
        self.view.forget(key);
        tracing::info!(key = %key, "project deleted");
        Ok(())
    }

    /// Stop every watcher and remove every project
    pub async fn nuke_all(&mut self) -> Result<(), AppError> {
        self.sessions.stop_all();
        self.store.clear().await?;
        self.logs.clear_all();
        self.view.reset();
        tracing::info!("all projects removed");
        Ok(())
    }

    /// Stop every watcher, keeping the projects. Used on shutdown.
    pub fn stop_all(&mut self) {
        self.sessions.stop_all();
    }

    // --- view -----------------------------------------------------------

    pub fn select_project(&mut self, key: &ProjectKey) {
        self.view.select_project(key);
        self.bus.emit(AppEvent::Select { key: key.clone() });
    }

    pub fn select_pane(&mut self, key: &ProjectKey, pane: Pane) {
        self.view.select_pane(key, pane);
    }

    pub fn current_view(&self) -> CurrentView {
        self.view.current()
    }

    pub fn pane_for(&self, key: &ProjectKey) -> Pane {
        self.view.pane_for(key)
    }

    pub fn log(&self, key: &ProjectKey) -> Vec<&LogEntry> {
        self.logs.entries(key).collect()
    }

    /// Log of the selected project, only while its log pane is shown
    pub fn visible_log(&self) -> Option<Vec<&LogEntry>> {
        let key = self.view.selected()?;
        (self.view.pane_for(key) == Pane::Log).then(|| self.log(key))
    }

    pub fn log_markup(&self, key: &ProjectKey) -> String {
        self.logs.markup(key)
    }
}

async fn browse(picker: &dyn DirectoryPicker, start: &Path) -> Result<PathBuf, AppError> {
    picker.browse(start).await.ok_or(AppError::PickerCancelled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colorize::{Color, Fragment};
    use crate::event::drain;
    use crate::store::MemoryStore;
    use crate::testing::ScriptedRunner;
    use async_trait::async_trait;

    struct FixedPicker(Option<PathBuf>);

    #[async_trait]
    impl DirectoryPicker for FixedPicker {
        async fn browse(&self, _initial: &Path) -> Option<PathBuf> {
            self.0.clone()
        }
    }

    fn app() -> (App, ScriptedRunner) {
        let bus = EventBus::new(1024);
        let store = Arc::new(MemoryStore::new(bus.clone()));
        let runner = ScriptedRunner::new();
        let app = App::new(store, Box::new(runner.clone()), bus, 100);
        (app, runner)
    }

    #[tokio::test]
    async fn test_create_selects_and_configures() {
        let (mut app, _runner) = app();
        let mut rx = app.bus().subscribe();

        let key = app.create_project_from_dir("/some/path/project-a/").await.unwrap();
        let record = app.project(&key).await.unwrap();
        assert_eq!(record.name, "project-a");
        assert_eq!(record.project_dir, "/some/path/project-a/");

        assert_eq!(app.current_view().selected, Some(key.clone()));
        assert_eq!(app.current_view().pane, Some(Pane::Configuration));
        assert_eq!(
            drain(&mut rx),
            vec![AppEvent::Changed, AppEvent::SelectAndConfigure { key }]
        );
    }

    #[tokio::test]
    async fn test_create_by_dropping() {
        let (mut app, _runner) = app();
        let key = app
            .create_project_by_dropping("file:///Users/me/blog/")
            .await
            .unwrap();
        let record = app.project(&key).await.unwrap();
        assert_eq!(record.name, "blog");
        assert_eq!(record.project_dir, "/Users/me/blog/");
    }

    #[tokio::test]
    async fn test_create_by_browsing_cancelled() {
        let (mut app, _runner) = app();
        let created = app
            .create_project_by_browsing(&FixedPicker(None), Path::new("/home"))
            .await
            .unwrap();
        assert_eq!(created, None);
        assert!(app.projects().await.unwrap().is_empty());

        let created = app
            .create_project_by_browsing(&FixedPicker(Some("/home/me/site".into())), Path::new("/home"))
            .await
            .unwrap();
        assert!(created.is_some());
    }

    #[tokio::test]
    async fn test_choose_directory() {
        let (mut app, _runner) = app();
        let key = app.create_project_from_dir("/srv/site").await.unwrap();

        let none = app
            .choose_directory(&key, DirField::Css, &FixedPicker(None))
            .await
            .unwrap();
        assert!(none.is_none());
        assert_eq!(app.project(&key).await.unwrap().css_dir, "");

        let updated = app
            .choose_directory(&key, DirField::Css, &FixedPicker(Some("/srv/site/public/css".into())))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.css_dir, "/srv/site/public/css");
        assert_eq!(app.project(&key).await.unwrap().css_dir, "/srv/site/public/css");
    }

    #[tokio::test]
    async fn test_settings_persist() {
        let (mut app, runner) = app();
        let key = app.create_project_from_dir("/srv/site").await.unwrap();
        app.set_environment(&key, Environment::Production).await.unwrap();
        app.set_output_style(&key, OutputStyle::Compressed).await.unwrap();
        app.set_directory(&key, DirField::Sass, "/srv/site/scss").await.unwrap();

        app.start_watching(&key).await.unwrap();
        let ctx = &runner.starts()[0];
        assert_eq!(ctx.environment, Environment::Production);
        assert_eq!(ctx.output_style, OutputStyle::Compressed);
        assert_eq!(ctx.dirs, vec![(DirField::Sass, "/srv/site/scss".to_string())]);
    }

    #[tokio::test]
    async fn test_start_shows_log_and_streams_output() {
        let (mut app, runner) = app();
        let key = app.create_project_from_dir("/srv/site").await.unwrap();
        assert!(app.visible_log().is_none());

        let outcome = app.start_watching(&key).await.unwrap();
        assert_eq!(outcome, StartOutcome::Starting);
        assert_eq!(app.current_view().pane, Some(Pane::Log));
        assert_eq!(app.visible_log().unwrap().len(), 0);

        let mut rx = app.bus().subscribe();
        runner.running(&key);
        runner.output(&key, "\x1b[33moverwrite\x1b[0m css/screen.css\n");
        assert_eq!(app.pump(), 2);

        assert_eq!(app.state(&key), WatchState::Started);
        let log = app.visible_log().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].text(), "overwrite css/screen.css\n");
        assert!(drain(&mut rx).iter().any(|e| matches!(
            e,
            AppEvent::NewLogOutput { fragments, .. }
                if fragments[0] == Fragment::Colored { color: Color::Yellow, text: "overwrite".into() }
        )));

        app.select_pane(&key, Pane::Configuration);
        assert!(app.visible_log().is_none());
    }

    #[tokio::test]
    async fn test_log_markup_for_export() {
        let (mut app, runner) = app();
        let key = app.create_project_from_dir("/srv/site").await.unwrap();
        assert_eq!(app.log_markup(&key), "");

        app.start_watching(&key).await.unwrap();
        runner.running(&key);
        runner.output(&key, "\x1b[31merror\x1b[0m a<b.scss\n");
        app.pump();
        assert_eq!(
            app.log_markup(&key),
            "<span class=\"red\">error</span> a&lt;b.scss<br />"
        );
    }

    #[tokio::test]
    async fn test_start_missing_project() {
        let (mut app, runner) = app();
        let err = app.start_watching(&ProjectKey::from("gone")).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(runner.starts().is_empty());
    }

    #[tokio::test]
    async fn test_spawn_failure_is_an_outcome() {
        let (mut app, runner) = app();
        let key = app.create_project_from_dir("/srv/site").await.unwrap();
        runner.fail_next_spawn("no compass");

        let outcome = app.start_watching(&key).await.unwrap();
        assert_eq!(app.state(&key), WatchState::Stopped);
        let err = outcome.into_result(&key).unwrap_err();
        assert!(matches!(err, AppError::ProcessSpawnFailure { .. }));
    }

    #[tokio::test]
    async fn test_delete_started_project() {
        let (mut app, runner) = app();
        let key = app.create_project_from_dir("/srv/site").await.unwrap();
        app.start_watching(&key).await.unwrap();
        runner.running(&key);
        runner.output(&key, "watching");
        app.pump();
        assert_eq!(app.state(&key), WatchState::Started);

        app.delete_project(&key).await.unwrap();
        assert!(app.projects().await.unwrap().is_empty());
        assert_eq!(app.state(&key), WatchState::Stopped);
        assert_eq!(runner.stops().len(), 1);
        assert!(app.log(&key).is_empty());
        assert_eq!(app.current_view().selected, None);

        // The exit confirmation arriving afterwards changes nothing.
        runner.exited(&key);
        app.pump();
        assert_eq!(app.state(&key), WatchState::Stopped);
    }

    #[tokio::test]
    async fn test_nuke_all() {
        let (mut app, runner) = app();
        let a = app.create_project_from_dir("/a").await.unwrap();
        let b = app.create_project_from_dir("/b").await.unwrap();
        app.start_watching(&a).await.unwrap();
        app.start_watching(&b).await.unwrap();
        runner.running(&a);
        app.pump();

        app.nuke_all().await.unwrap();
        assert!(app.projects().await.unwrap().is_empty());
        assert_eq!(app.state(&a), WatchState::Stopped);
        assert_eq!(app.state(&b), WatchState::Stopped);
        assert!(app.active_keys().is_empty());
        assert_eq!(app.current_view().selected, None);
    }

    #[tokio::test]
    async fn test_find_by_name() {
        let (mut app, _runner) = app();
        let key = app.create_project_from_dir("/srv/project-a").await.unwrap();
        assert_eq!(app.find_by_name("project-a").await.unwrap().key, key);
        assert!(matches!(
            app.find_by_name("project-z").await,
            Err(AppError::NotFound(name)) if name == "project-z"
        ));
    }
}
