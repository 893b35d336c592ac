use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use scout_core::project::ProjectKey;
use scout_core::runner::{ProcessRunner, RunId, RunnerError, RunnerEvents, WatchContext};

/// Grace period between SIGTERM and SIGKILL
const STOP_GRACE: Duration = Duration::from_secs(2);

struct WatchHandle {
    run: RunId,
    kill_tx: oneshot::Sender<()>,
}

/// Runs `compass watch` (or the configured command) as a child process per
/// project, in its own process group so the whole tree can be signalled.
pub struct CompassRunner {
    command: Vec<String>,
    watchers: BTreeMap<ProjectKey, WatchHandle>,
}

impl CompassRunner {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            watchers: BTreeMap::new(),
        }
    }

    fn build(&self, ctx: &WatchContext) -> Option<Command> {
        let (program, prefix) = self.command.split_first()?;
        let mut cmd = Command::new(program);
        cmd.args(prefix);
        cmd.args(ctx.compass_args());

        if !ctx.project_dir.is_empty() {
            cmd.current_dir(&ctx.project_dir);
        }

        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }

        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);
        Some(cmd)
    }
}

fn forward<R>(reader: R, events: RunnerEvents) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                // Compass may print file names that are not UTF-8.
                Ok(_) => events.output(String::from_utf8_lossy(&buf).into_owned()),
                Err(e) => {
                    tracing::warn!(key = %events.key(), error = %e, "watcher output read failed");
                    break;
                }
            }
        }
    })
}

/// Terminate the child: SIGTERM to its group, SIGKILL after the grace period
async fn terminate(child: &mut Child, pgid: i32) {
    #[cfg(unix)]
    if pgid > 0 {
        unsafe {
            libc::killpg(pgid, libc::SIGTERM);
        }
        if tokio::time::timeout(STOP_GRACE, child.wait()).await.is_err() {
            unsafe {
                libc::killpg(pgid, libc::SIGKILL);
            }
        }
        return;
    }

    let _ = pgid;
    let _ = child.kill().await;
}

impl ProcessRunner for CompassRunner {
    fn name(&self) -> &'static str {
        "compass"
    }

    fn start(&mut self, ctx: WatchContext, events: RunnerEvents) -> Result<(), RunnerError> {
        let spawn_failed = |message: String| RunnerError::SpawnFailed {
            key: ctx.key.clone(),
            message,
        };

        // The wait task drops its end once the watcher has exited.
        self.watchers.retain(|_, handle| !handle.kill_tx.is_closed());

        let mut cmd = self
            .build(&ctx)
            .ok_or_else(|| spawn_failed("empty watch command".into()))?;
        let mut child = cmd.spawn().map_err(|e| spawn_failed(e.to_string()))?;
        let pgid = child.id().map(|pid| pid as i32).unwrap_or(-1);
        tracing::debug!(key = %ctx.key, pid = pgid, args = ?ctx.compass_args(), "watcher spawned");

        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(forward(stdout, events.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(forward(stderr, events.clone()));
        }

        let run = events.run();
        let (kill_tx, mut kill_rx) = oneshot::channel::<()>();
        events.running();

        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = &mut kill_rx => {
                    terminate(&mut child, pgid).await;
                    child.wait().await
                }
            };
            // Drain what the process wrote before reporting the exit.
            for reader in readers {
                let _ = reader.await;
            }
            let code = status.ok().and_then(|s| s.code());
            events.exited(code);
        });

        self.watchers
            .insert(ctx.key.clone(), WatchHandle { run, kill_tx });
        Ok(())
    }

    fn stop(&mut self, key: &ProjectKey, run: RunId) -> Result<(), RunnerError> {
        let stop_failed = |message: &str| RunnerError::StopFailed {
            key: key.clone(),
            message: message.to_string(),
        };

        match self.watchers.remove(key) {
            Some(handle) if handle.run == run => {
                if handle.kill_tx.send(()).is_err() {
                    // Exited on its own; the exit report is already on its way.
                    tracing::debug!(key = %key, run, "stop for watcher that already exited");
                }
                Ok(())
            }
            Some(handle) => {
                self.watchers.insert(key.clone(), handle);
                Err(stop_failed("no such run"))
            }
            None => Err(stop_failed("watcher not running")),
        }
    }
}
