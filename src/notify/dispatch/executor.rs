//! Detached command execution.
//!
//! Commands are queued on an unbounded channel and launched by a background
//! Tokio task, each in its own shell. The submitting thread never waits for a
//! launch, let alone for the command to finish. Exit status and launch
//! failures are logged and otherwise dropped.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};

use crate::config::HookConfig;
use crate::notify::dispatch::CommandSink;

/// Resource limits for launched commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecLimits {
    /// Commands allowed to run at once. `None` = unbounded.
    pub max_concurrent: Option<usize>,

    /// Kill a command that runs longer than this.
    pub timeout: Option<Duration>,
}

impl From<&HookConfig> for ExecLimits {
    fn from(config: &HookConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent,
            timeout: config.command_timeout,
        }
    }
}

/// Fire-and-forget shell command runner.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    queue: mpsc::UnboundedSender<String>,
}

impl CommandExecutor {
    /// Starts the executor on a dedicated thread with its own Tokio runtime.
    ///
    /// The thread exits once every handle to the executor has been dropped.
    /// Commands that are still running are left alone.
    pub fn start(limits: ExecLimits) -> anyhow::Result<Self> {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("notify-exec")
            .build()
            .context("building executor runtime")?;

        let (queue, rx) = mpsc::unbounded_channel();

        std::thread::Builder::new()
            .name("notify-exec-pump".to_string())
            .spawn(move || rt.block_on(pump(rx, limits)))
            .context("spawning executor thread")?;

        log::info!("[EXEC] started (limits: {:?})", limits);
        Ok(Self { queue })
    }

    /// Starts the executor as a task on an existing runtime.
    pub fn spawn_on(handle: &tokio::runtime::Handle, limits: ExecLimits) -> Self {
        let (queue, rx) = mpsc::unbounded_channel();
        handle.spawn(pump(rx, limits));
        Self { queue }
    }
}

impl CommandSink for CommandExecutor {
    fn submit(&self, command: String) {
        if let Err(e) = self.queue.send(command) {
            log::warn!("[EXEC] executor stopped, dropping `{}`", e.0);
        }
    }
}

async fn pump(mut rx: mpsc::UnboundedReceiver<String>, limits: ExecLimits) {
    let permits = limits
        .max_concurrent
        .map(|n| Arc::new(Semaphore::new(n.max(1))));

    while let Some(command) = rx.recv().await {
        // With a bound, waiting happens here, never in `submit`.
        let permit = match &permits {
            Some(sem) => match sem.clone().acquire_owned().await {
                Ok(p) => Some(p),
                Err(_) => break,
            },
            None => None,
        };

        let child = match shell(&command).spawn() {
            Ok(child) => child,
            Err(e) => {
                log::warn!("[EXEC] failed to launch `{}`: {}", command, e);
                continue;
            }
        };
        log::trace!("[EXEC] launched `{}` (pid {:?})", command, child.id());

        tokio::spawn(supervise(command, child, limits.timeout, permit));
    }

    log::debug!("[EXEC] queue closed");
}

async fn supervise(
    command: String,
    mut child: Child,
    timeout: Option<Duration>,
    _permit: Option<OwnedSemaphorePermit>,
) {
    let status = match timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => status,
            Err(_) => {
                log::warn!("[EXEC] `{}` timed out after {:?}, killing", command, limit);
                if let Err(e) = child.kill().await {
                    log::warn!("[EXEC] failed to kill `{}`: {}", command, e);
                }
                return;
            }
        },
        None => child.wait().await,
    };

    match status {
        Ok(s) if s.success() => log::trace!("[EXEC] `{}` finished", command),
        Ok(s) => log::warn!("[EXEC] `{}` exited with {}", command, s),
        Err(e) => log::warn!("[EXEC] waiting for `{}` failed: {}", command, e),
    }
}

/// The host command interpreter invocation for `command`.
fn shell(command: &str) -> Command {
    #[cfg(windows)]
    let mut cmd = {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command);
        c
    };
    #[cfg(not(windows))]
    let mut cmd = {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command);
        c
    };

    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    cmd
}
