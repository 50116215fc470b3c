use anyhow::{Context, Result};
use dashmap::DashSet;
use std::future::Future;
use std::path::Path;
use std::process::{Output, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, trace};

#[cfg(unix)]
use nix::sys::signal::{self as nix_signal, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

// Task-local so every command a segment spawns, however deep in its provider,
// lands in that segment's tracker.
tokio::task_local! {
    static PROCESS_TRACKER: ProcessTracker;
}

/// Child process groups spawned on behalf of one segment task.
#[derive(Debug, Clone, Default)]
pub struct ProcessTracker {
    pids: Arc<DashSet<u32>>,
    terminated: Arc<AtomicBool>,
}

impl ProcessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `future` with this tracker installed for [`run_command`].
    pub async fn scope<F: Future>(self, future: F) -> F::Output {
        PROCESS_TRACKER.scope(self, future).await
    }

    pub fn current() -> Option<Self> {
        PROCESS_TRACKER.try_with(|tracker| tracker.clone()).ok()
    }

    /// Track a new process group. Once the tracker was terminated, late
    /// arrivals are killed right away.
    pub fn register(&self, pid: u32) {
        if self.is_terminated() {
            kill_group(pid);
            return;
        }

        self.pids.insert(pid);
    }

    pub fn unregister(&self, pid: u32) {
        self.pids.remove(&pid);
    }

    /// Kill every tracked process group.
    pub fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);

        let pids: Vec<u32> = self.pids.iter().map(|pid| *pid).collect();
        for pid in pids {
            debug!(pid, "terminating process group");
            kill_group(pid);
            self.pids.remove(&pid);
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.pids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pids.is_empty()
    }
}

#[cfg(unix)]
fn kill_group(pid: u32) {
    let _ = nix_signal::killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}

/// Run a command in its own process group, registered with the current
/// segment's tracker so a timeout can take the whole group down.
pub async fn run_command(program: &str, args: &[&str], cwd: &Path) -> Result<Output> {
    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    command.process_group(0);

    let child = command
        .spawn()
        .with_context(|| format!("Failed to spawn {}", program))?;

    let tracker = ProcessTracker::current();
    let pid = child.id();

    if let (Some(tracker), Some(pid)) = (&tracker, pid) {
        trace!(pid, program, "tracking process group");
        tracker.register(pid);
    }

    let output = child.wait_with_output().await;

    if let (Some(tracker), Some(pid)) = (&tracker, pid) {
        tracker.unregister(pid);
    }

    output.with_context(|| format!("Failed to wait for {}", program))
}
