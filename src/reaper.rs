//! PID1 child reaper.
//!
//! When running as PID1 (or anywhere else with no better parent to do it),
//! orphaned grandchildren end up reparented to us and must be waited on or
//! they pile up as zombies. `set_child_subreaper` marks this process as the
//! reaper of last resort for its whole descendant tree. A dedicated thread
//! blocks on SIGCHLD (via the same `signal-hook` iterator the Signal Bus
//! uses) and, each time it wakes, drains every exited child with a
//! non-blocking `waitpid(-1, WNOHANG)` loop, handing each exit to whichever
//! [`crate::process::Process`] registered that pid, if any.
//!
//! Waking on SIGCHLD rather than blocking in `waitpid(-1, None)` directly
//! matters at startup: this thread is started before any service has
//! spawned, and a blocking wait with zero children outstanding fails
//! immediately with `ECHILD` — it would exit before there was anything to
//! reap. A signal-driven wait simply blocks until the first child exits,
//! however long that takes.

use crossbeam::channel::{self, Receiver, Sender};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use signal_hook::consts::SIGCHLD;
use signal_hook::iterator::Signals;
use std::collections::HashMap;
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::context::CancelToken;

#[derive(Error, Debug)]
pub enum ReaperError {
    #[error("failed to mark process as child subreaper: `{0}`")]
    SetSubreaper(#[source] nix::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Exited(i32),
    Signaled(i32),
}

impl ExitStatus {
    pub fn success(self) -> bool {
        matches!(self, ExitStatus::Exited(0))
    }

    pub fn code(self) -> Option<i32> {
        match self {
            ExitStatus::Exited(code) => Some(code),
            ExitStatus::Signaled(_) => None,
        }
    }
}

/// Marks the current process as a subreaper for its descendants. Must be
/// called once, early, before any service is spawned.
pub fn become_subreaper() -> Result<(), ReaperError> {
    nix::sys::prctl::set_child_subreaper(true).map_err(ReaperError::SetSubreaper)
}

#[derive(Default)]
pub struct Reaper {
    registry: Mutex<HashMap<i32, Sender<ExitStatus>>>,
}

impl Reaper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers interest in a pid's exit, returning the receiver side of a
    /// one-shot channel that the reaper thread fulfils when it reaps it.
    pub fn register(&self, pid: i32) -> Receiver<ExitStatus> {
        let (tx, rx) = channel::bounded(1);
        self.registry.lock().unwrap().insert(pid, tx);
        rx
    }

    pub fn unregister(&self, pid: i32) {
        self.registry.lock().unwrap().remove(&pid);
    }

    /// Runs the SIGCHLD-driven reaping loop on a dedicated thread until
    /// `cancel` fires. Each wake drains every exited child with non-blocking
    /// `waitpid` calls before going back to sleep on the next signal.
    pub fn spawn(self: std::sync::Arc<Self>, cancel: CancelToken) -> JoinHandle<()> {
        let signals = match Signals::new([SIGCHLD]) {
            Ok(signals) => signals,
            Err(err) => {
                error!(%err, "failed to register SIGCHLD handler, reaper disabled");
                return thread::spawn(|| {});
            }
        };
        let handle = signals.handle();

        let join = thread::spawn(move || {
            let mut signals = signals;
            self.drain();
            for _ in &mut signals {
                self.drain();
                if cancel.is_cancelled() {
                    break;
                }
            }
            debug!("reaper thread exiting");
        });

        thread::spawn(move || {
            cancel.block_until_cancelled();
            handle.close();
        });

        join
    }

    /// Reaps every child currently waitable without blocking, dispatching
    /// each exit as it's collected. Stops at the first `WouldBlock`/`ECHILD`.
    fn drain(&self) {
        loop {
            match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::Exited(pid, code)) => {
                    self.dispatch(pid.as_raw(), ExitStatus::Exited(code));
                }
                Ok(WaitStatus::Signaled(pid, signal, _)) => {
                    self.dispatch(pid.as_raw(), ExitStatus::Signaled(signal as i32));
                }
                Ok(WaitStatus::StillAlive) => break,
                Ok(_) => {
                    // Stopped/Continued/PtraceEvent: not a terminal state, keep draining.
                }
                Err(nix::errno::Errno::ECHILD) => break,
                Err(nix::errno::Errno::EINTR) => continue,
                Err(err) => {
                    error!(%err, "waitpid failed");
                    break;
                }
            }
        }
    }

    fn dispatch(&self, pid: i32, status: ExitStatus) {
        let sender = self.registry.lock().unwrap().remove(&pid);
        match sender {
            Some(sender) => {
                debug!(pid, ?status, "reaped registered child");
                let _ = sender.send(status);
            }
            None => {
                warn!(pid, ?status, "reaped unregistered grandchild");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn register_then_dispatch_delivers_status() {
        let reaper = Arc::new(Reaper::new());
        let rx = reaper.register(4242);
        reaper.dispatch(4242, ExitStatus::Exited(0));
        let status = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(status.success());
    }

    #[test]
    fn dispatch_for_unregistered_pid_does_not_panic() {
        let reaper = Reaper::new();
        reaper.dispatch(9999, ExitStatus::Exited(1));
    }

    #[test]
    fn unregister_removes_entry() {
        let reaper = Reaper::new();
        let _rx = reaper.register(10);
        reaper.unregister(10);
        assert!(reaper.registry.lock().unwrap().get(&10).is_none());
    }

    #[test]
    fn exit_status_code_reports_none_for_signals() {
        assert_eq!(ExitStatus::Exited(7).code(), Some(7));
        assert_eq!(ExitStatus::Signaled(9).code(), None);
        assert!(!ExitStatus::Signaled(9).success());
    }
}
