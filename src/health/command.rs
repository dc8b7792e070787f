use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::RecvTimeoutError;

use super::error::HealthError;
use super::Probe;
use crate::reaper::Reaper;

/// A command health check: the first whitespace-separated token is the
/// executable, everything after it is arguments — no shell is involved, so
/// a check command behaves the same way a service's own `command` does.
///
/// Exit status is collected through the shared [`Reaper`] rather than this
/// probe's own `Child::wait`: the reaper's SIGCHLD-driven `waitpid(-1, ...)`
/// loop would otherwise race this probe for the same pid and could reap it
/// first, leaving a `try_wait`/`wait` call here with nothing to observe.
pub struct CommandProbe {
    name: String,
    command: String,
    reaper: Arc<Reaper>,
}

impl CommandProbe {
    pub fn new(name: String, command: String, reaper: Arc<Reaper>) -> Self {
        Self { name, command, reaper }
    }
}

impl Probe for CommandProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, timeout: Duration) -> Result<(), HealthError> {
        let mut tokens = self.command.split_whitespace();
        let program = tokens.next().ok_or_else(|| HealthError::CommandSpawn(
            self.name.clone(),
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
        ))?;

        let mut child = Command::new(program)
            .args(tokens)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| HealthError::CommandSpawn(self.name.clone(), err))?;
        let pid = child.id() as i32;
        let exit_rx = self.reaper.register(pid);

        // Output is captured but not inspected: healthy/unhealthy is decided
        // by exit code alone, and draining here just keeps the child from
        // blocking on a full pipe while we wait for its exit.
        if let Some(mut out) = child.stdout.take() {
            thread::spawn(move || {
                let _ = std::io::copy(&mut out, &mut std::io::sink());
            });
        }
        if let Some(mut err) = child.stderr.take() {
            thread::spawn(move || {
                let _ = std::io::copy(&mut err, &mut std::io::sink());
            });
        }

        match exit_rx.recv_timeout(timeout) {
            Ok(status) => {
                if status.success() {
                    Ok(())
                } else {
                    Err(HealthError::CommandFailed(self.name.clone(), status.code().unwrap_or(-1)))
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                let _ = child.kill();
                // The registration survives the timeout; the reaper delivers
                // this child's exit here whenever it reaps it, same as
                // `Process::terminate`'s grace-then-kill escalation.
                let _ = exit_rx.recv();
                Err(HealthError::Timeout(self.name.clone()))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(HealthError::Timeout(self.name.clone()))
            }
        }
    }
}
