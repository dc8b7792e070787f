//! Signal bus: a single thread consumes OS signals through `signal-hook` and
//! classifies them, so the rest of the engine never installs its own handler.
//!
//! Three classes matter to the supervisor: a terminate class that triggers
//! graceful fleet shutdown, a reload class that triggers a config reload, and
//! SIGCHLD, which wakes the [`crate::reaper::Reaper`] rather than going
//! through this bus at all (the reaper registers it with `signal-hook` too,
//! since a PID1 process may need both in the same run).

use signal_hook::consts::{SIGHUP, SIGINT, SIGQUIT, SIGTERM, SIGUSR1, SIGUSR2};
use signal_hook::iterator::Signals;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, info};

use crate::context::CancelToken;

#[derive(Error, Debug)]
pub enum SignalError {
    #[error("failed to register signal handlers: `{0}`")]
    Register(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalClass {
    Terminate,
    Reload,
    User,
}

fn classify(signal: i32) -> Option<SignalClass> {
    match signal {
        SIGTERM | SIGINT | SIGQUIT => Some(SignalClass::Terminate),
        SIGHUP => Some(SignalClass::Reload),
        SIGUSR1 | SIGUSR2 => Some(SignalClass::User),
        _ => None,
    }
}

/// Runs the signal-consuming loop on a dedicated thread until `cancel` fires,
/// invoking `on_signal` for every classified signal received meanwhile.
pub fn spawn(
    cancel: CancelToken,
    on_signal: impl Fn(SignalClass) + Send + 'static,
) -> Result<JoinHandle<()>, SignalError> {
    let mut signals = Signals::new([SIGTERM, SIGINT, SIGQUIT, SIGHUP, SIGUSR1, SIGUSR2])?;
    let handle = signals.handle();

    let join = thread::spawn(move || {
        for signal in &mut signals {
            if let Some(class) = classify(signal) {
                debug!(signal, ?class, "received classified signal");
                on_signal(class);
            } else {
                debug!(signal, "received unclassified signal, ignoring");
            }
            if cancel.is_cancelled() {
                break;
            }
        }
        info!("signal bus shutting down");
    });

    // Closing the handle unblocks the iterator once `cancel` has already
    // fired and no further signal arrives to wake it on its own.
    thread::spawn(move || {
        cancel.block_until_cancelled();
        handle.close();
    });

    Ok(join)
}
