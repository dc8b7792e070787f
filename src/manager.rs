//! Per-service supervision loop: starts a process, waits for it to exit,
//! asks the [`crate::restart::RestartLedger`] whether to restart it, and
//! repeats, driving the full restart-policy model and health-driven events
//! rather than a single hardcoded restart-exit-code list.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::Sender;
use nix::sys::signal::Signal;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::{GlobalLoggingConfig, ServiceConfig};
use crate::context::CancelToken;
use crate::event::{Event, EventKind};
use crate::health::{Monitor, Status};
use crate::output::{build_service_sinks, FanoutWriter};
use crate::process::{Process, ProcessError, Started};
use crate::reaper::Reaper;
use crate::restart::{RestartDecision, RestartLedger};

/// The 30s grace window §4.8/§5 give a cancelled manager to stop its child
/// before the process layer escalates to SIGKILL.
const STOP_GRACE: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("manager thread panicked")]
    ThreadPanicked,
}

type SinkBuilder = Arc<dyn Fn(&ServiceConfig, &GlobalLoggingConfig) -> (Option<FanoutWriter>, Option<FanoutWriter>) + Send + Sync>;

/// A not-yet-started manager: everything it needs to spawn the service, and
/// nothing that would let a caller signal or join it before it's running.
pub struct ServiceManager {
    config: ServiceConfig,
    logging: GlobalLoggingConfig,
    reaper: Arc<Reaper>,
    events: Sender<Event>,
    cancel: CancelToken,
    sinks: SinkBuilder,
}

impl ServiceManager {
    pub fn new(
        config: ServiceConfig,
        logging: GlobalLoggingConfig,
        reaper: Arc<Reaper>,
        events: Sender<Event>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            config,
            logging,
            reaper,
            events,
            cancel,
            sinks: Arc::new(build_service_sinks),
        }
    }

    /// Substitutes the sink builder, so tests can drive the loop without
    /// touching the filesystem.
    #[cfg(test)]
    pub fn with_sinks(mut self, sinks: SinkBuilder) -> Self {
        self.sinks = sinks;
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Consumes the manager and starts its supervision loop on a dedicated
    /// thread, returning a handle that can signal or stop it.
    pub fn run(self) -> RunningManager {
        let name = self.config.name.clone();
        let current: Arc<Mutex<Option<Arc<Process<Started>>>>> = Arc::new(Mutex::new(None));
        let handle = spawn_loop(
            self.config,
            self.logging,
            self.cancel.clone(),
            self.reaper,
            self.events,
            self.sinks,
            current.clone(),
        );
        RunningManager {
            name,
            cancel: self.cancel,
            current,
            handle: Some(handle),
        }
    }
}

/// A manager whose supervision loop is running on its own thread.
pub struct RunningManager {
    name: String,
    cancel: CancelToken,
    current: Arc<Mutex<Option<Arc<Process<Started>>>>>,
    handle: Option<JoinHandle<()>>,
}

impl RunningManager {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cancels the supervision loop. The loop itself owns stopping the
    /// running child with the standard grace/kill escalation; this call
    /// does not block on that.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn join(mut self) -> Result<(), ManagerError> {
        if let Some(handle) = self.handle.take() {
            handle.join().map_err(|_| ManagerError::ThreadPanicked)?;
        }
        Ok(())
    }

    /// Forwards a signal to the currently running child, if any. A no-op
    /// when the service has no process running right now (stopped, between
    /// restart attempts, or backing off).
    pub fn signal(&self, signal: Signal) -> Result<(), ProcessError> {
        match self.current.lock().unwrap().as_ref() {
            Some(process) => process.signal(signal),
            None => Ok(()),
        }
    }

    /// Convenience for forwarding SIGHUP, per §4.8's reload contract:
    /// configuration changes are adopted only at the child's next spawn.
    pub fn reload(&self) -> Result<(), ProcessError> {
        self.signal(Signal::SIGHUP)
    }

    pub fn pid(&self) -> Option<i32> {
        self.current.lock().unwrap().as_ref().map(|p| p.pid())
    }
}

#[allow(clippy::too_many_arguments)]
fn spawn_loop(
    config: ServiceConfig,
    logging: GlobalLoggingConfig,
    cancel: CancelToken,
    reaper: Arc<Reaper>,
    events: Sender<Event>,
    sinks: SinkBuilder,
    current: Arc<Mutex<Option<Arc<Process<Started>>>>>,
) -> JoinHandle<()> {
    {
        let cancel = cancel.clone();
        let current = current.clone();
        let name = config.name.clone();
        thread::spawn(move || {
            cancel.block_until_cancelled();
            if let Some(process) = current.lock().unwrap().as_ref() {
                info!(service = %name, "stopping service for shutdown");
                let _ = process.terminate(STOP_GRACE);
            }
        });
    }

    thread::spawn(move || {
        let mut ledger = RestartLedger::new(config.restart.clone());
        let mut first_attempt = true;

        loop {
            if cancel.is_cancelled() {
                break;
            }
            if !first_attempt {
                events.send(Event::new(&config.name, 0, None, EventKind::Restarting)).ok();
            }
            first_attempt = false;

            let unstarted = match Process::new(&config) {
                Ok(p) => p,
                Err(err) => {
                    error!(service = %config.name, %err, "failed to prepare process");
                    events
                        .send(Event::new(&config.name, 0, None, EventKind::Failed { error: err.to_string() }))
                        .ok();
                    match ledger.record_exit(None, Duration::ZERO, false) {
                        RestartDecision::Stop => break,
                        RestartDecision::Restart(delay) => {
                            if cancel.wait_timeout(delay) {
                                break;
                            }
                            continue;
                        }
                    }
                }
            };

            let (stdout, stderr) = (sinks)(&config, &logging);
            let started = match unstarted.start(&reaper, stdout, stderr) {
                Ok(p) => Arc::new(p),
                Err(err) => {
                    error!(service = %config.name, %err, "failed to start process");
                    events
                        .send(Event::new(&config.name, 0, None, EventKind::Failed { error: err.to_string() }))
                        .ok();
                    match ledger.record_exit(None, Duration::ZERO, false) {
                        RestartDecision::Stop => break,
                        RestartDecision::Restart(delay) => {
                            if cancel.wait_timeout(delay) {
                                break;
                            }
                            continue;
                        }
                    }
                }
            };

            *current.lock().unwrap() = Some(started.clone());
            events
                .send(Event::new(&config.name, started.pid() as u32, None, EventKind::Started))
                .ok();

            let health_monitor = (!config.health_checks.is_empty() && !config.oneshot).then(|| {
                let events = events.clone();
                let name = config.name.clone();
                Monitor::spawn(config.name.clone(), config.health_checks.clone(), cancel.clone(), reaper.clone(), move |status: Status| {
                    events
                        .send(Event::new(&name, 0, None, EventKind::HealthChange(status)))
                        .ok();
                })
            });

            let exit = started.wait();
            *current.lock().unwrap() = None;
            if let Some(monitor) = health_monitor {
                monitor.join();
            }
            started.close_sinks();

            let stopped_deliberately = cancel.is_cancelled();
            let (code, success) = match exit {
                Ok(status) => (status.code(), status.success()),
                Err(err) => {
                    warn!(service = %config.name, %err, "lost track of process exit status");
                    (None, false)
                }
            };

            if success {
                events.send(Event::new(&config.name, 0, code, EventKind::Stopped)).ok();
            } else {
                events
                    .send(Event::new(&config.name, 0, code, EventKind::Failed { error: format!("exited with code {code:?}") }))
                    .ok();
            }

            if config.oneshot {
                break;
            }

            match ledger.record_exit(code, started.uptime(), stopped_deliberately) {
                RestartDecision::Stop => break,
                RestartDecision::Restart(delay) => {
                    if cancel.wait_timeout(delay) {
                        break;
                    }
                }
            }
        }
        info!(service = %config.name, "service manager loop exiting");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RestartConfig;
    use crate::event::EventKind;
    use std::collections::{BTreeSet, HashMap};

    fn oneshot_config(command: &str) -> ServiceConfig {
        ServiceConfig {
            name: "test-svc".to_string(),
            command: command.to_string(),
            args: Vec::new(),
            working_dir: None,
            environment: HashMap::new(),
            user: None,
            group: None,
            restart: RestartConfig::default(),
            health_checks: Vec::new(),
            logging: Default::default(),
            depends_on: BTreeSet::new(),
            oneshot: true,
        }
    }

    fn no_sinks(_: &ServiceConfig, _: &GlobalLoggingConfig) -> (Option<FanoutWriter>, Option<FanoutWriter>) {
        (None, None)
    }

    #[test]
    fn oneshot_success_emits_started_then_stopped() {
        let (tx, rx) = crossbeam::channel::unbounded();
        let reaper = Arc::new(Reaper::new());
        reaper.clone().spawn(CancelToken::new());
        let manager = ServiceManager::new(
            oneshot_config("true"),
            GlobalLoggingConfig::default(),
            reaper,
            tx,
            CancelToken::new(),
        )
        .with_sinks(Arc::new(no_sinks));
        let running = manager.run();
        running.join().unwrap();

        let events: Vec<EventKind> = rx.try_iter().map(|e| e.kind).collect();
        assert_eq!(events, vec![EventKind::Started, EventKind::Stopped]);
    }

    #[test]
    fn oneshot_failure_emits_started_then_failed_with_no_restart() {
        let (tx, rx) = crossbeam::channel::unbounded();
        let reaper = Arc::new(Reaper::new());
        reaper.clone().spawn(CancelToken::new());
        let manager = ServiceManager::new(
            oneshot_config("false"),
            GlobalLoggingConfig::default(),
            reaper,
            tx,
            CancelToken::new(),
        )
        .with_sinks(Arc::new(no_sinks));
        let running = manager.run();
        running.join().unwrap();

        let events: Vec<EventKind> = rx.try_iter().map(|e| e.kind).collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], EventKind::Started);
        assert!(matches!(events[1], EventKind::Failed { .. }));
    }

    #[test]
    fn stop_before_restart_delay_elapses_exits_promptly() {
        let (tx, _rx) = crossbeam::channel::unbounded();
        let reaper = Arc::new(Reaper::new());
        reaper.clone().spawn(CancelToken::new());
        let mut config = oneshot_config("false");
        config.oneshot = false;
        config.restart = RestartConfig {
            policy: crate::config::RestartPolicyKind::Always,
            max_retries: 0,
            delay: Duration::from_secs(30),
            delay_max: Duration::from_secs(60),
        };
        let cancel = CancelToken::new();
        let manager = ServiceManager::new(config, GlobalLoggingConfig::default(), reaper, tx, cancel.clone())
            .with_sinks(Arc::new(no_sinks));
        let running = manager.run();
        thread::sleep(Duration::from_millis(100));
        running.stop();
        // Cancellation wakes the backoff sleep immediately rather than
        // waiting out the full 30s delay.
        running.join().unwrap();
    }
}
