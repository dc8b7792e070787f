//! Fleet coordinator: owns every [`ServiceManager`], orders their startup and
//! shutdown by `depends_on`, and fans the Signal Bus out to them.
//!
//! A plain collection of manager handles, generalized to a dependency graph
//! resolved with the same Kahn's-algorithm pass `config::validate` already
//! uses for cycle detection.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use nix::sys::signal::Signal;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::{self, ConfigError, ServiceConfig, SupervisorConfig};
use crate::context::CancelToken;
use crate::event::{Event, EventKind};
use crate::manager::{ManagerError, RunningManager, ServiceManager};
use crate::reaper::Reaper;
use crate::signal::{self, SignalClass, SignalError};

const STARTUP_GRACE: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("invalid configuration:\n{0}")]
    Config(#[from] ConfigError),
    #[error("failed to become child subreaper: `{0}`")]
    Reaper(#[from] crate::reaper::ReaperError),
    #[error("failed to install signal handlers: `{0}`")]
    Signal(#[from] SignalError),
    #[error("service `{0}` never reported started before its dependents needed it")]
    StartupTimeout(String),
    #[error("a manager thread panicked: `{0}`")]
    Manager(#[from] ManagerError),
}

/// Kahn's algorithm over `depends_on`, producing ordered batches (each batch
/// independent of the others, safe to start concurrently) rather than just
/// detecting a cycle. Configuration is assumed already validated, so an empty
/// return here never happens for a non-empty, acyclic `services`.
///
/// A dependency that names a service outside `services` (e.g. a reload's
/// restart set depending on a service that is unchanged and already
/// running) is treated as already satisfied — only ordering among the
/// services actually being started here is enforced.
fn topological_batches(services: &[ServiceConfig]) -> Vec<Vec<String>> {
    let mut in_degree: HashMap<&str, usize> = services.iter().map(|s| (s.name.as_str(), 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for service in services {
        for dep in &service.depends_on {
            if !in_degree.contains_key(dep.as_str()) {
                continue;
            }
            *in_degree.get_mut(service.name.as_str()).unwrap() += 1;
            dependents.entry(dep.as_str()).or_default().push(service.name.as_str());
        }
    }

    let mut batches = Vec::new();
    let mut remaining = in_degree.clone();
    while !remaining.is_empty() {
        let batch: Vec<&str> = remaining
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(name, _)| *name)
            .collect();
        if batch.is_empty() {
            break; // a cycle would already have been rejected by config validation
        }
        for name in &batch {
            remaining.remove(name);
            if let Some(next) = dependents.get(name) {
                for dependent in next {
                    if let Some(deg) = remaining.get_mut(dependent) {
                        *deg -= 1;
                    }
                }
            }
        }
        let mut batch: Vec<String> = batch.into_iter().map(String::from).collect();
        batch.sort();
        batches.push(batch);
    }
    batches
}

struct EventPump {
    last_status: Arc<Mutex<HashMap<String, EventKind>>>,
}

impl EventPump {
    fn spawn(rx: Receiver<Event>, cancel: CancelToken) -> Self {
        let last_status = Arc::new(Mutex::new(HashMap::new()));
        let recorded = last_status.clone();
        std::thread::spawn(move || {
            loop {
                match rx.recv_timeout(Duration::from_millis(200)) {
                    Ok(event) => {
                        log_event(&event);
                        recorded.lock().unwrap().insert(event.service.clone(), event.kind);
                    }
                    Err(channel::RecvTimeoutError::Timeout) => {
                        if cancel.is_cancelled() {
                            break;
                        }
                    }
                    Err(channel::RecvTimeoutError::Disconnected) => break,
                }
            }
        });
        Self { last_status }
    }

    fn wait_started(&self, service: &str, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            match self.last_status.lock().unwrap().get(service) {
                Some(EventKind::Started) => return true,
                Some(EventKind::Failed { .. }) => return false,
                _ => {}
            }
            if std::time::Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }
}

fn log_event(event: &Event) {
    match &event.kind {
        EventKind::Started => info!(service = %event.service, pid = event.pid, "service started"),
        EventKind::Stopped => info!(service = %event.service, "service stopped"),
        EventKind::Failed { error } => warn!(service = %event.service, %error, "service failed"),
        EventKind::Restarting => info!(service = %event.service, "service restarting"),
        EventKind::HealthChange(status) => info!(service = %event.service, ?status, "health changed"),
    }
}

/// The running fleet: every `RunningManager`, the shared Reaper, the Signal
/// Bus, and the event fan-in pump that lets startup wait for `started`.
pub struct Supervisor {
    config_path: PathBuf,
    config: SupervisorConfig,
    managers: HashMap<String, RunningManager>,
    order: Vec<String>,
    reaper: Arc<Reaper>,
    reaper_handle: Option<std::thread::JoinHandle<()>>,
    cancel: CancelToken,
    events_tx: Sender<Event>,
    pump: EventPump,
    signal_rx: Receiver<SignalClass>,
    signal_handle: Option<std::thread::JoinHandle<()>>,
    reload_lock: Arc<Mutex<()>>,
}

impl Supervisor {
    /// Loads configuration, becomes a child subreaper, starts the Reaper and
    /// the Signal Bus, then starts every service batch-by-batch in
    /// dependency order. A batch's managers are started together; the next
    /// batch only begins once every manager in this one has reported
    /// `started` (or the startup grace window has elapsed, which is fatal).
    pub fn start(config_path: PathBuf) -> Result<Self, SupervisorError> {
        let config = config::load(&config_path)?;

        if let Err(err) = crate::reaper::become_subreaper() {
            warn!(%err, "not running as a subreaper-capable process, orphaned grandchildren will not be reaped");
        }
        let cancel = CancelToken::new();
        let reaper = Arc::new(Reaper::new());
        let reaper_handle = reaper.clone().spawn(cancel.clone());

        let (events_tx, events_rx) = channel::unbounded();
        let pump = EventPump::spawn(events_rx, cancel.clone());

        let batches = topological_batches(&config.services);
        let by_name: HashMap<&str, &ServiceConfig> = config.services.iter().map(|s| (s.name.as_str(), s)).collect();

        let mut managers = HashMap::new();
        let mut order = Vec::new();
        for batch in &batches {
            for name in batch {
                let service = by_name.get(name.as_str()).expect("batch name always present in config");
                let manager = ServiceManager::new(
                    (*service).clone(),
                    config.logging.clone(),
                    reaper.clone(),
                    events_tx.clone(),
                    cancel.clone(),
                );
                managers.insert(name.clone(), manager.run());
                order.push(name.clone());
            }
            for name in batch {
                if !pump.wait_started(name, STARTUP_GRACE) {
                    return Err(SupervisorError::StartupTimeout(name.clone()));
                }
            }
        }

        let (signal_tx, signal_rx) = channel::unbounded();
        let signal_handle = signal::spawn(cancel.clone(), move |class| {
            let _ = signal_tx.send(class);
        })?;

        Ok(Self {
            config_path,
            config,
            managers,
            order,
            reaper,
            reaper_handle: Some(reaper_handle),
            cancel,
            events_tx,
            pump,
            signal_rx,
            signal_handle: Some(signal_handle),
            reload_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Drains classified signals on the calling thread until cancellation,
    /// dispatching each to the fleet. Returns once `cancel` fires, whether
    /// from a terminate signal or a programmatic [`Self::cancel_token`] call
    /// — the caller still owns deciding when to call [`Self::shutdown`].
    pub fn run(&mut self) {
        while !self.cancel.is_cancelled() {
            match self.signal_rx.recv_timeout(Duration::from_millis(200)) {
                Ok(class) => {
                    if let Err(err) = self.dispatch(class) {
                        error!(%err, "failed to dispatch signal to fleet");
                    }
                }
                Err(channel::RecvTimeoutError::Timeout) => continue,
                Err(channel::RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Names of every running service, in startup order. Mainly useful for
    /// tests asserting on dependency ordering.
    pub fn service_names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    /// Forwards a signal class to the fleet: terminate triggers shutdown,
    /// reload re-reads configuration, user signals reach every running
    /// child's process directly (never the managers' own shutdown path).
    pub fn dispatch(&mut self, class: SignalClass) -> Result<(), SupervisorError> {
        match class {
            SignalClass::Terminate => {
                self.cancel.cancel();
            }
            SignalClass::Reload => {
                self.reload()?;
                // Any SIGHUP that queued up while the reload above was
                // running is coalesced into one follow-up reload rather
                // than one reload per signal; any other signal class mixed
                // in is preserved and dispatched afterwards, in order.
                let mut pending_reload = false;
                let mut others = Vec::new();
                loop {
                    match self.signal_rx.try_recv() {
                        Ok(SignalClass::Reload) => pending_reload = true,
                        Ok(other) => others.push(other),
                        Err(_) => break,
                    }
                }
                if pending_reload {
                    self.reload()?;
                }
                for other in others {
                    self.dispatch(other)?;
                }
            }
            SignalClass::User => {
                for manager in self.managers.values() {
                    if let Err(err) = manager.signal(Signal::SIGUSR1) {
                        warn!(service = manager.name(), %err, "failed to forward user signal");
                    }
                }
            }
        }
        Ok(())
    }

    /// Re-reads configuration from disk and reconciles the running fleet
    /// against it. Serialized by `reload_lock`: a reload already in flight
    /// when this one arrives is not run twice, the caller is expected to
    /// have coalesced concurrent reload requests before calling in (see
    /// [`Self::request_reload`]).
    pub fn reload(&mut self) -> Result<(), SupervisorError> {
        let reload_lock = self.reload_lock.clone();
        let _held = reload_lock.lock().unwrap();

        let new_config = match config::load(&self.config_path) {
            Ok(config) => config,
            Err(err) => {
                error!(%err, "reload rejected, keeping previous configuration");
                return Ok(());
            }
        };

        let old_by_name: HashMap<&str, &ServiceConfig> = self.config.services.iter().map(|s| (s.name.as_str(), s)).collect();
        let new_by_name: HashMap<&str, &ServiceConfig> = new_config.services.iter().map(|s| (s.name.as_str(), s)).collect();

        let old_names: HashSet<&str> = old_by_name.keys().copied().collect();
        let new_names: HashSet<&str> = new_by_name.keys().copied().collect();

        for removed in old_names.difference(&new_names) {
            if let Some(manager) = self.managers.remove(*removed) {
                manager.stop();
                if let Err(err) = manager.join() {
                    warn!(service = %removed, %err, "manager failed to join after removal");
                }
            }
            self.order.retain(|n| n != removed);
        }

        for unchanged in old_names.intersection(&new_names) {
            if old_by_name[unchanged] == new_by_name[unchanged] {
                if let Some(manager) = self.managers.get(*unchanged) {
                    if let Err(err) = manager.reload() {
                        warn!(service = %unchanged, %err, "failed to forward reload signal");
                    }
                }
            }
        }

        let changed: Vec<&str> = old_names
            .intersection(&new_names)
            .filter(|n| old_by_name[*n] != new_by_name[*n])
            .copied()
            .collect();
        for name in &changed {
            if let Some(manager) = self.managers.remove(*name) {
                manager.stop();
                let _ = manager.join();
            }
        }

        let added: Vec<&str> = new_names.difference(&old_names).copied().collect();
        let to_restart: Vec<ServiceConfig> = changed
            .iter()
            .chain(added.iter())
            .map(|name| new_by_name[name].clone())
            .collect();

        for batch in topological_batches(&to_restart) {
            for name in &batch {
                let service = new_by_name[name.as_str()];
                let manager = ServiceManager::new(
                    service.clone(),
                    new_config.logging.clone(),
                    self.reaper.clone(),
                    self.events_tx.clone(),
                    self.cancel.clone(),
                );
                self.managers.insert(name.clone(), manager.run());
                if !self.order.contains(name) {
                    self.order.push(name.clone());
                }
            }
            for name in &batch {
                if !self.pump.wait_started(name, STARTUP_GRACE) {
                    warn!(service = %name, "service did not report started after reload");
                }
            }
        }

        self.config = new_config;
        info!("reload complete");
        Ok(())
    }

    /// Cancels every manager in reverse startup order, waits for each to
    /// join (bounded by the 30s grace each manager's own cancel-watcher
    /// enforces internally) — which also closes and fsyncs that service's
    /// output sinks, since each manager's loop closes its sinks right after
    /// its process exits — then tears down the Reaper and Signal Bus.
    pub fn shutdown(mut self) {
        self.cancel.cancel();
        for name in self.order.iter().rev() {
            if let Some(manager) = self.managers.remove(name) {
                manager.stop();
                if let Err(err) = manager.join() {
                    warn!(service = %name, %err, "manager failed to join during shutdown");
                }
            }
        }
        if let Some(handle) = self.signal_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.reaper_handle.take() {
            let _ = handle.join();
        }
    }

    /// Blocks the calling thread until cancellation fires (terminate signal,
    /// or a programmatic cancel), then returns without shutting down —
    /// the caller decides when to actually call [`Self::shutdown`].
    pub fn block_until_cancelled(&self) {
        self.cancel.block_until_cancelled();
    }
}
