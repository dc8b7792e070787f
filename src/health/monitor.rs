//! Runs every configured probe for a service on its own ticking thread and
//! aggregates their individual results into one [`super::Status`] for the
//! service, calling back whenever that aggregate changes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, info};

use super::{build_probe, Status};
use crate::config::HealthCheckConfig;
use crate::context::CancelToken;
use crate::reaper::Reaper;

/// A probe's own recorded status is binary (`Healthy`/`Unhealthy`), or
/// `Unknown` before its first result; `Degraded` only ever appears as the
/// service-wide aggregate, never as a single checker's last result.
struct ProbeState {
    consecutive_failures: u32,
    retries: u32,
    status: Status,
}

pub struct Monitor {
    handles: Vec<JoinHandle<()>>,
}

impl Monitor {
    /// Spawns one thread per health check and returns immediately; join
    /// handles are retained only so shutdown can wait for them to notice
    /// `cancel` and stop.
    pub fn spawn(
        service: String,
        checks: Vec<HealthCheckConfig>,
        cancel: CancelToken,
        reaper: Arc<Reaper>,
        on_change: impl Fn(Status) + Send + Sync + 'static,
    ) -> Self {
        let on_change = Arc::new(on_change);
        let aggregate: Arc<Mutex<HashMap<String, ProbeState>>> = Arc::new(Mutex::new(
            checks
                .iter()
                .map(|c| {
                    (
                        c.name(),
                        ProbeState {
                            consecutive_failures: 0,
                            retries: c.retries(),
                            status: Status::Unknown,
                        },
                    )
                })
                .collect(),
        ));

        let mut handles = Vec::with_capacity(checks.len());
        for check in checks {
            let service = service.clone();
            let cancel = cancel.clone();
            let aggregate = aggregate.clone();
            let on_change = on_change.clone();
            let interval = check.interval();
            let timeout = check.timeout();
            let probe = build_probe(&check, reaper.clone());
            let name = check.name();

            handles.push(thread::spawn(move || {
                let mut first = true;
                loop {
                    // The first probe fires immediately on start; every
                    // subsequent one waits a full interval first.
                    if !first && cancel.wait_timeout(interval) {
                        break;
                    }
                    if first && cancel.is_cancelled() {
                        break;
                    }
                    first = false;

                    let result = if cancel.is_cancelled() {
                        Err(crate::health::HealthError::Cancelled(name.clone()))
                    } else {
                        probe.check(timeout)
                    };
                    let previous_overall = overall(&aggregate);
                    {
                        let mut guard = aggregate.lock().unwrap();
                        let state = guard.get_mut(&name).expect("probe registered at spawn");
                        match result {
                            Ok(()) => {
                                state.consecutive_failures = 0;
                                state.status = Status::Healthy;
                            }
                            Err(err) => {
                                state.consecutive_failures += 1;
                                debug!(service = %service, probe = %name, %err, failures = state.consecutive_failures, "health probe failed");
                                if state.consecutive_failures >= state.retries {
                                    state.status = Status::Unhealthy;
                                }
                            }
                        }
                    }
                    let new_overall = overall(&aggregate);
                    if new_overall != previous_overall {
                        info!(service = %service, ?new_overall, "service health changed");
                        on_change(new_overall);
                    }
                }
            }));
        }

        Self { handles }
    }

    pub fn join(self) {
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

/// Implements the aggregate rule of the service's data model: unhealthy iff
/// every recorded checker is unhealthy, degraded iff some but not all are,
/// healthy iff none are unhealthy and at least one result is in, unknown
/// before any checker has reported.
fn overall(aggregate: &Arc<Mutex<HashMap<String, ProbeState>>>) -> Status {
    let guard = aggregate.lock().unwrap();
    let known: Vec<Status> = guard
        .values()
        .map(|s| s.status)
        .filter(|s| *s != Status::Unknown)
        .collect();
    let unhealthy = known.iter().filter(|s| **s == Status::Unhealthy).count();

    if known.is_empty() {
        Status::Unknown
    } else if unhealthy == known.len() {
        Status::Unhealthy
    } else if unhealthy > 0 {
        Status::Degraded
    } else {
        Status::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[test]
    fn empty_checks_produce_no_threads() {
        let cancel = CancelToken::new();
        let monitor = Monitor::spawn("svc".into(), vec![], cancel.clone(), Arc::new(Reaper::new()), |_| {});
        cancel.cancel();
        monitor.join();
    }

    #[test]
    fn unreachable_tcp_check_eventually_reports_unhealthy() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let cancel = CancelToken::new();
        let checks = vec![HealthCheckConfig::Tcp {
            name: Some("probe".into()),
            host: "127.0.0.1".into(),
            port: 1,
            interval: Duration::from_millis(10),
            timeout: Duration::from_millis(5),
            retries: 1,
        }];
        let monitor = Monitor::spawn("svc".into(), checks, cancel.clone(), Arc::new(Reaper::new()), move |status| {
            if status == Status::Unhealthy {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            }
        });
        thread::sleep(Duration::from_millis(100));
        cancel.cancel();
        monitor.join();
        assert!(calls.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn mixed_results_aggregate_to_degraded() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let cancel = CancelToken::new();
        let checks = vec![
            HealthCheckConfig::Tcp {
                name: Some("up".into()),
                host: "127.0.0.1".into(),
                port,
                interval: Duration::from_millis(10),
                timeout: Duration::from_millis(5),
                retries: 1,
            },
            HealthCheckConfig::Tcp {
                name: Some("down".into()),
                host: "127.0.0.1".into(),
                port: 1,
                interval: Duration::from_millis(10),
                timeout: Duration::from_millis(5),
                retries: 1,
            },
        ];
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let monitor = Monitor::spawn("svc".into(), checks, cancel.clone(), Arc::new(Reaper::new()), move |status| {
            seen_clone.lock().unwrap().push(status);
        });
        thread::sleep(Duration::from_millis(100));
        cancel.cancel();
        monitor.join();
        assert!(seen.lock().unwrap().contains(&Status::Degraded));
        drop(listener);
    }
}
