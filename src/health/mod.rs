//! Health monitor: periodic probes per service that turn a handful of
//! consecutive failures into a status transition the supervisor can act on.
//! Each service can declare N probes, each with its own interval, and the
//! worst reported status wins.

mod command;
mod error;
mod http;
mod monitor;
mod tcp;

pub use command::CommandProbe;
pub use error::HealthError;
pub use http::{HttpClient, HttpProbe, UreqClient};
pub use monitor::Monitor;
pub use tcp::TcpProbe;

use crate::config::HealthCheckConfig;
use crate::reaper::Reaper;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Unknown,
    Healthy,
    Degraded,
    Unhealthy,
}

/// A single health probe: one HTTP call, TCP connect attempt, or command
/// invocation. Implementations should not retry internally — [`Monitor`]
/// owns the retry/consecutive-failure bookkeeping.
pub trait Probe: Send {
    fn name(&self) -> &str;
    fn check(&self, timeout: Duration) -> Result<(), HealthError>;
}

pub fn build_probe(config: &HealthCheckConfig, reaper: Arc<Reaper>) -> Box<dyn Probe> {
    match config {
        HealthCheckConfig::Http {
            url,
            method,
            status_code,
            ..
        } => Box::new(HttpProbe::new(
            config.name(),
            url.clone(),
            method.clone(),
            *status_code,
            UreqClient::default(),
        )),
        HealthCheckConfig::Tcp { host, port, .. } => {
            Box::new(TcpProbe::new(config.name(), host.clone(), *port))
        }
        HealthCheckConfig::Command { command, .. } => {
            Box::new(CommandProbe::new(config.name(), command.clone(), reaper))
        }
    }
}
