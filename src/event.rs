//! Lifecycle events emitted upwards from a [`crate::manager::ServiceManager`]
//! to the [`crate::supervisor::Supervisor`], and health-change events emitted
//! by a [`crate::health::Monitor`].

use std::time::SystemTime;

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Started,
    Stopped,
    Failed { error: String },
    Restarting,
    HealthChange(crate::health::Status),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub service: String,
    pub pid: u32,
    pub last_exit_code: Option<i32>,
    pub at: SystemTime,
    pub kind: EventKind,
}

impl Event {
    pub fn new(service: impl Into<String>, pid: u32, last_exit_code: Option<i32>, kind: EventKind) -> Self {
        Self {
            service: service.into(),
            pid,
            last_exit_code,
            at: SystemTime::now(),
            kind,
        }
    }
}
