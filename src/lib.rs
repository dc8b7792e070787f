pub mod cli;
pub mod config;
pub mod context;
pub mod credentials;
pub mod event;
pub mod health;
pub mod logging;
pub mod manager;
pub mod output;
pub mod process;
pub mod reaper;
pub mod restart;
pub mod signal;
pub mod supervisor;

pub use config::{ConfigError, SupervisorConfig};
pub use event::{Event, EventKind};
pub use supervisor::{Supervisor, SupervisorError};
