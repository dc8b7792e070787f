//! Configuration: the YAML data model, its defaulting rules and the
//! aggregated invariant checks run after a file is parsed.

mod error;
mod loader;
mod model;
mod validate;

pub use error::{ConfigError, FieldError};
pub use loader::load;
pub use model::{
    GlobalLoggingConfig, HealthCheckConfig, RestartConfig, RestartPolicyKind, RotationConfig,
    ServiceConfig, ServiceLoggingConfig, StreamLoggingConfig, SupervisorConfig,
    DEFAULT_STABLE_WINDOW,
};
