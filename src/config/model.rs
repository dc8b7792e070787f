//! In-memory configuration value consumed by the engine. Nothing in this
//! module parses bytes from disk — that is [`super::loader`]'s job, kept
//! deliberately separate so the engine can be driven purely from values
//! constructed in tests.

use duration_str::{deserialize_duration, deserialize_option_duration};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

pub const DEFAULT_BASE_DIR: &str = "/var/log/daemon";
pub const DEFAULT_STABLE_WINDOW: Duration = Duration::from_secs(5 * 60);
const DEFAULT_DELAY_SECS: u64 = 5;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_ROTATION_MAX_SIZE: &str = "100MB";
const DEFAULT_ROTATION_MAX_FILES: u32 = 10;
const DEFAULT_TIMESTAMP_FORMAT: &str = "iso8601";

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SupervisorConfig {
    pub version: String,
    #[serde(default)]
    pub logging: GlobalLoggingConfig,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GlobalLoggingConfig {
    #[serde(default = "default_base_dir")]
    pub base_dir: String,
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
    #[serde(default)]
    pub rotation: RotationConfig,
}

impl Default for GlobalLoggingConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            timestamp_format: default_timestamp_format(),
            rotation: RotationConfig::default(),
        }
    }
}

fn default_base_dir() -> String {
    DEFAULT_BASE_DIR.to_string()
}

fn default_timestamp_format() -> String {
    DEFAULT_TIMESTAMP_FORMAT.to_string()
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ServiceConfig {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub working_dir: Option<String>,
    #[serde(default)]
    pub environment: HashMap<String, String>,
    pub user: Option<String>,
    pub group: Option<String>,
    #[serde(default)]
    pub restart: RestartConfig,
    #[serde(default)]
    pub health_checks: Vec<HealthCheckConfig>,
    #[serde(default)]
    pub logging: ServiceLoggingConfig,
    #[serde(default)]
    pub depends_on: BTreeSet<String>,
    #[serde(default)]
    pub oneshot: bool,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicyKind {
    Always,
    #[default]
    OnFailure,
    Never,
    UnlessStopped,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RestartConfig {
    #[serde(default)]
    pub policy: RestartPolicyKind,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_delay", deserialize_with = "deserialize_duration")]
    pub delay: Duration,
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub delay_max: Duration,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            policy: RestartPolicyKind::default(),
            max_retries: default_max_retries(),
            delay: default_delay(),
            delay_max: Duration::ZERO,
        }
    }
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_delay() -> Duration {
    Duration::from_secs(DEFAULT_DELAY_SECS)
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HealthCheckConfig {
    Http {
        #[serde(default)]
        name: Option<String>,
        url: String,
        #[serde(default = "default_http_method")]
        method: String,
        #[serde(default = "default_status_code")]
        status_code: u16,
        #[serde(deserialize_with = "deserialize_duration")]
        interval: Duration,
        #[serde(deserialize_with = "deserialize_duration")]
        timeout: Duration,
        #[serde(default = "default_retries")]
        retries: u32,
    },
    Tcp {
        #[serde(default)]
        name: Option<String>,
        host: String,
        port: u16,
        #[serde(deserialize_with = "deserialize_duration")]
        interval: Duration,
        #[serde(deserialize_with = "deserialize_duration")]
        timeout: Duration,
        #[serde(default = "default_retries")]
        retries: u32,
    },
    Command {
        #[serde(default)]
        name: Option<String>,
        command: String,
        #[serde(deserialize_with = "deserialize_duration")]
        interval: Duration,
        #[serde(deserialize_with = "deserialize_duration")]
        timeout: Duration,
        #[serde(default = "default_retries")]
        retries: u32,
    },
}

impl HealthCheckConfig {
    pub fn name(&self) -> String {
        match self {
            HealthCheckConfig::Http { name, url, .. } => {
                name.clone().unwrap_or_else(|| format!("http:{url}"))
            }
            HealthCheckConfig::Tcp { name, host, port, .. } => {
                name.clone().unwrap_or_else(|| format!("tcp:{host}:{port}"))
            }
            HealthCheckConfig::Command { name, command, .. } => {
                name.clone().unwrap_or_else(|| format!("command:{command}"))
            }
        }
    }

    pub fn interval(&self) -> Duration {
        match self {
            HealthCheckConfig::Http { interval, .. }
            | HealthCheckConfig::Tcp { interval, .. }
            | HealthCheckConfig::Command { interval, .. } => *interval,
        }
    }

    pub fn timeout(&self) -> Duration {
        match self {
            HealthCheckConfig::Http { timeout, .. }
            | HealthCheckConfig::Tcp { timeout, .. }
            | HealthCheckConfig::Command { timeout, .. } => *timeout,
        }
    }

    pub fn retries(&self) -> u32 {
        match self {
            HealthCheckConfig::Http { retries, .. }
            | HealthCheckConfig::Tcp { retries, .. }
            | HealthCheckConfig::Command { retries, .. } => *retries,
        }
    }
}

fn default_http_method() -> String {
    "GET".to_string()
}

fn default_status_code() -> u16 {
    200
}

fn default_retries() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ServiceLoggingConfig {
    #[serde(default)]
    pub stdout: Option<StreamLoggingConfig>,
    #[serde(default)]
    pub stderr: Option<StreamLoggingConfig>,
}

impl Default for ServiceLoggingConfig {
    fn default() -> Self {
        Self {
            stdout: None,
            stderr: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StreamLoggingConfig {
    pub file: Option<String>,
    pub timestamp_format: Option<String>,
    #[serde(default)]
    pub rotation: Option<RotationConfig>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RotationConfig {
    #[serde(default = "default_rotation_max_size")]
    pub max_size: String,
    #[serde(default = "default_rotation_max_files")]
    pub max_files: u32,
    #[serde(default, deserialize_with = "deserialize_option_duration")]
    pub max_age: Option<Duration>,
    #[serde(default)]
    pub compress: bool,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            max_size: default_rotation_max_size(),
            max_files: default_rotation_max_files(),
            max_age: None,
            compress: false,
        }
    }
}

fn default_rotation_max_size() -> String {
    DEFAULT_ROTATION_MAX_SIZE.to_string()
}

fn default_rotation_max_files() -> u32 {
    DEFAULT_ROTATION_MAX_FILES
}
