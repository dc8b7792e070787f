//! Resolves a service's logging configuration into the pair of stdout/stderr
//! sinks its [`crate::manager::ServiceManager`] hands to each spawned
//! process, per the log file layout of the external interfaces: files live
//! at `<base_dir>/<service>/<file>`, defaulting to `<name>.out.log` /
//! `<name>.err.log`, with the timestamp format and rotation settings falling
//! back from the per-stream override to the global logging defaults.

use std::path::PathBuf;

use tracing::warn;

use crate::config::{GlobalLoggingConfig, RotationConfig, ServiceConfig, StreamLoggingConfig};
use crate::output::{FanoutWriter, RotatingWriter, Sink, TimestampFormat};

/// Builds the stdout/stderr sinks for one service. Failing to open a log
/// file degrades to no sink for that stream rather than failing the whole
/// spawn — the process still runs, it just loses captured output, and the
/// failure is logged once here.
pub fn build_service_sinks(
    service: &ServiceConfig,
    logging: &GlobalLoggingConfig,
) -> (Option<FanoutWriter>, Option<FanoutWriter>) {
    let stdout = build_stream(
        service,
        logging,
        service.logging.stdout.as_ref(),
        "out",
    );
    let stderr = build_stream(
        service,
        logging,
        service.logging.stderr.as_ref(),
        "err",
    );
    (stdout, stderr)
}

fn build_stream(
    service: &ServiceConfig,
    logging: &GlobalLoggingConfig,
    stream_config: Option<&StreamLoggingConfig>,
    suffix: &str,
) -> Option<FanoutWriter> {
    let file_name = stream_config
        .and_then(|c| c.file.clone())
        .unwrap_or_else(|| format!("{}.{suffix}.log", service.name));

    let timestamp_format = stream_config
        .and_then(|c| c.timestamp_format.clone())
        .unwrap_or_else(|| logging.timestamp_format.clone());

    let rotation: &RotationConfig = stream_config
        .and_then(|c| c.rotation.as_ref())
        .unwrap_or(&logging.rotation);

    let path: PathBuf = PathBuf::from(&logging.base_dir)
        .join(&service.name)
        .join(&file_name);

    match RotatingWriter::open(&path, rotation) {
        Ok(writer) => {
            let sink: Box<dyn Sink + Send> = Box::new(writer);
            Some(FanoutWriter::new(
                vec![sink],
                Some(TimestampFormat::parse(&timestamp_format)),
            ))
        }
        Err(err) => {
            warn!(service = %service.name, path = %path.display(), %err, "failed to open log sink, output will not be captured");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RestartConfig, ServiceLoggingConfig};
    use std::collections::{BTreeSet, HashMap};
    use tempfile::tempdir;

    fn service(name: &str) -> ServiceConfig {
        ServiceConfig {
            name: name.to_string(),
            command: "/bin/true".to_string(),
            args: Vec::new(),
            working_dir: None,
            environment: HashMap::new(),
            user: None,
            group: None,
            restart: RestartConfig::default(),
            health_checks: Vec::new(),
            logging: ServiceLoggingConfig::default(),
            depends_on: BTreeSet::new(),
            oneshot: false,
        }
    }

    #[test]
    fn default_layout_places_files_under_base_dir_and_service_name() {
        let dir = tempdir().unwrap();
        let logging = GlobalLoggingConfig {
            base_dir: dir.path().to_string_lossy().into_owned(),
            ..GlobalLoggingConfig::default()
        };
        let svc = service("web");
        let (stdout, stderr) = build_service_sinks(&svc, &logging);
        assert!(stdout.is_some());
        assert!(stderr.is_some());
        assert!(dir.path().join("web").join("web.out.log").exists());
        assert!(dir.path().join("web").join("web.err.log").exists());
    }

    #[test]
    fn per_stream_file_override_is_honored() {
        let dir = tempdir().unwrap();
        let logging = GlobalLoggingConfig {
            base_dir: dir.path().to_string_lossy().into_owned(),
            ..GlobalLoggingConfig::default()
        };
        let mut svc = service("web");
        svc.logging.stdout = Some(StreamLoggingConfig {
            file: Some("custom.log".to_string()),
            timestamp_format: None,
            rotation: None,
        });
        build_service_sinks(&svc, &logging);
        assert!(dir.path().join("web").join("custom.log").exists());
    }
}
