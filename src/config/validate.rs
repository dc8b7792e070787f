//! Aggregated validation: every invariant violation found in a config is
//! collected and reported together, rather than stopping at the first one,
//! so a user fixes their YAML in one pass instead of one error at a time.

use super::error::FieldError;
use super::model::{HealthCheckConfig, ServiceConfig, SupervisorConfig};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

/// Service names become directory components (`<base_dir>/<name>/...`) and
/// log file prefixes, so they're restricted to the portable-filename
/// alphabet rather than accepting anything UTF-8.
fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").expect("valid regex"))
}

pub fn validate(config: &SupervisorConfig) -> Vec<FieldError> {
    let mut errors = Vec::new();

    validate_unique_names(&config.services, &mut errors);
    validate_dependencies_exist(&config.services, &mut errors);
    validate_dependency_graph_acyclic(&config.services, &mut errors);
    for service in &config.services {
        validate_service(service, &mut errors);
    }

    errors
}

fn validate_unique_names(services: &[ServiceConfig], errors: &mut Vec<FieldError>) {
    let mut seen = HashSet::new();
    for service in services {
        if !seen.insert(service.name.as_str()) {
            errors.push(FieldError::new(
                "services",
                format!("duplicate service name `{}`", service.name),
            ));
        }
    }
}

fn validate_dependencies_exist(services: &[ServiceConfig], errors: &mut Vec<FieldError>) {
    let names: HashSet<&str> = services.iter().map(|s| s.name.as_str()).collect();
    for service in services {
        for dep in &service.depends_on {
            if !names.contains(dep.as_str()) {
                errors.push(FieldError::new(
                    format!("services[{}].depends_on", service.name),
                    format!("unknown service `{dep}`"),
                ));
            }
        }
    }
}

/// Kahn's algorithm: a cycle exists iff it cannot drain the whole graph.
fn validate_dependency_graph_acyclic(services: &[ServiceConfig], errors: &mut Vec<FieldError>) {
    let mut in_degree: HashMap<&str, usize> =
        services.iter().map(|s| (s.name.as_str(), 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for service in services {
        for dep in &service.depends_on {
            if !in_degree.contains_key(dep.as_str()) {
                // Already reported by validate_dependencies_exist; skip here
                // so the cycle check only reasons about the well-formed subgraph.
                continue;
            }
            *in_degree.get_mut(service.name.as_str()).unwrap() += 1;
            dependents
                .entry(dep.as_str())
                .or_default()
                .push(service.name.as_str());
        }
    }

    let mut queue: Vec<&str> = in_degree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(name, _)| *name)
        .collect();
    let mut visited = 0;

    while let Some(name) = queue.pop() {
        visited += 1;
        if let Some(next) = dependents.get(name) {
            for dependent in next {
                let deg = in_degree.get_mut(dependent).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    queue.push(dependent);
                }
            }
        }
    }

    if visited != in_degree.len() {
        errors.push(FieldError::new(
            "services[].depends_on",
            "dependency graph contains a cycle",
        ));
    }
}

fn validate_service(service: &ServiceConfig, errors: &mut Vec<FieldError>) {
    if service.name.trim().is_empty() {
        errors.push(FieldError::new("services[].name", "must not be empty"));
    } else if !name_pattern().is_match(&service.name) {
        errors.push(FieldError::new(
            format!("services[{}].name", service.name),
            "must match [A-Za-z0-9][A-Za-z0-9_.-]*",
        ));
    }
    if service.command.trim().is_empty() {
        errors.push(FieldError::new(
            format!("services[{}].command", service.name),
            "must not be empty",
        ));
    }
    if service.oneshot && !service.health_checks.is_empty() {
        errors.push(FieldError::new(
            format!("services[{}].health_checks", service.name),
            "oneshot services cannot declare health checks",
        ));
    }

    let mut seen_checks = HashSet::new();
    for check in &service.health_checks {
        let field = format!("services[{}].health_checks[{}]", service.name, check.name());
        if !seen_checks.insert(check.name()) {
            errors.push(FieldError::new(
                &field,
                format!("duplicate health check name `{}`", check.name()),
            ));
        }
        if check.timeout() >= check.interval() {
            errors.push(FieldError::new(
                &field,
                "timeout must be shorter than interval",
            ));
        }
        if check.retries() == 0 {
            errors.push(FieldError::new(&field, "retries must be at least 1"));
        }
        if let HealthCheckConfig::Http { url, .. } = check {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                errors.push(FieldError::new(&field, "url must be absolute http(s)"));
            }
        }
        if let HealthCheckConfig::Tcp { host, port, .. } = check {
            if *port == 0 {
                errors.push(FieldError::new(&field, "port must not be 0"));
            }
            if host.trim().is_empty() {
                errors.push(FieldError::new(&field, "host must not be empty"));
            }
        }
        if let HealthCheckConfig::Command { command, .. } = check {
            if command.trim().is_empty() {
                errors.push(FieldError::new(&field, "command must not be empty"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{RestartConfig, ServiceLoggingConfig};
    use std::time::Duration;

    fn service(name: &str, depends_on: &[&str]) -> ServiceConfig {
        ServiceConfig {
            name: name.to_string(),
            command: "/bin/true".to_string(),
            args: Vec::new(),
            working_dir: None,
            environment: Default::default(),
            user: None,
            group: None,
            restart: RestartConfig::default(),
            health_checks: Vec::new(),
            logging: ServiceLoggingConfig::default(),
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            oneshot: false,
        }
    }

    #[test]
    fn flags_duplicate_names() {
        let config = SupervisorConfig {
            version: "1".into(),
            logging: Default::default(),
            services: vec![service("a", &[]), service("a", &[])],
        };
        let errors = validate(&config);
        assert!(errors.iter().any(|e| e.message.contains("duplicate service name")));
    }

    #[test]
    fn flags_unknown_dependency() {
        let config = SupervisorConfig {
            version: "1".into(),
            logging: Default::default(),
            services: vec![service("a", &["ghost"])],
        };
        let errors = validate(&config);
        assert!(errors.iter().any(|e| e.message.contains("unknown service")));
    }

    #[test]
    fn flags_dependency_cycle() {
        let config = SupervisorConfig {
            version: "1".into(),
            logging: Default::default(),
            services: vec![service("a", &["b"]), service("b", &["a"])],
        };
        let errors = validate(&config);
        assert!(errors.iter().any(|e| e.message.contains("cycle")));
    }

    #[test]
    fn flags_name_with_invalid_characters() {
        let config = SupervisorConfig {
            version: "1".into(),
            logging: Default::default(),
            services: vec![service("web server!", &[])],
        };
        let errors = validate(&config);
        assert!(errors.iter().any(|e| e.message.contains("must match")));
    }

    #[test]
    fn accepts_well_formed_chain() {
        let config = SupervisorConfig {
            version: "1".into(),
            logging: Default::default(),
            services: vec![service("a", &[]), service("b", &["a"]), service("c", &["b"])],
        };
        assert!(validate(&config).is_empty());
    }

    #[test]
    fn flags_health_check_timeout_not_shorter_than_interval() {
        let mut svc = service("a", &[]);
        svc.health_checks.push(HealthCheckConfig::Tcp {
            name: None,
            host: "localhost".into(),
            port: 80,
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(5),
            retries: 3,
        });
        let config = SupervisorConfig {
            version: "1".into(),
            logging: Default::default(),
            services: vec![svc],
        };
        let errors = validate(&config);
        assert!(errors.iter().any(|e| e.message.contains("timeout must be shorter")));
    }

    #[test]
    fn flags_oneshot_with_health_checks() {
        let mut svc = service("a", &[]);
        svc.oneshot = true;
        svc.health_checks.push(HealthCheckConfig::Tcp {
            name: None,
            host: "localhost".into(),
            port: 80,
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(1),
            retries: 3,
        });
        let config = SupervisorConfig {
            version: "1".into(),
            logging: Default::default(),
            services: vec![svc],
        };
        let errors = validate(&config);
        assert!(errors.iter().any(|e| e.message.contains("oneshot services cannot")));
    }

    #[test]
    fn flags_empty_tcp_host() {
        let mut svc = service("a", &[]);
        svc.health_checks.push(HealthCheckConfig::Tcp {
            name: None,
            host: "   ".into(),
            port: 80,
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(1),
            retries: 3,
        });
        let config = SupervisorConfig {
            version: "1".into(),
            logging: Default::default(),
            services: vec![svc],
        };
        let errors = validate(&config);
        assert!(errors.iter().any(|e| e.message.contains("host must not be empty")));
    }

    #[test]
    fn flags_empty_command_health_check() {
        let mut svc = service("a", &[]);
        svc.health_checks.push(HealthCheckConfig::Command {
            name: None,
            command: "  ".into(),
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(1),
            retries: 3,
        });
        let config = SupervisorConfig {
            version: "1".into(),
            logging: Default::default(),
            services: vec![svc],
        };
        let errors = validate(&config);
        assert!(errors.iter().any(|e| e.message.contains("command must not be empty")));
    }
}
