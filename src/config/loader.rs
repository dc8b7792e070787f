use super::error::ConfigError;
use super::model::SupervisorConfig;
use super::validate;
use std::path::Path;

/// Reads, parses and validates a supervisor configuration file.
///
/// Defaulting happens entirely through `serde`'s `#[serde(default = ...)]`
/// attributes on [`super::model`] types; this function's only job beyond
/// deserialization is running the aggregated invariant checks so a caller
/// gets every mistake in the file at once.
pub fn load(path: &Path) -> Result<SupervisorConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&contents, path)
}

fn parse(contents: &str, path: &Path) -> Result<SupervisorConfig, ConfigError> {
    let config: SupervisorConfig =
        serde_yaml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    let errors = validate::validate(&config);
    if !errors.is_empty() {
        return Err(ConfigError::Invalid(errors));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn path() -> PathBuf {
        PathBuf::from("config.yaml")
    }

    #[test]
    fn loads_minimal_service() {
        let yaml = r#"
version: "1"
services:
  - name: web
    command: /usr/bin/web-server
    health_checks:
      - type: tcp
        host: 127.0.0.1
        port: 8080
        interval: 5s
        timeout: 1s
"#;
        let config = parse(yaml, &path()).expect("valid config");
        assert_eq!(config.services.len(), 1);
        assert_eq!(config.services[0].name, "web");
        assert_eq!(config.services[0].restart.max_retries, 3);
    }

    #[test]
    fn rejects_malformed_yaml() {
        let err = parse("services: [", &path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn rejects_duplicate_names_with_aggregated_error() {
        let yaml = r#"
version: "1"
services:
  - name: web
    command: /bin/true
  - name: web
    command: /bin/true
"#;
        let err = parse(yaml, &path()).unwrap_err();
        match err {
            ConfigError::Invalid(errors) => assert_eq!(errors.len(), 1),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }
}
