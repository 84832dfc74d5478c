// Configuration module unit tests

use pypipo::config::*;
use pypipo::logging::LogFormat;

#[test]
fn test_can_deserialize_full_yaml_config() {
    let yaml = r#"
server:
  address: "127.0.0.1"
  port: 8080
  threads: 2
  public_scheme: https
  admin_prefix: /_admin
upstream:
  default_origin: https://pypi.org
  allowed_hosts: [pypi.org, files.pythonhosted.org]
  timeout_secs: 10
  user_agent: pypipo-test
cache:
  dir: /srv/pypi-cache
  chunk_size: 65536
  max_rewrite_bytes: 1048576
logging:
  format: text
"#;
    let config = Config::from_yaml_with_env(yaml).expect("Failed to deserialize YAML");
    assert_eq!(config.server.listen_addr(), "127.0.0.1:8080");
    assert_eq!(config.server.threads, 2);
    assert_eq!(config.server.public_scheme, "https");
    assert_eq!(config.server.admin_prefix, "/_admin");
    assert_eq!(config.upstream.timeout_secs, 10);
    assert_eq!(config.upstream.user_agent.as_deref(), Some("pypipo-test"));
    assert_eq!(config.cache.dir, "/srv/pypi-cache");
    assert_eq!(config.cache.chunk_size, 65536);
    assert_eq!(config.cache.max_rewrite_bytes, 1048576);
    assert_eq!(config.logging.format, LogFormat::Text);
    assert!(config.validate().is_ok());
}

#[test]
fn test_partial_sections_keep_defaults() {
    let config = Config::from_yaml_with_env("server:\n  port: 9000\n").unwrap();
    assert_eq!(config.server.port, 9000);
    assert_eq!(config.server.address, "0.0.0.0");
    assert_eq!(config.cache.chunk_size, 512 * 1024);
    assert_eq!(
        config.upstream.allowed_hosts,
        vec!["pypi.org".to_string(), "files.pythonhosted.org".to_string()]
    );
}

#[test]
fn test_config_deserialization_fails_with_invalid_yaml() {
    let yaml = r#"
server:
  address: "127.0.0.1"
  port: [invalid syntax here}
"#;
    assert!(Config::from_yaml_with_env(yaml).is_err());
}

#[test]
fn test_config_rejects_wrong_types() {
    assert!(Config::from_yaml_with_env("server:\n  port: not-a-number\n").is_err());
    assert!(Config::from_yaml_with_env("logging:\n  format: xml\n").is_err());
}

#[test]
fn test_default_origin_with_port_is_accepted() {
    let yaml = r#"
upstream:
  default_origin: http://localhost:3141
  allowed_hosts: [localhost]
"#;
    let config = Config::from_yaml_with_env(yaml).unwrap();
    assert!(config.validate().is_ok());
    let origin = config.upstream.default_origin().unwrap();
    assert_eq!(origin.hostname(), "localhost");
    assert_eq!(origin.port(), Some(3141));
}

#[test]
fn test_allowed_hosts_match_case_insensitively() {
    let yaml = r#"
upstream:
  default_origin: https://PyPI.org
  allowed_hosts: [pypi.ORG]
"#;
    let config = Config::from_yaml_with_env(yaml).unwrap();
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_round_trips_through_yaml() {
    let config = Config::default();
    let yaml = serde_yaml::to_string(&config).unwrap();
    let parsed = Config::from_yaml_with_env(&yaml).unwrap();
    assert_eq!(parsed.server.port, config.server.port);
    assert_eq!(parsed.cache.dir, config.cache.dir);
    assert!(!yaml.contains("user_agent"));
}
