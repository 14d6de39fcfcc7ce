use super::*;

#[test]
fn test_parse_full_config() {
    let yaml = r#"
worker_num: 4
host: 192.168.1.2
port: 8000
connection_timeout_ms: 20000
ice:
  min_port: 20000
  max_port: 30000
rtcp_report_timer_interval_ms: 2000
log:
  dir: /var/log/rtcgate
  name: rtcgate
  level: debug
  to_stderr: false
"#;
    let config: ServerConfig = serde_yaml::from_str(yaml).unwrap();
    config.validate().unwrap();
    assert_eq!(config.worker_num, 4);
    assert_eq!(config.host, "192.168.1.2");
    assert_eq!(config.ice.min_port, 20000);
    assert_eq!(config.ice.max_port, 30000);
    assert_eq!(config.rtcp_report_timer_interval_ms, Some(2000));
    assert_eq!(config.log.level, "debug");
    assert!(!config.log.to_stderr);
}

#[test]
fn test_missing_keys_take_defaults() {
    let config: ServerConfig = serde_yaml::from_str("host: 10.0.0.1").unwrap();
    config.validate().unwrap();
    assert!(config.worker_num >= 1);
    assert_eq!(config.ice.min_port, 0);
    assert_eq!(config.ice.max_port, 0);
    assert!(config.rtcp_report_timer_interval_ms.is_none());
    assert_eq!(config.log.level, "info");
}

#[test]
fn test_bad_port_range_rejected() {
    let config: ServerConfig =
        serde_yaml::from_str("ice:\n  min_port: 30000\n  max_port: 20000").unwrap();
    assert!(matches!(
        config.validate(),
        Err(Error::ErrInvalidPortRange { .. })
    ));

    let config: ServerConfig = serde_yaml::from_str("ice:\n  min_port: 20000").unwrap();
    assert!(config.validate().is_err());
}

#[test]
fn test_zero_workers_rejected() {
    let config: ServerConfig = serde_yaml::from_str("worker_num: 0").unwrap();
    assert!(matches!(
        config.validate(),
        Err(Error::ErrInvalidWorkerNum(0))
    ));
}
