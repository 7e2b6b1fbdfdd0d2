use super::load_config;
use super::settings::Settings;
use serial_test::serial;
use std::env;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.client.project, "local-project");
    assert_eq!(settings.client.credentials, None);
    assert_eq!(settings.subscriber.max_outstanding, 1);
    assert!(settings.subscriber.handle_signals);
    assert_eq!(settings.broker.max_delivery_attempts, 5);
    assert_eq!(settings.broker.ack_deadline(), Duration::from_secs(10));
    assert_eq!(settings.flow.queue_capacity, 100);
    assert_eq!(settings.flow.workers, 20);
    assert_eq!(settings.flow.io_delay(), Duration::from_secs(3));
    assert_eq!(settings.flow.grace_period(), Duration::from_secs(3));
    assert_eq!(settings.logging.level, "info");
}

#[test]
fn test_redelivery_interval_is_never_zero() {
    let mut settings = Settings::default();
    settings.broker.redelivery_interval_ms = 0;
    assert_eq!(settings.broker.redelivery_interval(), Duration::from_millis(1));
}

#[test]
#[serial]
fn load_config_without_sources_uses_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");

    let cfg = temp_env::with_vars_unset(
        ["PUBSUB_PROJECT_ID", "GOOGLE_APPLICATION_CREDENTIALS"],
        load_config,
    )
    .expect("load_config failed");
    assert_eq!(cfg, Settings::default());

    env::set_current_dir(orig).expect("restore cwd");
}

#[test]
#[serial]
fn load_config_from_file_overrides_defaults() {
    // Create a temporary directory and set it as current dir so load_config
    // will pick up config/default.toml from there.
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");

    fs::create_dir_all("config").expect("create config dir");
    let toml = r#"
        [client]
        project = "file-project"

        [subscriber]
        max_outstanding = 8
        handle_signals = false

        [flow]
        queue_capacity = 10
        workers = 2
    "#;
    fs::write("config/default.toml", toml).expect("write config file");

    let cfg = temp_env::with_vars_unset(
        ["PUBSUB_PROJECT_ID", "GOOGLE_APPLICATION_CREDENTIALS"],
        load_config,
    )
    .expect("load_config failed");
    assert_eq!(cfg.client.project, "file-project");
    assert_eq!(cfg.subscriber.max_outstanding, 8);
    assert!(!cfg.subscriber.handle_signals);
    assert_eq!(cfg.flow.queue_capacity, 10);
    assert_eq!(cfg.flow.workers, 2);
    // untouched values keep their defaults
    assert_eq!(cfg.flow.io_delay_ms, 3_000);
    assert_eq!(cfg.broker.max_delivery_attempts, 5);

    env::set_current_dir(orig).expect("restore cwd");
}

#[test]
#[serial]
fn load_config_from_environment() {
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");

    let cfg = temp_env::with_vars(
        [
            ("PUBSUB_PROJECT_ID", Some("env-project")),
            ("GOOGLE_APPLICATION_CREDENTIALS", Some("/secrets/cred.json")),
            ("PUBSUB_BROKER__MAX_DELIVERY_ATTEMPTS", Some("9")),
            ("PUBSUB_LOGGING__LEVEL", Some("debug")),
        ],
        load_config,
    )
    .expect("load_config failed");

    assert_eq!(cfg.client.project, "env-project");
    assert_eq!(cfg.client.credentials.as_deref(), Some("/secrets/cred.json"));
    assert_eq!(cfg.broker.max_delivery_attempts, 9);
    assert_eq!(cfg.logging.level, "debug");

    env::set_current_dir(orig).expect("restore cwd");
}
