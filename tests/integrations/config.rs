use alertbridge::cli::Cli;
use alertbridge::config::Config;
use alertbridge::forked::Mode;
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

/// A helper function to run a test with a temporary config file.
fn with_config_file<F>(toml_content: &str, test_fn: F)
where
    F: FnOnce(PathBuf),
{
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", toml_content).unwrap();
    let path = file.path().to_path_buf();
    test_fn(path);
}

#[test]
fn test_load_full_valid_config() {
    let toml_content = r#"
        log_level = "debug"
        org_id = 7

        [forking]
        mode = "primary"
        sync_interval_seconds = 120

        [remote]
        url = "https://am.example.com/base"
        tenant_id = "tenant-7"
        basic_auth_password = "s3cret"
        timeout_seconds = 5
        promote_config = true

        [sender]
        queue_capacity = 500
        max_batch_size = 16
        send_timeout_seconds = 3

        [sender.external_labels]
        cluster = "eu-1"

        [[sender.relabel_configs]]
        source_labels = ["env"]
        regex = "dev"
        action = "drop"

        [internal]
        silence_retention_hours = 24
        config_poll_interval_seconds = 30
        maintenance_interval_seconds = 600

        [api]
        enabled = false
        listen_address = "0.0.0.0:9094"

        [metrics]
        enabled = true
        listen_address = "0.0.0.0:9095"
        system_metrics_enabled = false
    "#;

    with_config_file(toml_content, |path| {
        let config = Config::load(&path).unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.org_id, 7);
        assert_eq!(config.forking.mode, Mode::Primary);
        assert_eq!(config.forking.sync_interval_seconds, 120);
        assert_eq!(config.remote.url, "https://am.example.com/base");
        assert_eq!(config.remote.tenant_id, "tenant-7");
        assert_eq!(config.remote.basic_auth_password, "s3cret");
        assert!(config.remote.promote_config);
        assert_eq!(config.sender.queue_capacity, 500);
        assert_eq!(config.sender.max_batch_size, 16);
        assert_eq!(config.sender.external_labels.get("cluster").map(String::as_str), Some("eu-1"));
        assert_eq!(config.sender.relabel_configs.len(), 1);
        assert_eq!(config.internal.silence_retention_hours, 24);
        assert_eq!(config.internal.config_poll_interval_seconds, 30);
        assert!(!config.api.enabled);
        assert!(!config.metrics.system_metrics_enabled);
    });
}

#[test]
fn test_missing_file_uses_defaults() {
    let config = Config::load("/nonexistent/alertbridge.toml").unwrap();

    assert_eq!(config.forking.mode, Mode::Secondary);
    assert_eq!(config.forking.sync_interval_seconds, 300);
    assert_eq!(config.sender.queue_capacity, 10_000);
    assert_eq!(config.sender.max_batch_size, 64);
    assert_eq!(config.remote.timeout_seconds, 30);
    assert_eq!(config.internal.maintenance_interval_seconds, 900);
}

#[test]
fn test_partial_sender_section_keeps_defaults() {
    let toml_content = r#"
        [sender]
        max_batch_size = 8
    "#;

    with_config_file(toml_content, |path| {
        let config = Config::load(&path).unwrap();
        assert_eq!(config.sender.max_batch_size, 8);
        assert_eq!(config.sender.queue_capacity, 10_000);
        assert_eq!(config.sender.send_timeout_seconds, 10);
    });
}

#[test]
fn test_cli_flags_override_file() {
    let toml_content = r#"
        [forking]
        mode = "secondary"
        sync_interval_seconds = 60

        [remote]
        url = "http://from-file:9009"
        tenant_id = "1"
        timeout_seconds = 30
    "#;

    with_config_file(toml_content, |path| {
        let cli = Cli::try_parse_from([
            "alertbridge",
            "--config",
            path.to_str().unwrap(),
            "--mode",
            "primary",
            "--remote-url",
            "http://from-cli:9009",
            "--queue-capacity",
            "42",
        ])
        .unwrap();
        let config = Config::load_with_cli(&cli).unwrap();

        assert_eq!(config.forking.mode, Mode::Primary);
        assert_eq!(config.forking.sync_interval_seconds, 60);
        assert_eq!(config.remote.url, "http://from-cli:9009");
        assert_eq!(config.sender.queue_capacity, 42);
    });
}

#[test]
fn test_environment_overrides_file() {
    let toml_content = r#"
        [remote]
        url = "http://localhost:9009"
        tenant_id = "1"
        timeout_seconds = 30
        external_url = "http://from-file"
    "#;

    with_config_file(toml_content, |path| {
        std::env::set_var("ALERTBRIDGE_REMOTE__EXTERNAL_URL", "http://from-env");
        let config = Config::load(&path);
        std::env::remove_var("ALERTBRIDGE_REMOTE__EXTERNAL_URL");

        assert_eq!(config.unwrap().remote.external_url, "http://from-env");
    });
}

#[test]
fn test_invalid_values_are_rejected() {
    for toml_content in [
        "[sender]\nqueue_capacity = 0",
        "[sender]\nmax_batch_size = 0",
        "[internal]\nsilence_retention_hours = 1\nconfig_poll_interval_seconds = 0\nmaintenance_interval_seconds = 60",
        "[forking]\nmode = \"tertiary\"\nsync_interval_seconds = 1",
    ] {
        with_config_file(toml_content, |path| {
            assert!(Config::load(&path).is_err(), "accepted: {}", toml_content);
        });
    }
}
