use std::io::Write;
use std::time::Duration;

use console_host::{config::HostConfig, AppError};

const FULL_TOML: &str = r#"
program = "/usr/local/bin/console-host"
program_args = ["--log-format", "json"]
exit_on_normal_exit = false
shutdown_grace_ms = 1500
restart_delay_ms = 10
member_names_timeout_ms = 300
endpoint_prefix = "my_console"
prompt = "> "
"#;

#[test]
fn empty_document_yields_defaults() {
    let config = HostConfig::from_toml_str("").expect("defaults");
    assert_eq!(config, HostConfig::default());
    assert!(config.exit_on_normal_exit);
    assert_eq!(config.shutdown_grace(), Duration::from_secs(5));
    assert_eq!(config.restart_delay(), Duration::from_millis(250));
    assert_eq!(config.member_names_timeout(), Duration::from_secs(2));
    assert_eq!(config.endpoint_prefix, "console-host");
    assert_eq!(config.prompt, ">>> ");
}

#[test]
fn full_document_overrides_every_field() {
    let config = HostConfig::from_toml_str(FULL_TOML).expect("valid config");
    assert_eq!(
        config.program.as_deref(),
        Some(std::path::Path::new("/usr/local/bin/console-host"))
    );
    assert_eq!(config.program_args, vec!["--log-format", "json"]);
    assert!(!config.exit_on_normal_exit);
    assert_eq!(config.shutdown_grace(), Duration::from_millis(1500));
    assert_eq!(config.restart_delay(), Duration::from_millis(10));
    assert_eq!(config.member_names_timeout(), Duration::from_millis(300));
    assert_eq!(config.endpoint_prefix, "my_console");
    assert_eq!(config.prompt, "> ");
}

#[test]
fn zero_grace_is_rejected() {
    let err = HostConfig::from_toml_str("shutdown_grace_ms = 0").unwrap_err();
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("shutdown_grace_ms")));
}

#[test]
fn endpoint_prefix_must_be_name_safe() {
    for bad in ["", "with space", "slash/prefix"] {
        let doc = format!("endpoint_prefix = {bad:?}");
        let err = HostConfig::from_toml_str(&doc).unwrap_err();
        assert!(matches!(err, AppError::Config(_)), "{bad:?} -> {err}");
    }
}

#[test]
fn malformed_toml_is_a_config_error() {
    let err = HostConfig::from_toml_str("shutdown_grace_ms = \"soon\"").unwrap_err();
    assert!(err.to_string().starts_with("config: invalid config:"), "{err}");
}

#[test]
fn program_defaults_to_current_executable() {
    let config = HostConfig::default();
    let program = config.resolve_program().expect("current exe");
    assert_eq!(program, std::env::current_exe().expect("current exe"));
}

#[test]
fn load_from_path_reads_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(FULL_TOML.as_bytes()).expect("write");
    let config = HostConfig::load_from_path(file.path()).expect("load");
    assert_eq!(config.endpoint_prefix, "my_console");
}

#[test]
fn load_from_missing_path_fails() {
    let dir = tempfile::tempdir().expect("temp dir");
    let err = HostConfig::load_from_path(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, AppError::Config(_)), "{err}");
}
