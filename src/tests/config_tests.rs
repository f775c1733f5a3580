//! Tests for the config module.

use super::*;
use crate::paths::set_home_for_test;
use serial_test::serial;

#[test]
fn test_partial_yaml_keeps_defaults() {
    let yaml = r#"
shell: /bin/zsh
ai_resume_settle_delay_ms: 2500
capture:
  timeout_secs: 5
"#;
    let config = TerminalConfig::from_yaml(yaml).unwrap();

    assert_eq!(config.shell.as_deref(), Some("/bin/zsh"));
    assert_eq!(config.settle_delay(), Duration::from_millis(2500));
    assert_eq!(config.capture.timeout(), Duration::from_secs(5));
    assert_eq!(config.capture.poll_interval_ms, 1000);
    assert_eq!(config.default_cols, 80);
    assert_eq!(config.default_rows, 24);
    assert_eq!(config.ai_command, "claude");
    assert_eq!(config.max_output_buffer_bytes, 100_000);
}

#[test]
fn test_empty_yaml_is_default() {
    assert_eq!(
        TerminalConfig::from_yaml("   \n").unwrap(),
        TerminalConfig::default()
    );
}

#[test]
fn test_zero_geometry_rejected() {
    let err = TerminalConfig::from_yaml("default_cols: 0\n").unwrap_err();
    assert!(format!("{:#}", err).contains("must be positive"));
}

#[test]
fn test_blank_ai_command_rejected() {
    assert!(TerminalConfig::from_yaml("ai_command: \"  \"\n").is_err());
}

#[test]
fn test_missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = TerminalConfig::load(&dir.path().join("nope.yaml")).unwrap();
    assert_eq!(config, TerminalConfig::default());
}

#[test]
fn test_invalid_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "default_rows: [not, a, number]\n").unwrap();

    let err = TerminalConfig::load(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("config.yaml"));
}

#[test]
#[serial]
fn test_load_default_reads_home_config() {
    let dir = tempfile::tempdir().unwrap();
    let _guard = set_home_for_test(dir.path().to_path_buf());
    std::fs::write(dir.path().join("config.yaml"), "autosave_interval_secs: 5\n").unwrap();

    let config = TerminalConfig::load_default().unwrap();
    assert_eq!(config.autosave_interval(), Duration::from_secs(5));
}
