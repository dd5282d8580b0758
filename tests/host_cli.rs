//! End-to-end tests for the `labgate-host` binary

#![cfg(unix)]

use std::process::Command;

#[test]
fn test_host_config_command_writes_document() {
    let dir = tempfile::tempdir().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_labgate-host"))
        .args(["config", "--output"])
        .arg(dir.path())
        .env_remove("LABGATE_CONFIG")
        .env("XDG_CONFIG_HOME", dir.path())
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let content = std::fs::read_to_string(dir.path().join("jupyter_server_config.json")).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(doc["ServerApp"]["log_level"], "DEBUG");
    assert_eq!(doc["ServerProxy"]["servers"]["lab-spliced"]["timeout"], 300);
}

#[test]
fn test_host_run_stops_after_failed_build() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("srv.log");
    let marker = dir.path().join("launched");
    let config = dir.path().join("labgate.toml");
    std::fs::write(
        &config,
        format!(
            r#"
[servers.srv]
log_file = "{log}"
build = {{ program = "sh", args = ["-c", "echo compiling; exit 4"] }}
launch = {{ program = "touch", args = ["{marker}"] }}
"#,
            log = log.display(),
            marker = marker.display()
        ),
    )
    .unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_labgate-host"))
        .args(["run", "srv", "--port=9999", "--base-url=/"])
        .arg("--config")
        .arg(&config)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(4));
    assert!(!marker.exists());
    assert!(std::fs::read_to_string(&log).unwrap().contains("compiling"));
}

#[test]
fn test_host_run_launches_after_build() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("srv.log");
    let config = dir.path().join("labgate.toml");
    std::fs::write(
        &config,
        format!(
            r#"
[servers.srv]
log_file = "{log}"
absolute_url = true
build = {{ program = "sh", args = ["-c", "echo built"] }}
launch = {{ program = "sh", args = ["-c", "echo \"serving $*\"; exit 0", "sh"] }}
"#,
            log = log.display(),
        ),
    )
    .unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_labgate-host"))
        .args(["run", "srv", "--port", "8123", "--base-url", "/hub/"])
        .arg("--config")
        .arg(&config)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stderr));
    let content = std::fs::read_to_string(&log).unwrap();
    assert!(content.contains("built"));
    assert!(content.contains("serving --ServerApp.base_url=/hub/srv --port=8123"));
}
