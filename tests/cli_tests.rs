// Command-line tests for the essh binary
//
// Each test writes a configuration into a temporary directory and runs the
// built binary against it with a clean environment.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use essh::Settings;
use tempfile::TempDir;

const CONFIG: &str = r#"
Host "web01" {
    HostName = "10.0.0.1",
    description = "web server",
    tags = { "web" },
    hooks = {
        before_connect = function() end,
        after_connect = "uptime",
    },
}
Host "bastion" { hidden = true }
Task "deploy" {
    on = "web",
    script = "make deploy",
    prepare = function(ctx) ctx:payload(ctx:payload() .. "+prepared") end,
}
Task "refuse" { prepare = function() return false end }
"#;

fn essh(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_essh"))
        .current_dir(dir)
        .env("HOME", dir)
        .env_remove("ESSH_CONFIG")
        .env_remove("ESSH_MODULE_PATH")
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("failed to run essh")
}

fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("esshconfig.lua"), CONFIG).unwrap();
    dir
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn test_check_reports_counts() {
    let dir = workspace();
    let output = essh(dir.path(), &["check"]);
    assert!(output.status.success(), "{:?}", output);
    assert!(stdout(&output).contains("2 host(s), 2 task(s), 0 module(s)"));
}

#[test]
fn test_hosts_json_respects_hidden() {
    let dir = workspace();

    let output = essh(dir.path(), &["hosts", "--json"]);
    assert!(output.status.success(), "{:?}", output);
    let hosts: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(hosts.as_array().unwrap().len(), 1);
    assert_eq!(hosts[0]["name"], "web01");
    assert_eq!(hosts[0]["config"]["HostName"], "10.0.0.1");

    let output = essh(dir.path(), &["hosts", "--all", "--json"]);
    let hosts: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(hosts.as_array().unwrap().len(), 2);
}

#[test]
fn test_prepare_prints_payload() {
    let dir = workspace();
    let output = essh(dir.path(), &["prepare", "deploy", "--payload", "v1"]);
    assert!(output.status.success(), "{:?}", output);
    assert_eq!(stdout(&output).trim(), "v1+prepared");

    let output = essh(dir.path(), &["prepare", "refuse"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("returned false from the prepare function."));
}

#[test]
fn test_hook_command() {
    let dir = workspace();
    let output = essh(dir.path(), &["hook", "web01", "after_connect"]);
    assert!(output.status.success(), "{:?}", output);
    assert_eq!(stdout(&output).trim(), "uptime");

    let output = essh(dir.path(), &["hook", "web01", "before_connect"]);
    assert!(stdout(&output).contains("ran 'before_connect' hook on web01"));

    let output = essh(dir.path(), &["hook", "web01", "during"]);
    assert!(!output.status.success());
}

#[test]
fn test_invalid_configuration_fails() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("esshconfig.lua"),
        r#"Task "t" { file = "a.sh", script = "ls" }"#,
    )
    .unwrap();

    let output = essh(dir.path(), &["check"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("can't use 'file' and 'script'"));
}

#[test]
fn test_missing_configuration_fails() {
    let dir = TempDir::new().unwrap();
    let output = essh(dir.path(), &["check"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("No configuration file found"));
}

#[test]
fn test_settings_saved_and_reused() {
    let dir = workspace();
    let other = dir.path().join("other.lua");
    fs::write(&other, r#"Host "only" {}"#).unwrap();
    let saved = dir.path().join("settings.json");

    let output = essh(
        dir.path(),
        &["-c", other.to_str().unwrap(), "settings", "--save", saved.to_str().unwrap()],
    );
    assert!(output.status.success(), "{:?}", output);
    assert_eq!(Settings::load_from_file(&saved).unwrap().config_files, [other.clone()]);

    let output = essh(dir.path(), &["--settings", saved.to_str().unwrap(), "check"]);
    assert!(stdout(&output).contains("1 host(s), 0 task(s)"));
}
