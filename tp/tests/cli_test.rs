//! Integration tests for the CLI interface

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// `tp` confined to a temp home, with a config pointing preferences into it
fn tp(home: &Path) -> Command {
    let config = home.join("tripplanner.yml");
    let prefs = home.join("prefs").join("user_preferences.json");
    fs::write(&config, format!("preferences:\n  path: {}\n", prefs.display())).unwrap();

    let mut cmd = Command::cargo_bin("tp").unwrap();
    cmd.current_dir(home)
        .env("HOME", home)
        .env("XDG_DATA_HOME", home.join("data"))
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("NO_COLOR", "1")
        .arg("--config")
        .arg(&config);
    cmd
}

#[test]
fn test_cli_help_flag() {
    let mut cmd = Command::cargo_bin("tp").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("Logs are written to:"));
}

#[test]
fn test_examples_lists_queries() {
    let home = TempDir::new().unwrap();
    tp(home.path())
        .arg("examples")
        .assert()
        .success()
        .stdout(predicate::str::contains("Paris from New York"))
        .stdout(predicate::str::contains("Bali from Sydney"));
}

#[test]
fn test_prefs_show_defaults() {
    let home = TempDir::new().unwrap();
    tp(home.path())
        .args(["prefs", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("mid-range"))
        .stdout(predicate::str::contains("no preference"));
}

#[test]
fn test_prefs_set_then_show_then_reset() {
    let home = TempDir::new().unwrap();

    tp(home.path())
        .args(["prefs", "set", "--airline", "delta", "--amenity", "Free Breakfast", "--budget", "luxury"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Preferences saved!"));

    let saved = fs::read_to_string(home.path().join("prefs").join("user_preferences.json")).unwrap();
    assert!(saved.contains("\"Delta\""));
    assert!(saved.contains("\"luxury\""));

    tp(home.path())
        .args(["prefs", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Delta"))
        .stdout(predicate::str::contains("Free Breakfast"))
        .stdout(predicate::str::contains("luxury"));

    tp(home.path())
        .args(["prefs", "reset"])
        .assert()
        .success()
        .stdout(predicate::str::contains("mid-range"));
    assert!(!home.path().join("prefs").join("user_preferences.json").exists());
}

#[test]
fn test_prefs_set_keeps_unspecified_fields() {
    let home = TempDir::new().unwrap();

    tp(home.path())
        .args(["prefs", "set", "--airline", "United"])
        .assert()
        .success();
    tp(home.path())
        .args(["prefs", "set", "--budget", "budget"])
        .assert()
        .success()
        .stdout(predicate::str::contains("United"))
        .stdout(predicate::str::contains("budget"));
}

#[test]
fn test_prefs_set_rejects_unknown_airline() {
    let home = TempDir::new().unwrap();
    tp(home.path())
        .args(["prefs", "set", "--airline", "Concorde"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown airline option 'Concorde'"));
}

#[test]
fn test_chat_without_api_key_fails_fast() {
    let home = TempDir::new().unwrap();
    tp(home.path())
        .env_remove("LLM_API_KEY")
        .args(["chat", "Plan a trip to Paris"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("LLM_API_KEY"));
}

#[test]
fn test_api_key_read_from_dotenv_file() {
    let home = TempDir::new().unwrap();
    fs::write(home.path().join(".env"), "LLM_API_KEY=sk-from-dotenv\n").unwrap();

    tp(home.path())
        .env_remove("LLM_API_KEY")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("LLM_API_KEY  loaded"));
}

#[test]
fn test_invalid_command() {
    let mut cmd = Command::cargo_bin("tp").unwrap();
    cmd.arg("invalid-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}
