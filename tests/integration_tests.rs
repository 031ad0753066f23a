//! Integration tests for filesmith
//!
//! These drive the binary end to end: recorded streams through `decode`,
//! and the `config` subcommands.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const MANIFEST: &str = r#"{
  "manifest_version": 3,
  "name": "Tab Counter",
  "version": "1.0.0",
  "action": { "default_popup": "popup/popup.html" }
}"#;

const POPUP_HTML: &str = "<!DOCTYPE html>\n<html>\n  <head>\n    <link rel=\"stylesheet\" href=\"popup.css\">\n  </head>\n  <body>\n    <p id=\"count\">0 tabs open</p>\n    <script src=\"popup.js\"></script>\n  </body>\n</html>";

/// Helper to create a filesmith Command that ignores the caller's environment
fn filesmith() -> Command {
    let mut cmd = cargo_bin_cmd!("filesmith");
    cmd.env_remove("FILESMITH_LOG")
        .env_remove("FILESMITH_MODEL")
        .env_remove("FILESMITH_BASE_URL")
        .env_remove("FILESMITH_MAX_ATTEMPTS");
    cmd
}

/// Helper to create a temporary project directory
fn create_temp_project() -> TempDir {
    TempDir::new().unwrap()
}

fn file_block(name: &str, content: &str) -> String {
    format!("START-MARK: {}\n{}\nEND-MARK: {}\n", name, content, name)
}

/// Write a recorded stream into the project and return its path
fn write_stream(dir: &TempDir, text: &str) -> PathBuf {
    let path = dir.path().join("stream.txt");
    fs::write(&path, text).unwrap();
    path
}

fn extension_stream() -> String {
    format!(
        "Here is your extension.\n{}{}That's all.\n",
        file_block("manifest.json", MANIFEST),
        file_block("popup/popup.html", POPUP_HTML)
    )
}

fn write_config(dir: &Path, content: &str) {
    let config_dir = dir.join(".filesmith");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(config_dir.join("filesmith.toml"), content).unwrap();
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_filesmith_help() {
        filesmith()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("decode"))
            .stdout(predicate::str::contains("generate"));
    }

    #[test]
    fn test_filesmith_version() {
        filesmith().arg("--version").assert().success();
    }

    #[test]
    fn test_generate_requires_prompt() {
        let dir = create_temp_project();
        filesmith()
            .args(["--project-dir", dir.path().to_str().unwrap(), "generate"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Provide a prompt"));
    }
}

// =============================================================================
// Decode Tests
// =============================================================================

mod decode {
    use super::*;

    #[test]
    fn test_decode_lists_artifacts() {
        let dir = create_temp_project();
        let stream = write_stream(&dir, &extension_stream());

        filesmith()
            .current_dir(dir.path())
            .arg("decode")
            .arg(&stream)
            .assert()
            .success()
            .stdout(predicate::str::contains("manifest.json"))
            .stdout(predicate::str::contains("popup/popup.html"))
            .stdout(predicate::str::contains("2 artifacts in 1 attempt(s)"));
    }

    #[test]
    fn test_decode_writes_output_directory() {
        let dir = create_temp_project();
        let stream = write_stream(&dir, &extension_stream());
        let out = dir.path().join("out");

        filesmith()
            .current_dir(dir.path())
            .arg("decode")
            .arg(&stream)
            .arg("--out")
            .arg(&out)
            .args(["--chunk-size", "3"])
            .assert()
            .success();

        assert_eq!(fs::read_to_string(out.join("manifest.json")).unwrap(), MANIFEST);
        assert_eq!(
            fs::read_to_string(out.join("popup/popup.html")).unwrap(),
            POPUP_HTML
        );
    }

    #[test]
    fn test_decode_json_events() {
        let dir = create_temp_project();
        let stream = write_stream(&dir, &extension_stream());

        let output = filesmith()
            .current_dir(dir.path())
            .args(["decode", "--json"])
            .arg(&stream)
            .output()
            .unwrap();
        assert!(output.status.success());

        let stdout = String::from_utf8(output.stdout).unwrap();
        let events: Vec<serde_json::Value> = stdout
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(events.first().unwrap()["type"], "attempt_started");
        let last = events.last().unwrap();
        assert_eq!(last["type"], "session_succeeded");
        assert_eq!(last["artifacts"][0]["name"], "manifest.json");
        assert_eq!(last["artifacts"][1]["name"], "popup/popup.html");

        let completed: Vec<&str> = events
            .iter()
            .filter(|e| e["type"] == "artifact_completed")
            .filter_map(|e| e["name"].as_str())
            .collect();
        assert_eq!(completed, vec!["manifest.json", "popup/popup.html"]);
    }

    #[test]
    fn test_decode_reports_rejected_artifacts() {
        let dir = create_temp_project();
        let text = format!("{}{}", extension_stream(), file_block("notes.txt", "too short"));
        let stream = write_stream(&dir, &text);

        filesmith()
            .current_dir(dir.path())
            .arg("decode")
            .arg(&stream)
            .assert()
            .success()
            .stdout(predicate::str::contains("notes.txt rejected"))
            .stdout(predicate::str::contains("2 artifacts"));
    }

    #[test]
    fn test_decode_rejects_incomplete_html() {
        let dir = create_temp_project();
        let broken = &POPUP_HTML[..POPUP_HTML.find("<body>").unwrap()];
        let text = format!("{}{}", file_block("manifest.json", MANIFEST), file_block("popup/popup.html", broken));
        let stream = write_stream(&dir, &text);

        filesmith()
            .current_dir(dir.path())
            .arg("decode")
            .arg(&stream)
            .assert()
            .success()
            .stdout(predicate::str::contains("popup/popup.html rejected: malformed html"))
            .stdout(predicate::str::contains("1 artifacts"));
    }

    #[test]
    fn test_decode_truncated_stream_fails() {
        let dir = create_temp_project();
        let text = format!("{}START-MARK: popup/popup.html\n<html>", file_block("manifest.json", MANIFEST));
        let stream = write_stream(&dir, &text);

        filesmith()
            .current_dir(dir.path())
            .arg("decode")
            .arg(&stream)
            .assert()
            .failure()
            .stderr(predicate::str::contains("popup/popup.html"));
    }

    #[test]
    fn test_decode_missing_primary_fails() {
        let dir = create_temp_project();
        let stream = write_stream(&dir, &file_block("popup/popup.html", POPUP_HTML));

        filesmith()
            .current_dir(dir.path())
            .arg("decode")
            .arg(&stream)
            .assert()
            .failure()
            .stderr(predicate::str::contains("primary artifact 'manifest.json'"));
    }

    #[test]
    fn test_decode_primary_override() {
        let dir = create_temp_project();
        let stream = write_stream(&dir, &file_block("popup/popup.html", POPUP_HTML));

        filesmith()
            .current_dir(dir.path())
            .arg("decode")
            .arg(&stream)
            .args(["--primary", "popup/popup.html"])
            .assert()
            .success();
    }

    #[test]
    fn test_decode_uses_project_markers() {
        let dir = create_temp_project();
        write_config(dir.path(), "[markers]\nstart = \"<<FILE\"\nend = \"FILE>>\"\n");
        let text = format!("<<FILE manifest.json\n{}\nFILE>>\n", MANIFEST);
        let stream = write_stream(&dir, &text);

        filesmith()
            .args(["--project-dir", dir.path().to_str().unwrap(), "decode"])
            .arg(&stream)
            .assert()
            .success()
            .stdout(predicate::str::contains("1 artifacts"));
    }

    #[test]
    fn test_decode_missing_file_fails() {
        let dir = create_temp_project();
        filesmith()
            .current_dir(dir.path())
            .args(["decode", "does-not-exist.txt"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to read recorded stream"));
    }
}

// =============================================================================
// Config Tests
// =============================================================================

mod config {
    use super::*;

    #[test]
    fn test_config_init_creates_file() {
        let dir = create_temp_project();

        filesmith()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created filesmith.toml"));

        let content = fs::read_to_string(dir.path().join(".filesmith/filesmith.toml")).unwrap();
        assert!(content.contains("[session]"));
        assert!(content.contains("max_attempts = 4"));

        filesmith()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn test_config_validate_defaults() {
        let dir = create_temp_project();
        filesmith()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Using defaults"));
    }

    #[test]
    fn test_config_validate_reports_warnings() {
        let dir = create_temp_project();
        write_config(
            dir.path(),
            "[session]\nmax_attempts = 0\n\n[validation]\nstructured_extensions = [\"json\", \"xml\"]\n",
        );

        filesmith()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration warnings"))
            .stdout(predicate::str::contains("max_attempts"))
            .stdout(predicate::str::contains("xml"));
    }

    #[test]
    fn test_config_invalid_toml_fails() {
        let dir = create_temp_project();
        write_config(dir.path(), "[session\nmax_attempts = ");

        filesmith()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to parse filesmith.toml"));
    }

    #[test]
    fn test_config_show_applies_env_override() {
        let dir = create_temp_project();
        filesmith()
            .current_dir(dir.path())
            .env("FILESMITH_MODEL", "vendor/some-model")
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("vendor/some-model"));
    }
}
