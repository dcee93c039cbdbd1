// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test utilities for CLI integration tests.

#![allow(dead_code)]

use assert_cmd::Command;
use std::path::PathBuf;
use tempfile::TempDir;

/// The strand binary with logging quieted
pub fn strand() -> Command {
    let mut cmd = Command::cargo_bin("strand").expect("strand binary should be built");
    cmd.env("RUST_LOG", "warn");
    cmd
}

/// Write `contents` to a config file inside a fresh temp directory.
/// Keep the returned TempDir alive for as long as the path is used.
pub fn config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp = TempDir::new().expect("Failed to create temp directory");
    let path = temp.path().join("strand.toml");
    std::fs::write(&path, contents).expect("Failed to write config");
    (temp, path)
}

/// Parse stdout of a successful `--json` run
pub fn json_report(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.arg("--json").output().expect("Failed to run strand");
    assert!(
        output.status.success(),
        "strand failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}
