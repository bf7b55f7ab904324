//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Get path to a fixture file.
pub fn fixture_path(name: &str) -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("tests")
    .join("fixtures")
    .join(name)
}

/// Read fixture content.
pub fn fixture_content(name: &str) -> String {
  std::fs::read_to_string(fixture_path(name)).unwrap_or_else(|e| panic!("Failed to load fixture {}: {}", name, e))
}

/// Isolated configuration directory.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  /// Copy fixtures into a fresh directory, keeping their file names.
  pub fn from_fixtures(names: &[&str]) -> Self {
    let env = Self::empty();
    for name in names {
      env.write_file(name, &fixture_content(name));
    }
    env
  }

  pub fn empty() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  /// Write a file relative to the temp directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  /// A kiln command with logging quieted and the config directory appended
  /// after `args`.
  pub fn kiln(&self, args: &[&str]) -> Command {
    let mut cmd = cargo_bin_cmd!("kiln");
    cmd.env("RUST_LOG", "off").args(args).arg(self.temp.path());
    cmd
  }

  /// Run with `--output json` and parse stdout.
  pub fn json(&self, args: &[&str]) -> (bool, serde_json::Value) {
    let mut full = vec!["--output", "json"];
    full.extend_from_slice(args);
    let output = self.kiln(&full).output().unwrap();
    let json = serde_json::from_slice(&output.stdout)
      .unwrap_or_else(|e| panic!("stdout is not JSON ({}): {}", e, String::from_utf8_lossy(&output.stdout)));
    (output.status.success(), json)
  }
}
