//! Common test utilities for pim integration tests.
//!
//! Provides `TestEnv` for isolated test environments that don't pollute
//! the user's `~/.local/share/pim/` or `~/.config/pim/` directories.

#![allow(dead_code)]

use assert_cmd::Command;
pub use tempfile::TempDir;

/// A test environment with isolated data and config directories.
///
/// The `pim()` method returns a `Command` that sets `PIM_DATA_DIR` and
/// `PIM_CONFIG_DIR` per invocation, making tests parallel-safe.
pub struct TestEnv {
    pub data_dir: TempDir,
    pub config_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            data_dir: TempDir::new().unwrap(),
            config_dir: TempDir::new().unwrap(),
        }
    }

    /// Create a new test environment and run `pim init`.
    pub fn init() -> Self {
        let env = Self::new();
        env.pim().arg("init").assert().success();
        env
    }

    /// Same as `init`, with the YAML backend.
    pub fn init_yaml() -> Self {
        let env = Self::new();
        env.pim().args(["--backend", "yaml", "init"]).assert().success();
        env
    }

    /// Get a Command for the pim binary with isolated directories.
    pub fn pim(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_pim"));
        cmd.current_dir(self.data_dir.path());
        cmd.env("PIM_DATA_DIR", self.data_dir.path());
        cmd.env("PIM_CONFIG_DIR", self.config_dir.path());
        for name in [
            "PIM_BACKEND",
            "PIM_DATABASE",
            "PIM_YAML_FILE",
            "PIM_LOG",
            "PIM_OUTPUT_FORMAT",
        ] {
            cmd.env_remove(name);
        }
        cmd
    }

    /// Run a command expected to succeed and parse its JSON output.
    pub fn json(&self, args: &[&str]) -> serde_json::Value {
        let output = self.pim().args(args).assert().success().get_output().stdout.clone();
        serde_json::from_slice(&output).unwrap()
    }

    /// Create a task and return its id.
    pub fn create_task(&self, args: &[&str]) -> String {
        let mut full = vec!["task", "create"];
        full.extend_from_slice(args);
        self.json(&full)["id"].as_str().unwrap().to_string()
    }

    pub fn data_path(&self) -> &std::path::Path {
        self.data_dir.path()
    }

    pub fn config_path(&self) -> &std::path::Path {
        self.config_dir.path()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
