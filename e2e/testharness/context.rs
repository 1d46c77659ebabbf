//! Test context for E2E tests.

use cli_agent_sdk::{Client, ClientOptions};
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use tempfile::TempDir;

static CLI_PATH: OnceLock<Option<String>> = OnceLock::new();

/// Path to the agent CLI under test.
///
/// Checks the `CLI_AGENT_PATH` environment variable first, then looks for a
/// `cli-agent` binary next to this crate.
pub fn cli_path() -> Option<String> {
    CLI_PATH
        .get_or_init(|| {
            if let Ok(path) = env::var("CLI_AGENT_PATH") {
                if !path.is_empty() {
                    return Some(path);
                }
            }

            let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
            path.push("../target/debug/cli-agent");

            if let Ok(abs_path) = path.canonicalize() {
                if abs_path.exists() {
                    return abs_path.to_str().map(|s| s.to_string());
                }
            }

            None
        })
        .clone()
}

/// Isolated directories and configuration for E2E tests.
pub struct TestContext {
    pub cli_path: String,
    pub home_dir: TempDir,
    pub work_dir: TempDir,
}

impl TestContext {
    /// # Panics
    ///
    /// Panics if the CLI is not found.
    pub fn new() -> Self {
        let cli = cli_path().expect(
            "CLI not found. Build the agent binary first, or set CLI_AGENT_PATH.",
        );

        let home_dir = TempDir::new().expect("failed to create temp home dir");
        let work_dir = TempDir::new().expect("failed to create temp work dir");

        Self { cli_path: cli, home_dir, work_dir }
    }

    /// Environment variables configured for isolated testing.
    pub fn env(&self) -> Vec<(String, String)> {
        let mut env = Vec::new();
        for (key, value) in std::env::vars() {
            env.push((key, value));
        }
        env.push(("XDG_CONFIG_HOME".to_string(), self.home_dir.path().to_str().unwrap().to_string()));
        env.push(("XDG_STATE_HOME".to_string(), self.home_dir.path().to_str().unwrap().to_string()));
        env
    }

    /// Builds a [`Client`] configured for this test context.
    pub fn new_client(&self) -> Client {
        Client::new(Some(ClientOptions {
            cli_path: Some(self.cli_path.clone()),
            cwd: Some(self.work_dir.path().to_str().unwrap().to_string()),
            env: Some(self.env()),
            ..Default::default()
        }))
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
