use std::collections::BTreeMap;
use std::io;

use async_trait::async_trait;
use tokio::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Exit code, or `None` when the command was terminated by a signal.
    pub code: Option<i32>,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Executes a shell command string with extra environment variables.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        command: &str,
        env: &BTreeMap<String, String>,
    ) -> io::Result<CommandOutcome>;
}

/// Runs commands through `sh -c`, inheriting stdio and the process environment.
#[derive(Debug, Clone, Default)]
pub struct ShellRunner;

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(
        &self,
        command: &str,
        env: &BTreeMap<String, String>,
    ) -> io::Result<CommandOutcome> {
        let status = Command::new("sh")
            .arg("-c")
            .arg(command)
            .envs(env)
            .status()
            .await?;

        Ok(CommandOutcome {
            code: status.code(),
        })
    }
}
