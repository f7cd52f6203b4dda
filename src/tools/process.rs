use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use super::{CommandExecutor, ProcessOutput, ToolCommand};

/// Spawns the tool as a child process and waits for it, capturing both
/// output streams. There is no timeout: a hung tool keeps its slot.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExecutor;

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(&self, command: &ToolCommand) -> std::io::Result<ProcessOutput> {
        let output = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        Ok(ProcessOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
