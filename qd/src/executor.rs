//! Executor trait and the command-backed implementation
//!
//! Processing a single item is entirely the executor's business; the core
//! only sees success or failure. The shipped implementation runs a configured
//! command with `{id}` substituted into its arguments (appending the id when
//! no placeholder is present), mirroring how the original tooling invoked a
//! per-item download command.

use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

const ID_PLACEHOLDER: &str = "{id}";

/// Item-specific processing failure; the item stays queued for a later tick
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("executor command is empty")]
    EmptyCommand,

    #[error("failed to run executor command {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("executor exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
}

/// Performs the actual unit of work for one item id
#[async_trait]
pub trait Executor: Send + Sync {
    async fn process(&self, id: &str) -> Result<(), ExecError>;
}

/// Executor that runs an external command per item
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    argv: Vec<String>,
}

impl CommandExecutor {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }

    /// Substitute the id into the argv; append it when no `{id}` appears.
    fn render(&self, id: &str) -> Vec<String> {
        let mut argv: Vec<String> = self.argv.iter().map(|arg| arg.replace(ID_PLACEHOLDER, id)).collect();
        if !self.argv.iter().any(|arg| arg.contains(ID_PLACEHOLDER)) {
            argv.push(id.to_string());
        }
        argv
    }
}

#[async_trait]
impl Executor for CommandExecutor {
    async fn process(&self, id: &str) -> Result<(), ExecError> {
        let argv = self.render(id);
        let (program, args) = argv.split_first().ok_or(ExecError::EmptyCommand)?;
        info!(%id, command = %argv.join(" "), "executing");

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ExecError::Spawn {
                command: program.clone(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(ExecError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        debug!(%id, "executor finished");
        Ok(())
    }
}
