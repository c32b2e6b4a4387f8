//! JobSource trait and the command-backed implementation
//!
//! The source is an opaque collaborator: all the core needs is the full
//! current set of item ids, in order. The shipped implementation runs a
//! configured command and reads one id per line from its stdout, so any
//! listing tool works as a source.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// Errors from fetching the item set. All variants are transient from the
/// scheduler's point of view: the cache stays untouched and the fetch is
/// retried on the next empty-queue refresh.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source command is empty")]
    EmptyCommand,

    #[error("failed to run source command {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("source command exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("source command timed out after {0:?}")]
    Timeout(Duration),
}

/// Fetches the full current set of candidate item ids
#[async_trait]
pub trait JobSource: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<String>, SourceError>;
}

/// JobSource that runs an external command and parses stdout lines
#[derive(Debug, Clone)]
pub struct CommandSource {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandSource {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Self {
        Self { argv, timeout }
    }
}

#[async_trait]
impl JobSource for CommandSource {
    async fn fetch_all(&self) -> Result<Vec<String>, SourceError> {
        let (program, args) = self.argv.split_first().ok_or(SourceError::EmptyCommand)?;
        debug!(command = %self.argv.join(" "), "fetching item set");

        // kill_on_drop so a timed-out fetch does not leave a child behind
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| SourceError::Timeout(self.timeout))?
            .map_err(|e| SourceError::Spawn {
                command: program.clone(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(SourceError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let ids: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        info!(count = ids.len(), "source fetch complete");
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_command_source_parses_stdout_lines() {
        let source = CommandSource::new(
            vec!["sh".into(), "-c".into(), "printf 'a\\nb\\n\\nc\\n'".into()],
            Duration::from_secs(5),
        );
        let ids = source.fetch_all().await.unwrap();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_command_source_nonzero_exit_is_error() {
        let source = CommandSource::new(
            vec!["sh".into(), "-c".into(), "echo nope >&2; exit 3".into()],
            Duration::from_secs(5),
        );
        match source.fetch_all().await {
            Err(SourceError::Failed { stderr, .. }) => assert_eq!(stderr, "nope"),
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_command_source_timeout() {
        let source = CommandSource::new(
            vec!["sh".into(), "-c".into(), "sleep 5".into()],
            Duration::from_millis(50),
        );
        assert!(matches!(source.fetch_all().await, Err(SourceError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_empty_command_is_error() {
        let source = CommandSource::new(vec![], Duration::from_secs(1));
        assert!(matches!(source.fetch_all().await, Err(SourceError::EmptyCommand)));
    }
}
