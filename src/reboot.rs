/// Reboot action: log the reason and restart the machine.
use crate::config::RebootConfig;
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::process::Command;

/// Errors from issuing the reboot command.
#[derive(Debug)]
pub enum RebootError {
    /// The reboot command could not be started.
    Spawn {
        command: String,
        source: std::io::Error,
    },
    /// The reboot command ran but reported failure (e.g. missing privilege).
    Failed { command: String, code: Option<i32> },
}

impl std::fmt::Display for RebootError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RebootError::Spawn { command, source } => {
                write!(f, "failed to spawn reboot command {command}: {source}")
            }
            RebootError::Failed {
                command,
                code: Some(code),
            } => write!(f, "reboot command {command} exited with status {code}"),
            RebootError::Failed {
                command,
                code: None,
            } => write!(f, "reboot command {command} was terminated by a signal"),
        }
    }
}

impl std::error::Error for RebootError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RebootError::Spawn { source, .. } => Some(source),
            RebootError::Failed { .. } => None,
        }
    }
}

/// Performs the reboot once a failure signature matches.
#[async_trait]
pub trait Rebooter: Send + Sync {
    /// Issue one reboot attempt. A real reboot never returns control in practice.
    async fn reboot(&self, reason: &str) -> Result<(), RebootError>;
}

/// Runs the configured privileged reboot command (default `/sbin/reboot`).
///
/// The invoking user must be able to run it without an interactive prompt.
pub struct CommandRebooter {
    command: String,
    args: Vec<String>,
}

impl CommandRebooter {
    pub fn new(config: &RebootConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
        }
    }
}

#[async_trait]
impl Rebooter for CommandRebooter {
    async fn reboot(&self, reason: &str) -> Result<(), RebootError> {
        tracing::info!(
            reason,
            command = %self.command,
            args = ?self.args,
            "rebooting"
        );

        let status = Command::new(&self.command)
            .args(&self.args)
            .status()
            .await
            .map_err(|e| RebootError::Spawn {
                command: self.command.clone(),
                source: e,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(RebootError::Failed {
                command: self.command.clone(),
                code: status.code(),
            })
        }
    }
}

/// Logs the reason and records it instead of rebooting (dry-run mode).
#[derive(Default)]
pub struct NoopRebooter {
    reasons: Mutex<Vec<String>>,
}

impl NoopRebooter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every reason passed to `reboot` so far, oldest first.
    #[allow(dead_code)]
    pub fn reasons(&self) -> Vec<String> {
        self.reasons
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Rebooter for NoopRebooter {
    async fn reboot(&self, reason: &str) -> Result<(), RebootError> {
        tracing::info!(reason, "dry run: reboot suppressed");
        if let Ok(mut reasons) = self.reasons.lock() {
            reasons.push(reason.to_string());
        }
        Ok(())
    }
}
