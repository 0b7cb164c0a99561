/// Line sources: where each poll cycle gets its snapshot of worker output.
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

/// Errors produced while taking a snapshot. Both are recoverable: the cycle
/// is skipped and the loop retries after a short delay.
#[derive(Debug)]
pub enum LineSourceError {
    /// The log could not be opened (not yet created, permissions, rotated away).
    Unavailable {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The log was opened but reading it failed.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for LineSourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LineSourceError::Unavailable { path, source } => {
                write!(f, "worker log {} unavailable: {}", path.display(), source)
            }
            LineSourceError::Read { path, source } => {
                write!(f, "failed to read worker log {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for LineSourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LineSourceError::Unavailable { source, .. } => Some(source),
            LineSourceError::Read { source, .. } => Some(source),
        }
    }
}

/// Supplies the current ordered lines of the monitored log, oldest first.
#[async_trait]
pub trait LineSource: Send + Sync {
    /// Take a fresh snapshot. Nothing is carried over between calls.
    async fn read_lines(&self) -> Result<Vec<String>, LineSourceError>;
}

/// Reads the worker's stderr capture from disk.
///
/// The file is opened, fully read and closed on every call, so a log rotated
/// by an outside process is picked up on the next cycle.
pub struct FileLineSource {
    path: PathBuf,
    max_lines: Option<usize>,
}

impl FileLineSource {
    /// `max_lines` keeps only the newest N lines of each snapshot.
    pub fn new(path: impl Into<PathBuf>, max_lines: Option<usize>) -> Self {
        Self {
            path: path.into(),
            max_lines,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LineSource for FileLineSource {
    async fn read_lines(&self) -> Result<Vec<String>, LineSourceError> {
        // tokio::fs runs the open and read on the blocking pool, off the poll loop.
        let mut file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| LineSourceError::Unavailable {
                path: self.path.clone(),
                source: e,
            })?;

        let mut raw = Vec::new();
        file.read_to_end(&mut raw)
            .await
            .map_err(|e| LineSourceError::Read {
                path: self.path.clone(),
                source: e,
            })?;
        drop(file);

        // Worker stderr may carry stray non-UTF-8 bytes; don't lose the cycle over them.
        let text = String::from_utf8_lossy(&raw);
        let mut lines: Vec<String> = text.lines().map(str::to_string).collect();

        if let Some(max) = self.max_lines {
            if lines.len() > max {
                lines.drain(..lines.len() - max);
            }
        }

        Ok(lines)
    }
}

/// In-memory source whose contents can be replaced between cycles.
#[cfg(test)]
pub struct MemoryLineSource {
    lines: std::sync::Mutex<Option<Vec<String>>>,
}

#[cfg(test)]
impl MemoryLineSource {
    pub fn new(lines: Vec<String>) -> Self {
        Self {
            lines: std::sync::Mutex::new(Some(lines)),
        }
    }

    /// A source that reports the log as missing until `set` is called.
    pub fn missing() -> Self {
        Self {
            lines: std::sync::Mutex::new(None),
        }
    }

    pub fn set(&self, lines: Vec<String>) {
        *self.lines.lock().unwrap() = Some(lines);
    }
}

#[cfg(test)]
#[async_trait]
impl LineSource for MemoryLineSource {
    async fn read_lines(&self) -> Result<Vec<String>, LineSourceError> {
        self.lines
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| LineSourceError::Unavailable {
                path: PathBuf::from("<memory>"),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not set"),
            })
    }
}
