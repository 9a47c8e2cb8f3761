//! Durable storage for per-host transfer output.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// Where a job's raw transfer output goes.
///
/// Implementations key each record by host and run start timestamp and
/// report back the location, which ends up in the host's BackupOutcome.
pub trait LogSink: Send + Sync {
    fn persist(&self, host: &str, started: DateTime<Utc>, output: &str) -> Result<PathBuf>;
}

/// Writes one log file per host and run under a base directory,
/// `<dir>/<host>_<timestamp>.log`.
pub struct FsLogSink {
    dir: PathBuf,
}

impl FsLogSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl LogSink for FsLogSink {
    fn persist(&self, host: &str, started: DateTime<Utc>, output: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create log directory {}", self.dir.display()))?;

        let name = format!("{host}_{}.log", started.format("%Y-%m-%dT%H:%M:%SZ"));
        let path = self.dir.join(name);

        info!(host, path = %path.display(), "saving transfer output");
        std::fs::write(&path, output)
            .with_context(|| format!("failed to write transfer log {}", path.display()))?;
        debug!(host, "finished saving transfer output");

        Ok(path)
    }
}

/// In-memory sink for tests.
#[derive(Default)]
pub struct MemoryLogSink {
    entries: Mutex<Vec<(String, String)>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded (host, output) pairs in persist order.
    pub fn entries(&self) -> Vec<(String, String)> {
        self.entries.lock().unwrap().clone()
    }
}

impl LogSink for MemoryLogSink {
    fn persist(&self, host: &str, started: DateTime<Utc>, output: &str) -> Result<PathBuf> {
        self.entries
            .lock()
            .unwrap()
            .push((host.to_string(), output.to_string()));
        Ok(Path::new("memory")
            .join(format!("{host}_{}.log", started.format("%Y-%m-%dT%H:%M:%SZ"))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_sink_names_files_by_host_and_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FsLogSink::new(dir.path());

        let started = DateTime::parse_from_rfc3339("2024-05-01T12:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let path = sink.persist("web01", started, "rsync output\n").unwrap();

        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "web01_2024-05-01T12:30:00Z.log"
        );
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "rsync output\n");
    }

    #[test]
    fn fs_sink_creates_the_log_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("logs");
        let sink = FsLogSink::new(&nested);

        sink.persist("db01", Utc::now(), "x").unwrap();
        assert!(nested.is_dir());
    }
}
