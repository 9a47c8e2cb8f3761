pub mod simulated;
pub mod ssh;

use crate::core::models::{HostProfile, JobResult};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Which way a transfer moves files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    /// Local -> remote (script deployment).
    Push,
    /// Remote -> local (the backup proper).
    Pull,
}

/// One file-transfer operation between a remote path and a local path.
///
/// Every transfer mirrors with deletion, in both directions. For the
/// backup pull this makes the local copy reflect current remote state;
/// for the deploy push it scrubs the remote scratch directory so scripts
/// left over from a previous run can never re-execute.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub direction: TransferDirection,
    pub remote_path: String,
    pub local_path: PathBuf,
    pub excludes: Vec<String>,
}

/// An environment-level fault the executor cannot classify as an ordinary
/// command failure. Ordinary failures come back as a `JobResult` with a
/// non-zero exit code instead.
#[derive(Debug, Error)]
pub enum RemoteFault {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("remote invocation timed out after {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Injected(String),
}

/// The one component that talks to a remote host.
///
/// Both operations block their caller until the remote process exits.
/// No retries are attempted here; retry policy belongs to the caller.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run a single command on the remote host over ssh.
    async fn run_command(
        &self,
        host: &HostProfile,
        command: &str,
    ) -> Result<JobResult, RemoteFault>;

    /// Mirror files between the remote host and the local filesystem.
    async fn run_transfer(
        &self,
        host: &HostProfile,
        req: &TransferRequest,
    ) -> Result<JobResult, RemoteFault>;
}
