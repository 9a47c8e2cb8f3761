pub mod executor;
pub mod job;
pub mod log_sink;
pub mod models;
pub mod orchestrator;

pub use executor::{RemoteExecutor, RemoteFault, TransferDirection, TransferRequest};
pub use job::HostBackupJob;
pub use log_sink::{FsLogSink, LogSink, MemoryLogSink};
pub use models::{BackupOutcome, HostProfile, JobResult, Report, ScriptCatalog, ScriptSet, Stage};
pub use orchestrator::Orchestrator;
