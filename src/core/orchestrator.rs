//! Fans host backup jobs out across a bounded worker pool and gathers
//! every outcome into one report.

use crate::core::executor::RemoteExecutor;
use crate::core::job::HostBackupJob;
use crate::core::log_sink::LogSink;
use crate::core::models::{BackupOutcome, HostProfile, Report, ScriptCatalog};
use anyhow::{Result, ensure};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

pub struct Orchestrator {
    executor: Arc<dyn RemoteExecutor>,
    sink: Arc<dyn LogSink>,
    backup_root: PathBuf,
}

impl Orchestrator {
    pub fn new(
        executor: Arc<dyn RemoteExecutor>,
        sink: Arc<dyn LogSink>,
        backup_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            executor,
            sink,
            backup_root: backup_root.into(),
        }
    }

    /// Run one backup job per host, at most `limit` concurrently.
    ///
    /// Jobs queue for a worker slot and report back as they finish, so the
    /// report's outcomes are in completion order, not submission order.
    /// Every submitted host yields exactly one outcome; a host's failure,
    /// or even a panic inside its job, never halts the others.
    pub async fn run(
        &self,
        profiles: Vec<Arc<HostProfile>>,
        catalog: &ScriptCatalog,
        limit: usize,
    ) -> Result<Report> {
        ensure!(limit > 0, "concurrency limit must be a positive integer");

        info!(hosts = profiles.len(), limit, "starting backup run");

        let semaphore = Arc::new(Semaphore::new(limit));
        let mut jobs = JoinSet::new();
        let mut task_hosts = HashMap::new();

        let mut report = Report {
            submitted: profiles.len(),
            ..Report::default()
        };

        for profile in profiles {
            let host = profile.hostname.clone();
            let scripts = catalog.get(&host).cloned().unwrap_or_default();
            let job = HostBackupJob::new(
                profile,
                scripts,
                self.backup_root.join(&host),
                Arc::clone(&self.executor),
                Arc::clone(&self.sink),
            );

            debug!(%host, "submitting backup job");
            let semaphore = Arc::clone(&semaphore);
            let handle = jobs.spawn(async move {
                // The semaphore is never closed, so acquire cannot fail.
                let _permit = semaphore.acquire().await.unwrap();
                job.run().await
            });
            task_hosts.insert(handle.id(), host);
        }

        while let Some(joined) = jobs.join_next_with_id().await {
            let outcome = match joined {
                Ok((_, outcome)) => outcome,
                Err(join_error) => {
                    let host = task_hosts
                        .get(&join_error.id())
                        .cloned()
                        .unwrap_or_else(|| "<unknown>".to_string());
                    error!(%host, error = %join_error, "backup job aborted");
                    BackupOutcome {
                        host,
                        success: false,
                        message: format!("unexpected fault: job task panicked: {join_error}"),
                        failed_stage: None,
                        log_path: None,
                    }
                }
            };
            debug!(host = %outcome.host, success = outcome.success, "job finished");
            report.push(outcome);
        }

        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            "backup run finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::executor::simulated::SimulatedExecutor;
    use crate::core::log_sink::{LogSink, MemoryLogSink};
    use chrono::{DateTime, Utc};
    use std::path::Path;

    fn profile(host: &str) -> Arc<HostProfile> {
        Arc::new(HostProfile {
            hostname: host.to_string(),
            username: "root".to_string(),
            port: 22,
            ssh_args: Vec::new(),
            remote_path: "/data".to_string(),
            excludes: Vec::new(),
            scripts_remote_dir: "/tmp/ssb_scripts".to_string(),
        })
    }

    #[tokio::test]
    async fn zero_concurrency_is_rejected_before_any_job_starts() {
        let executor = Arc::new(SimulatedExecutor::new());
        let orchestrator = Orchestrator::new(
            executor.clone(),
            Arc::new(MemoryLogSink::new()),
            "backups",
        );

        let result = orchestrator
            .run(vec![profile("a")], &ScriptCatalog::new(), 0)
            .await;

        assert!(result.is_err());
        assert!(executor.invocations().is_empty());
    }

    /// A sink that panics, standing in for a bug inside a job.
    struct PanickingSink;

    impl LogSink for PanickingSink {
        fn persist(&self, _: &str, _: DateTime<Utc>, _: &str) -> anyhow::Result<std::path::PathBuf> {
            panic!("sink exploded");
        }
    }

    #[tokio::test]
    async fn panicking_job_still_yields_an_outcome_for_its_host() {
        let orchestrator = Orchestrator::new(
            Arc::new(SimulatedExecutor::new()),
            Arc::new(PanickingSink),
            Path::new("backups"),
        );

        let report = orchestrator
            .run(vec![profile("a")], &ScriptCatalog::new(), 1)
            .await
            .unwrap();

        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].host, "a");
        assert!(!report.outcomes[0].success);
        assert!(report.outcomes[0].message.contains("unexpected fault"));
    }
}
