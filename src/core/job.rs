//! The per-host backup lifecycle: deploy scripts, run pre-scripts,
//! mirror the remote path, run post-scripts, emit one outcome.

use crate::core::executor::{RemoteExecutor, TransferDirection, TransferRequest};
use crate::core::log_sink::LogSink;
use crate::core::models::{BackupOutcome, HostProfile, JobResult, ScriptSet, Stage};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// An environment-level error that interrupted a stage. Ordinary command
/// failures never take this path; they are decided on exit codes.
struct Fault {
    stage: Stage,
    error: anyhow::Error,
}

impl Fault {
    fn during<E: Into<anyhow::Error>>(stage: Stage) -> impl FnOnce(E) -> Fault {
        move |error| Fault {
            stage,
            error: error.into(),
        }
    }
}

/// Drives one host's backup from start to a terminal outcome.
///
/// Stages run strictly in order on the calling task. The job itself is
/// infallible: anything unexpected is folded into a failed outcome so it
/// can never abort sibling jobs.
pub struct HostBackupJob {
    profile: Arc<HostProfile>,
    scripts: ScriptSet,
    local_dest: PathBuf,
    executor: Arc<dyn RemoteExecutor>,
    sink: Arc<dyn LogSink>,
    started: DateTime<Utc>,
}

impl HostBackupJob {
    pub fn new(
        profile: Arc<HostProfile>,
        scripts: ScriptSet,
        local_dest: PathBuf,
        executor: Arc<dyn RemoteExecutor>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            profile,
            scripts,
            local_dest,
            executor,
            sink,
            started: Utc::now(),
        }
    }

    pub async fn run(self) -> BackupOutcome {
        let host = self.profile.hostname.clone();
        info!(%host, "backup started");

        match self.execute().await {
            Ok(outcome) => outcome,
            Err(fault) => BackupOutcome {
                host,
                success: false,
                message: format!(
                    "unexpected fault during {} stage: {:#}",
                    fault.stage, fault.error
                ),
                failed_stage: Some(fault.stage),
                log_path: None,
            },
        }
    }

    async fn execute(&self) -> Result<BackupOutcome, Fault> {
        self.deploy_scripts().await;

        if let Some((script, result)) = self.run_scripts(Stage::Pre, &self.scripts.pre).await? {
            return Ok(self.failed(
                Stage::Pre,
                format!(
                    "pre-script {script} failed with exit code {}: {}",
                    result.exit_code,
                    result.output.trim()
                ),
                None,
            ));
        }

        let transfer = self.run_transfer().await?;
        let log_path = self
            .sink
            .persist(&self.profile.hostname, self.started, &transfer.output)
            .map_err(Fault::during(Stage::Transfer))?;

        // Post-scripts run regardless of the transfer's exit code; the
        // transfer result alone never short-circuits the job.
        let post_failure = self.run_scripts(Stage::Post, &self.scripts.post).await?;

        Ok(self.conclude(transfer, post_failure, log_path))
    }

    /// Push the host's script directory to the remote scratch location.
    ///
    /// Failure here is soft: absence of scripts is a valid configuration,
    /// and a deploy that failed with scripts present will surface in the
    /// pre-script stage when the missing script refuses to run.
    async fn deploy_scripts(&self) {
        let host = &self.profile.hostname;
        if self.scripts.is_empty() {
            debug!(%host, "no scripts to deploy");
            return;
        }
        let Some(local_dir) = &self.scripts.local_dir else {
            debug!(%host, "no local script directory");
            return;
        };

        info!(%host, "deploying pre/post scripts");
        let req = TransferRequest {
            direction: TransferDirection::Push,
            remote_path: self.profile.scripts_remote_dir.clone(),
            local_path: local_dir.clone(),
            excludes: Vec::new(),
        };
        match self.executor.run_transfer(&self.profile, &req).await {
            Ok(result) if result.succeeded() => debug!(%host, "scripts deployed"),
            Ok(result) => warn!(
                %host,
                exit_code = result.exit_code,
                "script deployment failed, continuing"
            ),
            Err(fault) => warn!(%host, error = %fault, "script deployment failed, continuing"),
        }
    }

    /// Run one stage's scripts in order; returns the first failure.
    async fn run_scripts(
        &self,
        stage: Stage,
        scripts: &[String],
    ) -> Result<Option<(String, JobResult)>, Fault> {
        for script in scripts {
            let command = format!(
                "{}/{script}",
                self.profile.scripts_remote_dir.trim_end_matches('/')
            );
            debug!(host = %self.profile.hostname, %stage, %script, "running script");

            let result = self
                .executor
                .run_command(&self.profile, &command)
                .await
                .map_err(Fault::during(stage))?;

            if !result.succeeded() {
                return Ok(Some((script.clone(), result)));
            }
        }
        Ok(None)
    }

    async fn run_transfer(&self) -> Result<JobResult, Fault> {
        info!(host = %self.profile.hostname, "starting backup transfer");
        let req = TransferRequest {
            direction: TransferDirection::Pull,
            remote_path: self.profile.remote_path.clone(),
            local_path: self.local_dest.clone(),
            excludes: self.profile.excludes.clone(),
        };
        self.executor
            .run_transfer(&self.profile, &req)
            .await
            .map_err(Fault::during(Stage::Transfer))
    }

    /// Final success requires the transfer and every post-script to have
    /// passed; pre-script success is implied by reaching the transfer.
    fn conclude(
        &self,
        transfer: JobResult,
        post_failure: Option<(String, JobResult)>,
        log_path: PathBuf,
    ) -> BackupOutcome {
        match (transfer.succeeded(), post_failure) {
            (true, None) => BackupOutcome {
                host: self.profile.hostname.clone(),
                success: true,
                message: "backup completed successfully".to_string(),
                failed_stage: None,
                log_path: Some(log_path),
            },
            (true, Some((script, result))) => self.failed(
                Stage::Post,
                format!(
                    "post-script {script} failed with exit code {}: {}",
                    result.exit_code,
                    result.output.trim()
                ),
                Some(log_path),
            ),
            (false, None) => self.failed(
                Stage::Transfer,
                format!(
                    "transfer failed with exit code {}; see {}",
                    transfer.exit_code,
                    log_path.display()
                ),
                Some(log_path),
            ),
            (false, Some((script, result))) => self.failed(
                Stage::Transfer,
                format!(
                    "transfer failed with exit code {} (see {}); post-script {script} also failed with exit code {}",
                    transfer.exit_code,
                    log_path.display(),
                    result.exit_code
                ),
                Some(log_path),
            ),
        }
    }

    fn failed(&self, stage: Stage, message: String, log_path: Option<PathBuf>) -> BackupOutcome {
        BackupOutcome {
            host: self.profile.hostname.clone(),
            success: false,
            message,
            failed_stage: Some(stage),
            log_path,
        }
    }
}
