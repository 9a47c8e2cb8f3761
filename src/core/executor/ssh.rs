//! Remote execution over ssh and rsync subprocesses.

use crate::core::executor::{RemoteExecutor, RemoteFault, TransferDirection, TransferRequest};
use crate::core::models::{HostProfile, JobResult};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Executes remote commands via `ssh` and transfers via `rsync -e ssh`.
///
/// An optional per-invocation timeout converts a hung remote process into
/// a `RemoteFault::Timeout`; the child is killed when the future is dropped.
pub struct SshExecutor {
    timeout: Option<Duration>,
}

impl SshExecutor {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    async fn run(&self, program: &str, args: &[String]) -> Result<JobResult, RemoteFault> {
        debug!(program, ?args, "spawning remote invocation");

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, output)
                .await
                .map_err(|_| RemoteFault::Timeout(limit))?,
            None => output.await,
        }
        .map_err(|source| RemoteFault::Spawn {
            program: program.to_string(),
            source,
        })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(JobResult {
            // Death by signal carries no exit code; fold it into -1.
            exit_code: output.status.code().unwrap_or(-1),
            output: combined,
        })
    }
}

/// Arguments for one `ssh` command invocation.
fn ssh_args(host: &HostProfile, command: &str) -> Vec<String> {
    let mut args = vec!["-p".to_string(), host.port.to_string()];
    args.extend(host.ssh_args.iter().cloned());
    args.push(host.connect_string());
    args.push(command.to_string());
    args
}

/// Arguments for one `rsync` invocation.
///
/// `--delete` is present in both directions: the backup pull mirrors
/// remote state exactly, and the deploy push mirrors the scratch
/// directory so stale scripts from earlier runs are removed.
fn rsync_args(host: &HostProfile, req: &TransferRequest) -> Vec<String> {
    let mut transport = format!("ssh -p {}", host.port);
    for arg in &host.ssh_args {
        transport.push(' ');
        transport.push_str(arg);
    }

    let mut args = vec![
        "-e".to_string(),
        transport,
        "-avPHS".to_string(),
        "--delete".to_string(),
    ];
    args.extend(req.excludes.iter().map(|e| format!("--exclude={e}")));

    let remote = format!("{}:{}", host.connect_string(), req.remote_path);
    match req.direction {
        TransferDirection::Pull => {
            args.push(remote);
            args.push(req.local_path.display().to_string());
        }
        TransferDirection::Push => {
            // Trailing slash so the directory's contents land in the
            // scratch directory rather than a nested copy of it.
            args.push(format!("{}/", req.local_path.display()));
            args.push(remote);
        }
    }
    args
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn run_command(
        &self,
        host: &HostProfile,
        command: &str,
    ) -> Result<JobResult, RemoteFault> {
        self.run("ssh", &ssh_args(host, command)).await
    }

    async fn run_transfer(
        &self,
        host: &HostProfile,
        req: &TransferRequest,
    ) -> Result<JobResult, RemoteFault> {
        self.run("rsync", &rsync_args(host, req)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn profile() -> HostProfile {
        HostProfile {
            hostname: "web01.example.com".to_string(),
            username: "backup".to_string(),
            port: 2202,
            ssh_args: vec!["-oStrictHostKeyChecking=no".to_string()],
            remote_path: "/srv".to_string(),
            excludes: vec!["*.tmp".to_string(), "cache/".to_string()],
            scripts_remote_dir: "/tmp/ssb_scripts".to_string(),
        }
    }

    #[test]
    fn ssh_args_carry_port_options_and_command() {
        let args = ssh_args(&profile(), "/tmp/ssb_scripts/pre-01.sh");
        assert_eq!(
            args,
            vec![
                "-p",
                "2202",
                "-oStrictHostKeyChecking=no",
                "backup@web01.example.com",
                "/tmp/ssb_scripts/pre-01.sh",
            ]
        );
    }

    #[test]
    fn pull_transfer_mirrors_remote_to_local() {
        let p = profile();
        let req = TransferRequest {
            direction: TransferDirection::Pull,
            remote_path: p.remote_path.clone(),
            local_path: PathBuf::from("backups/web01.example.com"),
            excludes: p.excludes.clone(),
        };
        let args = rsync_args(&p, &req);
        assert_eq!(
            args,
            vec![
                "-e",
                "ssh -p 2202 -oStrictHostKeyChecking=no",
                "-avPHS",
                "--delete",
                "--exclude=*.tmp",
                "--exclude=cache/",
                "backup@web01.example.com:/srv",
                "backups/web01.example.com",
            ]
        );
    }

    #[test]
    fn push_transfer_mirrors_the_scratch_directory() {
        let p = profile();
        let req = TransferRequest {
            direction: TransferDirection::Push,
            remote_path: p.scripts_remote_dir.clone(),
            local_path: PathBuf::from("scripts/web01.example.com"),
            excludes: Vec::new(),
        };
        let args = rsync_args(&p, &req);
        // Deploy is a delete-mirror too, so stale scripts never linger.
        assert!(args.contains(&"--delete".to_string()));
        assert_eq!(args[args.len() - 2], "scripts/web01.example.com/");
        assert_eq!(
            args.last().unwrap(),
            "backup@web01.example.com:/tmp/ssb_scripts"
        );
    }

    #[test]
    fn excludes_keep_their_configured_order() {
        let p = profile();
        let req = TransferRequest {
            direction: TransferDirection::Pull,
            remote_path: p.remote_path.clone(),
            local_path: PathBuf::from("backups/web01.example.com"),
            excludes: vec!["b".to_string(), "a".to_string()],
        };
        let args = rsync_args(&p, &req);
        let excludes: Vec<&String> = args
            .iter()
            .filter(|a| a.starts_with("--exclude="))
            .collect();
        assert_eq!(excludes, vec!["--exclude=b", "--exclude=a"]);
    }
}
