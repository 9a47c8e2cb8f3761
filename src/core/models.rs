use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// Connection and transfer parameters for one remote host.
///
/// Loaded once from a per-host profile file, then shared read-only
/// across workers. The hostname doubles as the unique key for the run.
#[derive(Debug, Clone, Deserialize)]
pub struct HostProfile {
    pub hostname: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Extra ssh options, passed through in order.
    #[serde(default)]
    pub ssh_args: Vec<String>,
    /// Remote directory to back up.
    pub remote_path: String,
    /// Rsync exclude patterns, applied in order.
    #[serde(default)]
    pub excludes: Vec<String>,
    /// Scratch directory on the remote where pre/post scripts are deployed.
    #[serde(default = "default_scripts_remote_dir")]
    pub scripts_remote_dir: String,
}

fn default_username() -> String {
    "root".to_string()
}

fn default_port() -> u16 {
    22
}

fn default_scripts_remote_dir() -> String {
    "/tmp/ssb_scripts".to_string()
}

impl HostProfile {
    /// `user@host` form used by both ssh and rsync remote specs.
    pub fn connect_string(&self) -> String {
        format!("{}@{}", self.username, self.hostname)
    }
}

/// Pre/post maintenance scripts discovered for one host.
///
/// Script names are relative to `local_dir` and kept in lexicographic
/// order, which defines execution order. A host with no script directory
/// has an empty set; that is a valid configuration, not an error.
#[derive(Debug, Clone, Default)]
pub struct ScriptSet {
    pub local_dir: Option<PathBuf>,
    pub pre: Vec<String>,
    pub post: Vec<String>,
}

impl ScriptSet {
    pub fn is_empty(&self) -> bool {
        self.pre.is_empty() && self.post.is_empty()
    }
}

/// Hostname -> ScriptSet. Hosts absent from the catalog have no scripts.
pub type ScriptCatalog = HashMap<String, ScriptSet>;

/// Outcome of a single remote command or transfer invocation.
///
/// A non-zero exit code is an ordinary failure the caller interprets;
/// environment-level faults are signalled separately as `RemoteFault`.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub exit_code: i32,
    /// Combined stdout + stderr of the invocation.
    pub output: String,
}

impl JobResult {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// The lifecycle stage in which a backup job failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Deploy,
    Pre,
    Transfer,
    Post,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Deploy => "deploy",
            Stage::Pre => "pre",
            Stage::Transfer => "transfer",
            Stage::Post => "post",
        };
        f.write_str(s)
    }
}

/// Terminal result of one host's backup job. Created exactly once per
/// submitted host and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct BackupOutcome {
    pub host: String,
    pub success: bool,
    pub message: String,
    pub failed_stage: Option<Stage>,
    /// Where the transfer output was persisted, when it was. Always set
    /// on success; set on failure only if the transfer stage was reached.
    pub log_path: Option<PathBuf>,
}

/// Aggregate of all hosts' outcomes for one run, in completion order.
#[derive(Debug, Default)]
pub struct Report {
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub outcomes: Vec<BackupOutcome>,
}

impl Report {
    pub fn push(&mut self, outcome: BackupOutcome) {
        if outcome.success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.outcomes.push(outcome);
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(host: &str, success: bool) -> BackupOutcome {
        BackupOutcome {
            host: host.to_string(),
            success,
            message: String::new(),
            failed_stage: None,
            log_path: None,
        }
    }

    #[test]
    fn report_counts_track_pushed_outcomes() {
        let mut report = Report {
            submitted: 3,
            ..Default::default()
        };
        report.push(outcome("a", true));
        report.push(outcome("b", false));
        report.push(outcome("c", true));

        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.outcomes.len(), 3);
        assert!(!report.all_succeeded());
    }

    #[test]
    fn report_preserves_push_order() {
        let mut report = Report::default();
        report.push(outcome("b", true));
        report.push(outcome("a", true));

        let hosts: Vec<&str> = report.outcomes.iter().map(|o| o.host.as_str()).collect();
        assert_eq!(hosts, vec!["b", "a"]);
        assert!(report.all_succeeded());
    }

    #[test]
    fn job_result_succeeds_only_on_zero_exit() {
        let ok = JobResult {
            exit_code: 0,
            output: String::new(),
        };
        let not_ok = JobResult {
            exit_code: 23,
            output: String::new(),
        };
        assert!(ok.succeeded());
        assert!(!not_ok.succeeded());
    }
}
