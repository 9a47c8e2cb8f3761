//! A scripted executor for exercising jobs without a network.
//!
//! Results are queued per host and consumed in invocation order; an
//! exhausted queue yields success, so tests only script the interesting
//! calls. Every invocation is recorded for assertions.

use crate::core::executor::{RemoteExecutor, RemoteFault, TransferDirection, TransferRequest};
use crate::core::models::{HostProfile, JobResult};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// One recorded call against the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Command { host: String, command: String },
    Transfer { host: String, direction: TransferDirection },
}

enum Scripted {
    Result(i32, String),
    Fault(String),
}

#[derive(Default)]
struct HostPlan {
    commands: VecDeque<Scripted>,
    transfers: VecDeque<Scripted>,
}

#[derive(Default)]
pub struct SimulatedExecutor {
    plans: Mutex<HashMap<String, HostPlan>>,
    invocations: Mutex<Vec<Invocation>>,
    latency: Option<Duration>,
    active_transfers: AtomicUsize,
    max_active_transfers: AtomicUsize,
}

impl SimulatedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every transfer by `latency`, so concurrent jobs overlap
    /// observably.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    pub fn script_command_result(&self, host: &str, exit_code: i32, output: &str) {
        self.plan(host, |p| {
            p.commands
                .push_back(Scripted::Result(exit_code, output.to_string()))
        });
    }

    pub fn script_command_fault(&self, host: &str, message: &str) {
        self.plan(host, |p| {
            p.commands.push_back(Scripted::Fault(message.to_string()))
        });
    }

    pub fn script_transfer_result(&self, host: &str, exit_code: i32, output: &str) {
        self.plan(host, |p| {
            p.transfers
                .push_back(Scripted::Result(exit_code, output.to_string()))
        });
    }

    pub fn script_transfer_fault(&self, host: &str, message: &str) {
        self.plan(host, |p| {
            p.transfers.push_back(Scripted::Fault(message.to_string()))
        });
    }

    /// Everything this executor has been asked to do, in call order.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    /// High-water mark of transfers that were in flight at the same time.
    pub fn max_active_transfers(&self) -> usize {
        self.max_active_transfers.load(Ordering::SeqCst)
    }

    fn plan(&self, host: &str, f: impl FnOnce(&mut HostPlan)) {
        let mut plans = self.plans.lock().unwrap();
        f(plans.entry(host.to_string()).or_default())
    }

    fn next_scripted(
        &self,
        host: &str,
        pick: impl FnOnce(&mut HostPlan) -> Option<Scripted>,
    ) -> Result<JobResult, RemoteFault> {
        let scripted = {
            let mut plans = self.plans.lock().unwrap();
            plans.get_mut(host).and_then(pick)
        };
        match scripted {
            Some(Scripted::Result(exit_code, output)) => Ok(JobResult { exit_code, output }),
            Some(Scripted::Fault(message)) => Err(RemoteFault::Injected(message)),
            None => Ok(JobResult {
                exit_code: 0,
                output: "simulated: ok".to_string(),
            }),
        }
    }
}

#[async_trait]
impl RemoteExecutor for SimulatedExecutor {
    async fn run_command(
        &self,
        host: &HostProfile,
        command: &str,
    ) -> Result<JobResult, RemoteFault> {
        self.invocations.lock().unwrap().push(Invocation::Command {
            host: host.hostname.clone(),
            command: command.to_string(),
        });

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.next_scripted(&host.hostname, |p| p.commands.pop_front())
    }

    async fn run_transfer(
        &self,
        host: &HostProfile,
        req: &TransferRequest,
    ) -> Result<JobResult, RemoteFault> {
        self.invocations.lock().unwrap().push(Invocation::Transfer {
            host: host.hostname.clone(),
            direction: req.direction,
        });

        let active = self.active_transfers.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_transfers.fetch_max(active, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let result = self.next_scripted(&host.hostname, |p| p.transfers.pop_front());
        self.active_transfers.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
