use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use judo_core::{JudoError, SshConfig};
use judo_inventory::{Host, Inventory};
use judo_transport::Transport;
use tokio::task::JoinSet;
use tracing::warn;

use crate::payload::{Command, Payload, Script};

/// Per-host outcome of a [`Job`]. Absence of an error is success.
#[derive(Debug, Default)]
pub struct JobResult(HashMap<String, Result<(), JudoError>>);

impl JobResult {
    /// Partition into a sorted list of successful host names and a
    /// mapping of failed host names to their error.
    pub fn report(self) -> (Vec<String>, HashMap<String, JudoError>) {
        let mut successful = Vec::new();
        let mut failful = HashMap::new();
        for (name, result) in self.0 {
            match result {
                Ok(()) => successful.push(name),
                Err(e) => {
                    failful.insert(name, e);
                }
            }
        }
        successful.sort();
        (successful, failful)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Bundles inventory, payload, timeout, environment overlay, and extra
/// transport arguments; orchestrates parallel execution across every
/// resolved host and owns signal-driven cancellation.
pub struct Job {
    inventory: Inventory,
    payload: Payload,
    timeout: Duration,
    add_env: HashMap<String, String>,
    ssh_config: SshConfig,
}

impl Job {
    pub fn new(
        inventory: Inventory,
        payload: Payload,
        timeout: Duration,
        add_env: HashMap<String, String>,
        ssh_config: SshConfig,
    ) -> Job {
        Job {
            inventory,
            payload,
            timeout,
            add_env,
            ssh_config,
        }
    }

    pub fn hosts(&self) -> &[Arc<Host>] {
        self.inventory.get_hosts()
    }

    /// Resolve `names` and overlay `add_env` onto every resolved host.
    /// Overlaying a key a host already carries is a programming error,
    /// not a recoverable condition; duplicate overlay keys mean the
    /// caller built the job incorrectly.
    pub async fn populate_inventory(&mut self, names: &[String]) -> Result<(), JudoError> {
        self.inventory.populate(names).await?;
        for host in self.inventory.get_hosts() {
            for (key, value) in &self.add_env {
                host.env_set(key.clone(), value.clone())?;
            }
        }
        Ok(())
    }

    /// Install a `Ctrl-C` handler that cancels every resolved host on
    /// first interrupt. Spawns a detached task; safe to call once per
    /// job after `populate_inventory`.
    pub fn install_signal_handlers(&self) {
        let hosts: Vec<Arc<Host>> = self.inventory.get_hosts().to_vec();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                for host in &hosts {
                    host.cancel();
                }
            }
        });
    }

    /// Run the job's payload against every resolved host in parallel,
    /// one task per host via [`JoinSet`]. A panicking host task is
    /// converted into a per-host [`JudoError::FatalInternal`] rather
    /// than taking down the whole job: one buggy generator or
    /// transport bug must not swallow every other host's result.
    pub async fn execute(&self) -> JobResult {
        let transport = Transport::new(self.ssh_config.clone(), self.timeout);
        let mut set = JoinSet::new();
        let mut names_by_task = HashMap::new();

        for host in self.inventory.get_hosts().iter().cloned() {
            let transport = transport.clone();
            let payload = self.payload.clone();
            let name = host.name.clone();
            let abort = set.spawn(async move {
                let result = match &payload {
                    Payload::Script(script) => {
                        send_remote_and_run(&transport, &host, script).await
                    }
                    Payload::Command(command) => run_remote(&transport, &host, command).await,
                };
                (host.name.clone(), result)
            });
            names_by_task.insert(abort.id(), name);
        }

        let mut results = HashMap::new();
        while let Some(joined) = set.join_next_with_id().await {
            match joined {
                Ok((_, (name, result))) => {
                    results.insert(name, result);
                }
                Err(join_err) => {
                    let name = names_by_task
                        .remove(&join_err.id())
                        .unwrap_or_else(|| "<unknown host>".to_string());
                    warn!(host = %name, "host task panicked: {join_err}");
                    results.insert(
                        name,
                        Err(JudoError::FatalInternal(format!("host task panicked: {join_err}"))),
                    );
                }
            }
        }

        JobResult(results)
    }
}

/// The ad-hoc branch: no file transfer, no workdir, just run the
/// command string verbatim.
async fn run_remote(transport: &Transport, host: &Host, command: &Command) -> Result<(), JudoError> {
    transport.ssh(host, &command.cmd).await
}

/// The scripted branch: start a control-master, provision a scratch
/// directory, upload the payload, run it, and clean up, in that
/// order, with cleanup attempted on every exit path. A job error takes
/// priority over a cleanup error when both occur.
async fn send_remote_and_run(
    transport: &Transport,
    host: &Arc<Host>,
    script: &Script,
) -> Result<(), JudoError> {
    let _ = transport.start_master(host.clone()).await;
    let result = send_remote_and_run_inner(transport, host, script).await;
    let _ = transport.stop_master(host).await;
    result
}

async fn send_remote_and_run_inner(
    transport: &Transport,
    host: &Host,
    script: &Script,
) -> Result<(), JudoError> {
    transport.ssh(host, "mkdir -p $HOME/.judo").await?;
    let workdir = transport
        .ssh_read(host, "TMPDIR=$HOME/.judo mktemp -d")
        .await?;
    host.set_workdir(Some(workdir.clone()));

    let local = script
        .path
        .to_str()
        .ok_or_else(|| JudoError::Argument("script path is not valid UTF-8".to_string()))?;

    if let Err(e) = transport.push_files(host, local, &workdir).await {
        let _ = cleanup(transport, host, &workdir).await;
        return Err(e);
    }

    let remote = format!("{workdir}/{}", script.basename());
    let remote_command = if script.is_dir_mode() {
        format!("{remote}/script")
    } else {
        remote
    };

    let job_result = transport.ssh(host, &remote_command).await;
    let cleanup_result = cleanup(transport, host, &workdir).await;

    match (job_result, cleanup_result) {
        (Err(e), _) => Err(e),
        (Ok(()), Err(e)) => Err(e),
        (Ok(()), Ok(())) => Ok(()),
    }
}

async fn cleanup(transport: &Transport, host: &Host, workdir: &str) -> Result<(), JudoError> {
    host.set_workdir(None);
    transport.ssh(host, &format!("rm -r {workdir}")).await
}
