//! Per-host operations implemented on top of [`judo_process::Proc`]: push
//! files (`scp`), run a remote command (`ssh`), run a remote command and
//! capture its last output line, and start/stop a control-master
//! connection shared across the other three.
//!
//! Every operation here is driven by the same finite `tokio::select!`
//! loop: drain stdout/stderr, wait for the child to exit, race an
//! idle timeout, race cancellation. The timeout is reset on every line
//! received. It is an idle timeout, not a wall-clock deadline.

use std::sync::Arc;
use std::time::Duration;

use judo_core::{quote::shell_quote, JudoError, SshConfig};
use judo_inventory::{Host, MasterState};
use judo_process::{Proc, Signal};
use tracing::{info_span, warn, Instrument};

/// Handle bundling the ssh/scp configuration shared by every invocation
/// against a given host.
#[derive(Debug, Clone)]
pub struct Transport {
    config: SshConfig,
    /// Per-operation idle timeout: reset whenever a line arrives.
    timeout: Duration,
}

impl Transport {
    pub fn new(config: SshConfig, timeout: Duration) -> Self {
        Transport { config, timeout }
    }

    /// `scp -r <local> [<host>]:<remote>`.
    pub async fn push_files(
        &self,
        host: &Host,
        local: &str,
        remote: &str,
    ) -> Result<(), JudoError> {
        let target = format!("[{}]:{}", host.name, remote);
        let mut argv = self.config.follower_options();
        argv.push("-r".to_string());
        argv.push(local.to_string());
        argv.push(target);

        let proc = Proc::spawn("scp", &argv)?;
        drain(host, proc, self.timeout, |line| {
            tracing::debug!(line);
        })
        .instrument(info_span!("host", name = %host.name))
        .await
    }

    /// `ssh <extra args> <host> [cd <workdir> &&] env K=V... sh -c '<cmd>'`.
    /// stdout/stderr lines are both logged at debug level.
    pub async fn ssh(&self, host: &Host, command: &str) -> Result<(), JudoError> {
        let argv = self.ssh_argv(host, command);
        let proc = Proc::spawn("ssh", &argv)?;
        drain(host, proc, self.timeout, |line| {
            tracing::debug!(line);
        })
        .instrument(info_span!("host", name = %host.name))
        .await
    }

    /// Identical to [`Transport::ssh`] except the last stdout line is
    /// returned instead of logged; an empty string if none arrived.
    pub async fn ssh_read(&self, host: &Host, command: &str) -> Result<String, JudoError> {
        let argv = self.ssh_argv(host, command);
        let proc = Proc::spawn("ssh", &argv)?;
        let mut last = String::new();
        drain(host, proc, self.timeout, |line| {
            last = line;
        })
        .instrument(info_span!("host", name = %host.name))
        .await?;
        Ok(last)
    }

    fn ssh_argv(&self, host: &Host, command: &str) -> Vec<String> {
        let mut argv = self.config.follower_options();
        argv.push(host.name.clone());
        if let Some(workdir) = host.workdir() {
            argv.push("cd".to_string());
            argv.push(workdir);
            argv.push("&&".to_string());
        }
        argv.push("env".to_string());
        let mut env: Vec<_> = host.env_get_all().into_iter().collect();
        env.sort();
        for (key, value) in env {
            argv.push(format!("{key}={value}"));
        }
        argv.push("sh".to_string());
        argv.push("-c".to_string());
        argv.push(shell_quote(command));
        argv
    }

    /// Start a control-master for `host` if one is not already
    /// running. Starting while `Starting`/`Running` is a programming
    /// error. No-op (and stays `None`) on platforms without signal
    /// support, since a control master that cannot be interrupted
    /// cleanly is worse than no master at all.
    pub async fn start_master(&self, host: Arc<Host>) -> Result<(), JudoError> {
        if cfg!(not(unix)) {
            return Ok(());
        }

        let mut guard = host.master_lock().lock().await;
        match &*guard {
            MasterState::None => {}
            other => {
                return Err(JudoError::FatalInternal(format!(
                    "tried to start a master while it was {other}"
                )));
            }
        }
        *guard = MasterState::Starting;
        drop(guard);

        let mut argv = self.config.master_options();
        argv.push("-MN".to_string());
        argv.push(host.name.clone());

        let proc = match Proc::spawn("ssh", &argv) {
            Ok(proc) => proc,
            Err(e) => {
                let mut guard = host.master_lock().lock().await;
                *guard = MasterState::None;
                return Err(e);
            }
        };

        {
            let mut guard = host.master_lock().lock().await;
            *guard = MasterState::Running(proc);
        }

        tokio::spawn(supervise_master(host));
        Ok(())
    }

    /// Stop `host`'s control-master. Tolerates "no master" and "master
    /// already exited" as success, matching the source's own
    /// best-effort cleanup semantics.
    pub async fn stop_master(&self, host: &Host) -> Result<(), JudoError> {
        let mut guard = host.master_lock().lock().await;
        match &*guard {
            MasterState::Running(proc) if proc.is_alive() => {
                let pid_signal = proc.signal(Signal::Interrupt);
                *guard = MasterState::Stopping;
                pid_signal
            }
            _ => {
                warn!(host = %host.name, "there was no master to stop");
                *guard = MasterState::None;
                Ok(())
            }
        }
    }
}

/// How often the supervisor gives up its lock on the master state even
/// absent any stream activity. Without this, a `stop_master` call
/// competing for the same lock could wait as long as the master stays
/// silent, since the select below otherwise only yields on a stream
/// event, master exit, or host cancellation.
const MASTER_LOCK_YIELD_INTERVAL: Duration = Duration::from_millis(200);

/// Background task draining a running master's streams and reacting to
/// host cancellation. Exits (and resets the host's master state to
/// `None`) once the master process itself exits.
async fn supervise_master(host: Arc<Host>) {
    let mut cancel_rx = host.cancel_rx();
    loop {
        let mut guard = host.master_lock().lock().await;
        let proc = match &mut *guard {
            MasterState::Running(proc) => proc,
            _ => return,
        };

        tokio::select! {
            line = proc.stdout.recv() => {
                if let Some(line) = line {
                    tracing::debug!(host = %host.name, line);
                }
            }
            line = proc.stderr.recv() => {
                if let Some(line) = line {
                    tracing::debug!(host = %host.name, line);
                }
            }
            result = &mut proc.done => {
                if let Err(e) = result.unwrap_or(Ok(())) {
                    warn!(host = %host.name, error = %e, "control master exited");
                }
                *guard = MasterState::None;
                return;
            }
            _ = cancel_rx.changed() => {
                proc.close_stdin();
                if proc.is_alive() {
                    let _ = proc.signal(Signal::Interrupt);
                }
            }
            _ = tokio::time::sleep(MASTER_LOCK_YIELD_INTERVAL) => {}
        }
    }
}

/// Shared drain loop: consumes a `Proc`'s stdout/stderr until it exits,
/// racing an idle timeout and host cancellation. `on_stdout` receives
/// every stdout line as it arrives.
async fn drain<F>(
    host: &Host,
    mut proc: Proc,
    timeout: Duration,
    mut on_stdout: F,
) -> Result<(), JudoError>
where
    F: FnMut(String),
{
    proc.close_stdin();
    let mut cancel_rx = host.cancel_rx();
    let mut stdout_open = true;
    let mut stderr_open = true;

    loop {
        tokio::select! {
            line = proc.stdout.recv(), if stdout_open => {
                match line {
                    Some(line) => on_stdout(line),
                    None => stdout_open = false,
                }
            }
            line = proc.stderr.recv(), if stderr_open => {
                match line {
                    Some(line) => tracing::debug!(host = %host.name, line),
                    None => stderr_open = false,
                }
            }
            result = &mut proc.done => return result,
            _ = tokio::time::sleep(timeout) => return Err(JudoError::Timeout),
            _ = cancel_rx.changed() => {
                if proc.is_alive() {
                    let _ = proc.signal(Signal::Interrupt);
                }
                return Err(JudoError::Cancelled);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_transport() -> Transport {
        Transport::new(SshConfig::default(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn ssh_argv_omits_cd_when_workdir_unset() {
        let host = Host::new("web1").unwrap();
        let argv = test_transport().ssh_argv(&host, "true");
        assert!(!argv.contains(&"cd".to_string()));
        assert!(argv.contains(&"web1".to_string()));
    }

    #[tokio::test]
    async fn ssh_argv_includes_cd_when_workdir_set() {
        let host = Host::new("web1").unwrap();
        host.set_workdir(Some("/tmp/judo-xyz".to_string()));
        let argv = test_transport().ssh_argv(&host, "true");
        let cd_pos = argv.iter().position(|a| a == "cd").expect("cd present");
        assert_eq!(argv[cd_pos + 1], "/tmp/judo-xyz");
        assert_eq!(argv[cd_pos + 2], "&&");
    }

    #[tokio::test]
    async fn ssh_argv_quotes_the_command() {
        let host = Host::new("web1").unwrap();
        let argv = test_transport().ssh_argv(&host, "echo it's here");
        assert_eq!(argv.last().unwrap(), &shell_quote("echo it's here"));
    }

    #[tokio::test]
    async fn stop_master_on_none_is_a_no_op_success() {
        let host = Host::new("web1").unwrap();
        test_transport().stop_master(&host).await.unwrap();
    }

    #[tokio::test]
    async fn drain_over_cat_collects_stdout_lines() {
        let host = Host::new("web1").unwrap();
        let mut proc = Proc::spawn("sh", ["-c", "echo one; echo two"]).unwrap();
        proc.close_stdin();
        let mut lines = Vec::new();
        drain(&host, proc, Duration::from_secs(5), |l| lines.push(l))
            .await
            .unwrap();
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn drain_surfaces_nonzero_exit() {
        let host = Host::new("web1").unwrap();
        let proc = Proc::spawn("sh", ["-c", "exit 7"]).unwrap();
        let err = drain(&host, proc, Duration::from_secs(5), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, JudoError::RemoteExit { status: Some(7) }));
    }

    #[tokio::test]
    async fn drain_observes_cancellation_and_signals_child() {
        let host = Host::new("web1").unwrap();
        let proc = Proc::spawn("sleep", ["30"]).unwrap();
        host.cancel();
        let err = drain(&host, proc, Duration::from_secs(5), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, JudoError::Cancelled));
    }
}
