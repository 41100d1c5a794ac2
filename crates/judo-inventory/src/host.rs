use std::collections::HashMap;
use std::sync::Mutex;

use judo_core::JudoError;
use judo_process::Proc;
use tokio::sync::watch;

/// State machine over a host's control-master connection.
///
/// `Starting`/`Stopping` are transient; a caller observing either one
/// mid-transition should treat "start while Starting/Running" as the
/// programming error it is, rather than silently queuing a second
/// master.
#[derive(Debug)]
pub enum MasterState {
    None,
    Starting,
    Running(Proc),
    Stopping,
}

impl std::fmt::Display for MasterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            MasterState::None => "none",
            MasterState::Starting => "starting",
            MasterState::Running(_) => "running",
            MasterState::Stopping => "stopping",
        };
        f.write_str(label)
    }
}

/// A single resolved target: its name, env overlay, remote working
/// directory, cancellation signal, and control-master handle.
///
/// Created exclusively by [`crate::Inventory`]; shared via `Arc` once
/// created since both the host's own task and the job's cancellation
/// broadcaster need a handle.
pub struct Host {
    pub name: String,
    env: Mutex<HashMap<String, String>>,
    pub groups: Vec<String>,
    workdir: Mutex<Option<String>>,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
    master: tokio::sync::Mutex<MasterState>,
}

impl Host {
    /// Build a new host named `name`, seeding its env with `HOSTNAME`.
    ///
    /// Only rejects an empty name; the additional restriction that a
    /// target must not contain `@` or whitespace is enforced where the
    /// name is accepted from the user (the frontend), not here, so that
    /// group-derived names are not second-guessed by this constructor.
    pub fn new(name: impl Into<String>) -> Result<Host, JudoError> {
        Self::with_groups(name, Vec::new())
    }

    pub fn with_groups(name: impl Into<String>, groups: Vec<String>) -> Result<Host, JudoError> {
        let name = name.into();
        if name.is_empty() {
            return Err(JudoError::FatalInternal("host name is empty".to_string()));
        }
        let mut env = HashMap::new();
        env.insert("HOSTNAME".to_string(), name.clone());
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Ok(Host {
            name,
            env: Mutex::new(env),
            groups,
            workdir: Mutex::new(None),
            cancel_tx,
            cancel_rx,
            master: tokio::sync::Mutex::new(MasterState::None),
        })
    }

    pub fn env_get_all(&self) -> HashMap<String, String> {
        self.env.lock().expect("env mutex poisoned").clone()
    }

    /// Overlay `key=value` onto this host's environment. Overwriting an
    /// existing key is a programming error, not a recoverable outcome.
    /// The overlay is meant to add to a host's identity, not mutate it.
    pub fn env_set(&self, key: impl Into<String>, value: impl Into<String>) -> Result<(), JudoError> {
        let key = key.into();
        let mut env = self.env.lock().expect("env mutex poisoned");
        if env.contains_key(&key) {
            return Err(JudoError::FatalInternal(format!(
                "tried to override existing env key: {key}"
            )));
        }
        env.insert(key, value.into());
        Ok(())
    }

    pub fn workdir(&self) -> Option<String> {
        self.workdir.lock().expect("workdir mutex poisoned").clone()
    }

    pub fn set_workdir(&self, workdir: Option<String>) {
        *self.workdir.lock().expect("workdir mutex poisoned") = workdir;
    }

    /// Broadcast cancellation to every outstanding receiver. Idempotent:
    /// calling this twice is a no-op the second time.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// Hand out a clone of this host's own receiver rather than a fresh
    /// `subscribe()`. A freshly subscribed `watch::Receiver` treats the
    /// sender's current value as already observed, so a cancellation
    /// that fired in the gap between two sequential transport calls
    /// would be invisible to the next call's `changed()`. Cloning the
    /// one receiver created alongside the sender preserves whatever
    /// "seen" state it's in, so a pending cancellation is still pending.
    pub fn cancel_rx(&self) -> watch::Receiver<bool> {
        self.cancel_rx.clone()
    }

    pub fn master_lock(&self) -> &tokio::sync::Mutex<MasterState> {
        &self.master
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_seeds_hostname_env() {
        let host = Host::new("web1").expect("construct host");
        assert_eq!(host.env_get_all().get("HOSTNAME"), Some(&"web1".to_string()));
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(Host::new("").is_err());
    }

    #[test]
    fn env_set_rejects_duplicate_key() {
        let host = Host::new("web1").expect("construct host");
        host.env_set("FOO", "1").expect("first set succeeds");
        let err = host.env_set("FOO", "2").unwrap_err();
        assert!(matches!(err, JudoError::FatalInternal(_)));
    }

    #[test]
    fn workdir_round_trips() {
        let host = Host::new("web1").expect("construct host");
        assert_eq!(host.workdir(), None);
        host.set_workdir(Some("/tmp/x".to_string()));
        assert_eq!(host.workdir(), Some("/tmp/x".to_string()));
    }

    #[test]
    fn cancel_is_idempotent_and_observed() {
        let host = Host::new("web1").expect("construct host");
        let mut rx = host.cancel_rx();
        assert!(!*rx.borrow());
        host.cancel();
        host.cancel();
        assert!(host.is_cancelled());
        rx.has_changed().expect("sender still alive");
    }
}
