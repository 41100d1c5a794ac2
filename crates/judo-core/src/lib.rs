//! Shared error taxonomy and shell/transport plumbing used across the
//! inventory, transport, and job crates.

pub mod quote;
pub mod ssh_config;

pub use ssh_config::SshConfig;

/// Error taxonomy for remote-execution operations.
///
/// Operational errors (`Timeout`, `Cancelled`, `RemoteExit`,
/// `TransportFailure`) are expected outcomes of a per-host operation and
/// flow upward as part of a `JobResult`. `ScriptValidation` and `Argument`
/// are user-facing configuration mistakes. `FatalInternal` denotes a
/// broken invariant (a second control-master started on a host, a
/// non-regular file under `groups/`). It is never expected in correct
/// usage.
#[derive(thiserror::Error, Debug)]
pub enum JudoError {
    #[error("operation timed out")]
    Timeout,

    #[error("operation cancelled")]
    Cancelled,

    #[error("remote command exited with status {status:?}")]
    RemoteExit { status: Option<i32> },

    #[error("transport failure: {0}")]
    TransportFailure(String),

    #[error("script validation failed: {0}")]
    ScriptValidation(String),

    #[error("bad argument: {0}")]
    Argument(String),

    #[error("internal invariant violated: {0}")]
    FatalInternal(String),
}

impl JudoError {
    /// True for errors that represent a remote/transport-level failure
    /// rather than a usage or internal-invariant problem.
    pub fn is_operational(&self) -> bool {
        matches!(
            self,
            JudoError::Timeout
                | JudoError::Cancelled
                | JudoError::RemoteExit { .. }
                | JudoError::TransportFailure(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_exit_displays_status() {
        let err = JudoError::RemoteExit { status: Some(1) };
        assert_eq!(err.to_string(), "remote command exited with status Some(1)");
    }

    #[test]
    fn timeout_is_operational() {
        assert!(JudoError::Timeout.is_operational());
        assert!(!JudoError::Argument("x".into()).is_operational());
    }
}
