//! Signal delivery to a running child, by pid.

use judo_core::JudoError;

/// Signals this crate knows how to deliver. Kept deliberately narrow:
/// the rest of the system only ever needs to interrupt a running
/// transport operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Interrupt,
}

#[cfg(unix)]
pub(crate) fn send(pid: u32, sig: Signal) -> Result<(), JudoError> {
    let raw = match sig {
        Signal::Interrupt => libc::SIGINT,
    };
    // SAFETY: `pid` came from `Child::id()` for a process this Proc owns
    // and has not yet reaped; `kill` with a valid pid and signal number
    // is async-signal-safe and cannot violate memory safety.
    let ret = unsafe { libc::kill(pid as i32, raw) };
    if ret == 0 {
        Ok(())
    } else {
        Err(JudoError::TransportFailure(
            std::io::Error::last_os_error().to_string(),
        ))
    }
}

#[cfg(not(unix))]
pub(crate) fn send(_pid: u32, _sig: Signal) -> Result<(), JudoError> {
    Err(JudoError::TransportFailure(
        "signal delivery is not supported on this platform".to_string(),
    ))
}
