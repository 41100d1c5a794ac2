//! Line-buffered subprocess wrapper: exposes a child process's three
//! standard streams as bounded line-oriented channels and its termination
//! as a one-shot result.
//!
//! Channels have capacity 1, the closest async analogue to an unbuffered
//! channel. A consumer that does not drain its receiver stalls the
//! child's I/O; this is intentional, the design assumes small, chatty
//! command output rather than bulk data transfer.

mod signal;

pub use signal::Signal;

use std::ffi::OsStr;
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use judo_core::JudoError;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

const CHANNEL_CAPACITY: usize = 1;

/// Explicit alive-state enum, published under a mutex. Replaces the
/// "nulled-out process handle" race of checking a raw pointer for
/// liveness: every reader observes one of three well-defined states
/// instead of racing a write that clears a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcState {
    Starting,
    Running,
    Exited,
}

/// A spawned child process, wired up for line-oriented I/O.
///
/// `done` fires exactly once, after the stdin/stdout/stderr tasks have
/// all finished and the child has exited.
pub struct Proc {
    state: Arc<Mutex<ProcState>>,
    pid: Option<u32>,
    stdin_tx: Option<mpsc::Sender<String>>,
    pub stdout: mpsc::Receiver<String>,
    pub stderr: mpsc::Receiver<String>,
    pub done: oneshot::Receiver<Result<(), JudoError>>,
}

impl Proc {
    /// Spawn `program` with `args`, returning before the child exits.
    pub fn spawn<I, S>(program: &str, args: I) -> Result<Proc, JudoError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| JudoError::TransportFailure(format!("failed to spawn {program}: {e}")))?;
        let pid = child.id();

        let stdin = child
            .stdin
            .take()
            .expect("stdin was configured as piped");
        let stdout = child
            .stdout
            .take()
            .expect("stdout was configured as piped");
        let stderr = child
            .stderr
            .take()
            .expect("stderr was configured as piped");

        let (stdin_tx, stdin_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);
        let (stdout_tx, stdout_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);
        let (stderr_tx, stderr_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);
        let (done_tx, done_rx) = oneshot::channel();

        let state = Arc::new(Mutex::new(ProcState::Running));
        let supervisor_state = state.clone();

        let stdin_task = tokio::spawn(writer_stdin(stdin, stdin_rx));
        let stdout_task = tokio::spawn(reader_lines(stdout, stdout_tx));
        let stderr_task = tokio::spawn(reader_lines(stderr, stderr_tx));

        tokio::spawn(async move {
            let _ = stdin_task.await;
            let _ = stdout_task.await;
            let _ = stderr_task.await;

            let result = match child.wait().await {
                Ok(status) if status.success() => Ok(()),
                Ok(status) => Err(JudoError::RemoteExit {
                    status: status.code(),
                }),
                Err(e) => Err(JudoError::TransportFailure(e.to_string())),
            };

            *supervisor_state.lock().expect("state mutex poisoned") = ProcState::Exited;
            let _ = done_tx.send(result);
        });

        Ok(Proc {
            state,
            pid,
            stdin_tx: Some(stdin_tx),
            stdout: stdout_rx,
            stderr: stderr_rx,
            done: done_rx,
        })
    }

    /// Close the child's stdin, signalling EOF. Idempotent.
    pub fn close_stdin(&mut self) {
        self.stdin_tx = None;
    }

    /// Send one line to the child's stdin.
    pub async fn send_stdin(&self, line: impl Into<String>) -> Result<(), JudoError> {
        match &self.stdin_tx {
            Some(tx) => tx
                .send(line.into())
                .await
                .map_err(|_| JudoError::FatalInternal("stdin already closed".into())),
            None => Err(JudoError::FatalInternal("stdin already closed".into())),
        }
    }

    /// Whether the child is still running.
    pub fn is_alive(&self) -> bool {
        matches!(
            *self.state.lock().expect("state mutex poisoned"),
            ProcState::Running | ProcState::Starting
        )
    }

    /// Send `sig` to the child. Fails if the process is not running
    /// rather than panicking, a redesign over the source, which treated
    /// "signal a dead process" as a programmer error.
    pub fn signal(&self, sig: Signal) -> Result<(), JudoError> {
        if !self.is_alive() {
            return Err(JudoError::FatalInternal(
                "process already dead".to_string(),
            ));
        }
        let pid = self
            .pid
            .ok_or_else(|| JudoError::FatalInternal("process has no pid".to_string()))?;
        signal::send(pid, sig)
    }
}

async fn reader_lines<R>(pipe: R, tx: mpsc::Sender<String>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = BufReader::new(pipe).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("error reading child output: {e}");
                break;
            }
        }
    }
}

async fn writer_stdin<W>(mut pipe: W, mut rx: mpsc::Receiver<String>)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        if pipe.write_all(line.as_bytes()).await.is_err() {
            break;
        }
        if pipe.write_all(b"\n").await.is_err() {
            break;
        }
    }
    let _ = pipe.shutdown().await;
}

/// Spawn `program` with `args`, returning only its stdout lines; stderr is
/// discarded and the child's stdin is closed immediately.
pub fn get_output_lines<I, S>(program: &str, args: I) -> Result<mpsc::Receiver<String>, JudoError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut proc = Proc::spawn(program, args)?;
    proc.close_stdin();
    Ok(proc.stdout)
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
