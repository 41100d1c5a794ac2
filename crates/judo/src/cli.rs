use std::path::PathBuf;

use clap::Parser;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// judo: a parallel remote-execution tool.
///
/// Resolves host/group names, ships a script (or runs an ad-hoc
/// command) on every resolved host in parallel over `ssh`, and reports
/// per-host success or failure.
#[derive(Parser, Debug)]
#[command(
    name = "judo",
    disable_version_flag = true,
    about = "Run a script or command on a set of remote hosts, in parallel over ssh."
)]
pub struct Cli {
    /// Execute the script at SCRIPT (a file, or a directory containing
    /// an executable `script` entry point) on every target.
    #[arg(short = 's', long = "script", value_name = "SCRIPT", conflicts_with = "command")]
    pub script: Option<PathBuf>,

    /// Execute the shell COMMAND on every target; transmitted verbatim
    /// to the remote shell, with no local parsing.
    #[arg(short = 'c', long = "command", value_name = "COMMAND", conflicts_with = "script")]
    pub command: Option<String>,

    /// Idle timeout for each transport operation: resets whenever a
    /// line of output arrives, so this is not a wall-clock deadline.
    #[arg(short = 't', long = "timeout", value_name = "DURATION", default_value = "30s")]
    pub timeout: humantime::Duration,

    /// Add KEY=VALUE (or KEY, taken from the local environment) to
    /// every host's remote environment. Repeatable; repeating the same
    /// KEY is an argument error.
    #[arg(short = 'e', long = "env", value_name = "KEY[=VALUE]")]
    pub env: Vec<String>,

    /// Extra ssh/scp config file, forwarded verbatim as `-F FILE` to
    /// every ssh and scp invocation.
    #[arg(short = 'F', long = "ssh-config", value_name = "FILE")]
    pub ssh_config: Option<String>,

    /// Raise logging verbosity from info to debug.
    #[arg(short = 'd', long = "debug")]
    pub debug: bool,

    /// Print the version. If REQUIRED is given and does not match,
    /// exit 1 instead of 0.
    #[arg(short = 'v', long = "version", num_args = 0..=1, default_missing_value = "")]
    pub version: Option<String>,

    /// Host or group names to target. A name containing `@` or
    /// whitespace is rejected; per-user transport configuration
    /// belongs in ssh config, not the target name.
    #[arg(value_name = "TARGET")]
    pub targets: Vec<String>,
}
