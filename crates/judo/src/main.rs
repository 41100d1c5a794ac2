mod cli;

use std::collections::HashMap;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::Parser;
use judo_core::{JudoError, SshConfig};
use judo_inventory::Inventory;
use judo_job::{Command, Job, Payload, Script};
use tracing_subscriber::EnvFilter;

use cli::{Cli, VERSION};

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // clap's own exit codes (0 for --help/--version, 2 otherwise)
            // collide with this codebase's "2 = all hosts failed"; 111 is
            // this codebase's usage/argument-error code everywhere else.
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 111,
            };
            std::process::exit(code);
        }
    };
    init_tracing(cli.debug);
    std::process::exit(run(cli).await);
}

fn init_tracing(debug: bool) {
    let default_filter = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init()
        .ok();
}

/// Dispatch a parsed `Cli` to completion and return the process exit
/// code. Kept as a thin wrapper over `judo-job` so `main` itself stays
/// a one-liner. Everything that can fail before a host task is spawned
/// is collected into one `anyhow::Result`, matching how this codebase
/// wraps typed errors in `anyhow` at its CLI boundary.
async fn run(cli: Cli) -> i32 {
    if let Some(required) = &cli.version {
        println!("{VERSION}");
        return if required.is_empty() || required == VERSION { 0 } else { 1 };
    }

    let job = match prepare(&cli).await {
        Ok(job) => job,
        Err(e) => {
            eprintln!("judo: {e:#}");
            return 111;
        }
    };
    job.install_signal_handlers();

    let names: Vec<&str> = job.hosts().iter().map(|h| h.name.as_str()).collect();
    println!("Running: {names:?}");

    let (successful, failful) = job.execute().await.report();

    let mut failed_names: Vec<&String> = failful.keys().collect();
    failed_names.sort();
    for name in &failed_names {
        println!("Failed: {name}: {}", failful[*name]);
    }
    if !successful.is_empty() {
        println!("Success: {successful:?}");
    }

    if !failful.is_empty() {
        if successful.is_empty() { 2 } else { 1 }
    } else {
        0
    }
}

/// The resolved command-line configuration: everything `Cli` carries,
/// validated and normalized. Kept separate from `Cli` so `main.rs`'s
/// dispatch logic never has to re-check invariants `clap` and
/// `prepare` already established.
struct RunConfig {
    payload: Payload,
    timeout: std::time::Duration,
    add_env: HashMap<String, String>,
    ssh_config: SshConfig,
    targets: Vec<String>,
}

/// Validate arguments, check for `ssh`/`scp` on `PATH`, and resolve the
/// inventory: everything that must succeed before any host task
/// starts.
async fn prepare(cli: &Cli) -> anyhow::Result<Job> {
    let payload = build_payload(cli)?;

    if let Some(bad) = cli.targets.iter().find(|t| is_invalid_target(t)) {
        anyhow::bail!("bad argument: target must not contain '@' or whitespace: {bad}");
    }

    let add_env = parse_env_args(&cli.env)?;

    which::which("ssh").context("ssh not found on PATH")?;
    which::which("scp").context("scp not found on PATH")?;

    let ssh_args = cli
        .ssh_config
        .clone()
        .map(|file| vec!["-F".to_string(), file])
        .unwrap_or_default();

    let config = RunConfig {
        payload,
        timeout: *cli.timeout,
        add_env,
        ssh_config: SshConfig::new(ssh_args),
        targets: cli.targets.clone(),
    };

    let inventory = Inventory::new().with_timeout(config.timeout);
    let mut job = Job::new(
        inventory,
        config.payload,
        config.timeout,
        config.add_env,
        config.ssh_config,
    );
    job.populate_inventory(&config.targets)
        .await
        .context("failed to resolve inventory")?;
    Ok(job)
}

/// A target name must not contain `@` (no per-user transport config
/// encoded in the identifier) or whitespace (it is interpolated
/// verbatim into an `ssh` argv element).
fn is_invalid_target(target: &str) -> bool {
    target.contains('@') || target.chars().any(char::is_whitespace)
}

fn build_payload(cli: &Cli) -> Result<Payload, JudoError> {
    match (&cli.script, &cli.command) {
        (Some(path), None) => Ok(Payload::Script(Script::new(path.clone())?)),
        (None, Some(cmd)) => Ok(Payload::Command(Command::new(cmd.clone()))),
        (None, None) => Err(JudoError::Argument(
            "exactly one of -s/--script or -c/--command is required".to_string(),
        )),
        (Some(_), Some(_)) => unreachable!("clap enforces -s/-c mutual exclusion"),
    }
}

/// Parse `-e KEY=VALUE` / `-e KEY` entries. `KEY` alone is resolved
/// from the local environment; repeating a key is an argument error.
fn parse_env_args(args: &[String]) -> Result<HashMap<String, String>, JudoError> {
    let mut env = HashMap::new();
    for arg in args {
        let (key, value) = match arg.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => {
                let value = std::env::var(arg)
                    .map_err(|_| JudoError::Argument(format!("{arg} is not set in the local environment")))?;
                (arg.clone(), value)
            }
        };
        if env.insert(key.clone(), value).is_some() {
            return Err(JudoError::Argument(format!("duplicate -e key: {key}")));
        }
    }
    Ok(env)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_env_args_accepts_explicit_value() {
        let env = parse_env_args(&["FOO=bar".to_string()]).unwrap();
        assert_eq!(env.get("FOO"), Some(&"bar".to_string()));
    }

    #[test]
    fn parse_env_args_reads_from_local_environment() {
        std::env::set_var("JUDO_TEST_ENV_VAR", "value123");
        let env = parse_env_args(&["JUDO_TEST_ENV_VAR".to_string()]).unwrap();
        assert_eq!(env.get("JUDO_TEST_ENV_VAR"), Some(&"value123".to_string()));
    }

    #[test]
    fn parse_env_args_rejects_missing_local_variable() {
        let err = parse_env_args(&["JUDO_TEST_DOES_NOT_EXIST".to_string()]).unwrap_err();
        assert!(matches!(err, JudoError::Argument(_)));
    }

    #[test]
    fn parse_env_args_rejects_duplicate_keys() {
        let err = parse_env_args(&["FOO=1".to_string(), "FOO=2".to_string()]).unwrap_err();
        assert!(matches!(err, JudoError::Argument(_)));
    }

    #[test]
    fn is_invalid_target_rejects_at_sign() {
        assert!(is_invalid_target("user@foo"));
    }

    #[test]
    fn is_invalid_target_rejects_whitespace() {
        assert!(is_invalid_target("foo bar"));
        assert!(is_invalid_target("foo\tbar"));
    }

    #[test]
    fn is_invalid_target_accepts_plain_name() {
        assert!(!is_invalid_target("web1"));
    }
}
