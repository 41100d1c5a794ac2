//! Control-connection option builder shared by every `ssh`/`scp` invocation.

const DEFAULT_CONTROL_PATH: &str = "~/.ssh/judo-cm-%r@%h:%p";

/// Options applied to every `ssh`/`scp` child process, plus whatever
/// passthrough flags (`-F file`, etc.) the caller collected on the command
/// line.
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Extra argv elements forwarded verbatim to every `ssh`/`scp` call
    /// (e.g. `-F ./ssh_config`).
    pub extra_args: Vec<String>,
    /// `ControlPath` template; `%h`/`%p`/`%r` are left for `ssh` to expand.
    pub control_path_template: String,
    /// Whether to pass `BatchMode=yes` (disables interactive prompts;
    /// a parallel run on many hosts has no terminal to prompt against).
    pub batch_mode: bool,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            extra_args: Vec::new(),
            control_path_template: DEFAULT_CONTROL_PATH.to_string(),
            batch_mode: true,
        }
    }
}

impl SshConfig {
    pub fn new(extra_args: Vec<String>) -> Self {
        Self {
            extra_args,
            ..Default::default()
        }
    }

    /// Options for a follow-up connection that rides the control master:
    /// `ControlMaster=no` so `ssh` refuses to start a second master if the
    /// expected one isn't there, failing loudly instead of silently
    /// opening a fresh connection.
    pub fn follower_options(&self) -> Vec<String> {
        let mut opts = self.common_options();
        opts.push("-o".to_string());
        opts.push("ControlMaster=no".to_string());
        opts
    }

    /// Options for the `ssh -MN` master invocation itself.
    pub fn master_options(&self) -> Vec<String> {
        self.common_options()
    }

    fn common_options(&self) -> Vec<String> {
        let mut opts = Vec::new();
        if self.batch_mode {
            opts.push("-o".to_string());
            opts.push("BatchMode=yes".to_string());
        }
        opts.push("-o".to_string());
        opts.push(format!("ControlPath={}", self.control_path_template));
        opts.extend(self.extra_args.iter().cloned());
        opts
    }
}
