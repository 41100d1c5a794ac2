use std::path::PathBuf;

use judo_core::JudoError;

/// Mirrors judo-inventory's executable-bit check: a group generator and
/// a dirmode script entry point both use "any execute bit set" as the
/// test for "this is meant to be run, not read".
#[cfg(unix)]
fn is_executable(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &std::fs::Metadata) -> bool {
    false
}

/// A file or directory shipped to every host and executed there.
///
/// A directory payload (`dirmode`) must contain an executable file
/// named `script` at its root; that file is the remote entry point. A
/// plain file payload is executed directly.
#[derive(Debug, Clone)]
pub struct Script {
    pub path: PathBuf,
    pub dirmode: bool,
}

impl Script {
    /// Validate `path` and determine dirmode at construction time
    /// rather than at upload time, so a bad script path is reported as
    /// an early configuration error.
    pub fn new(path: impl Into<PathBuf>) -> Result<Script, JudoError> {
        let path = path.into();
        let meta = std::fs::metadata(&path)
            .map_err(|e| JudoError::ScriptValidation(format!("{}: {e}", path.display())))?;

        let dirmode = if meta.is_dir() {
            let entry = path.join("script");
            let entry_meta = std::fs::metadata(&entry).map_err(|e| {
                JudoError::ScriptValidation(format!(
                    "{}: dirmode script missing entry point: {e}",
                    path.display()
                ))
            })?;
            if !is_executable(&entry_meta) {
                return Err(JudoError::ScriptValidation(format!(
                    "{}: dirmode script entry point is not executable",
                    entry.display()
                )));
            }
            true
        } else {
            false
        };

        Ok(Script { path, dirmode })
    }

    pub fn is_dir_mode(&self) -> bool {
        self.dirmode
    }

    pub fn basename(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("payload")
    }
}

/// An ad-hoc shell command string, transmitted verbatim to the remote
/// shell with no local parsing.
#[derive(Debug, Clone)]
pub struct Command {
    pub cmd: String,
}

impl Command {
    pub fn new(cmd: impl Into<String>) -> Command {
        Command { cmd: cmd.into() }
    }
}

/// Exactly one kind of work a [`crate::Job`] can send to every host,
/// enforced at the type level instead of the "both, neither, or either
/// pointer may be set" shape a nullable-pair encoding allows.
#[derive(Debug, Clone)]
pub enum Payload {
    Script(Script),
    Command(Command),
}
