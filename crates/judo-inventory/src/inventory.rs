use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use judo_core::JudoError;
use judo_process::Proc;
use regex::Regex;
use tracing::warn;

use crate::{Host, SeenSet};

/// A group-line token extractor: the leading run of non-whitespace,
/// non-`#` characters. Matches `host1  # comment` -> `host1` and
/// `# full comment` -> no match.
fn line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^#\s]+").expect("static regex is valid"))
}

/// Extract group-file tokens from `text`, skipping comments and blanks.
pub fn read_groups(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| line_regex().find(line).map(|m| m.as_str().to_string()))
        .collect()
}

#[cfg(unix)]
fn is_executable(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &std::fs::Metadata) -> bool {
    false
}

/// A self-referential generator chain deeper than this is treated as a
/// fatal error rather than left to run until the idle timeout notices
/// it. `SeenSet` already breaks true cycles; this guards against a
/// generator that keeps inventing fresh names instead of repeating one.
const MAX_RESOLUTION_DEPTH: usize = 64;

type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Resolves user-supplied host/group names into a flat, deduplicated,
/// ordered list of [`Host`]s by consulting a group directory.
pub struct Inventory {
    hosts: Vec<Arc<Host>>,
    seen: SeenSet,
    timeout: Duration,
    groups_dir: PathBuf,
}

impl Default for Inventory {
    fn default() -> Self {
        Self::new()
    }
}

impl Inventory {
    pub fn new() -> Self {
        Inventory {
            hosts: Vec::new(),
            seen: SeenSet::new(),
            timeout: Duration::from_secs(30),
            groups_dir: PathBuf::from("groups"),
        }
    }

    /// Override the group directory; used by tests so fixtures don't
    /// depend on the process's current working directory.
    pub fn with_groups_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.groups_dir = dir.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn get_hosts(&self) -> &[Arc<Host>] {
        &self.hosts
    }

    /// Resolve each of `names` in order, appending every newly
    /// discovered host to the inventory. A host already present under
    /// the same or a different name is never emitted twice.
    pub async fn populate(&mut self, names: &[String]) -> Result<(), JudoError> {
        for name in names {
            let resolved = self.resolve_names(name, 0, &[]).await?;
            self.hosts.extend(resolved);
        }
        Ok(())
    }

    /// `groups` is the chain of group names already descended through to
    /// reach `name`; it becomes the resulting `Host::groups` for any leaf
    /// host found under it.
    fn resolve_names<'a>(
        &'a self,
        name: &'a str,
        depth: usize,
        groups: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<Arc<Host>>, JudoError>> {
        Box::pin(async move {
            if depth > MAX_RESOLUTION_DEPTH {
                return Err(JudoError::FatalInternal(format!(
                    "group resolution exceeded max depth ({MAX_RESOLUTION_DEPTH}) at {name}"
                )));
            }

            let path = self.groups_dir.join(name);
            let meta = match tokio::fs::metadata(&path).await {
                Ok(meta) => meta,
                Err(_) => {
                    return if self.seen.add(name) {
                        Ok(vec![Arc::new(Host::with_groups(name, groups.to_vec())?)])
                    } else {
                        Ok(Vec::new())
                    };
                }
            };

            if !meta.is_file() {
                return Err(JudoError::FatalInternal(format!(
                    "{}: not a regular file",
                    path.display()
                )));
            }

            let mut nested_groups = groups.to_vec();
            nested_groups.push(name.to_string());

            if is_executable(&meta) {
                self.resolve_from_generator(&path, depth, &nested_groups).await
            } else {
                self.resolve_from_file(&path, depth, &nested_groups).await
            }
        })
    }

    async fn resolve_from_file(
        &self,
        path: &Path,
        depth: usize,
        groups: &[String],
    ) -> Result<Vec<Arc<Host>>, JudoError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| JudoError::FatalInternal(format!("{}: {e}", path.display())))?;

        let mut out = Vec::new();
        for token in read_groups(&text) {
            out.extend(self.resolve_names(&token, depth + 1, groups).await?);
        }
        Ok(out)
    }

    async fn resolve_from_generator(
        &self,
        path: &Path,
        depth: usize,
        groups: &[String],
    ) -> Result<Vec<Arc<Host>>, JudoError> {
        let program = path
            .to_str()
            .ok_or_else(|| JudoError::FatalInternal("group path is not valid UTF-8".to_string()))?;
        let mut proc = Proc::spawn(program, std::iter::empty::<&str>())?;
        proc.close_stdin();

        let mut out = Vec::new();
        let mut stdout_open = true;
        let mut stderr_open = true;
        loop {
            tokio::select! {
                line = proc.stdout.recv(), if stdout_open => {
                    match line {
                        Some(line) => {
                            if let Some(token) = line_regex().find(&line) {
                                out.extend(self.resolve_names(token.as_str(), depth + 1, groups).await?);
                            }
                        }
                        None => stdout_open = false,
                    }
                }
                line = proc.stderr.recv(), if stderr_open => {
                    match line {
                        Some(line) => warn!(generator = %path.display(), "{line}"),
                        None => stderr_open = false,
                    }
                }
                result = &mut proc.done => {
                    result.map_err(|_| JudoError::FatalInternal("generator task dropped its result".to_string()))??;
                    return Ok(out);
                }
                _ = tokio::time::sleep(self.timeout) => {
                    return Err(JudoError::Timeout);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn read_groups_skips_comments_and_blanks_and_trims_trailers() {
        let text = "# a comment\ntest1 # another comment\ntest2 garbage\n# test3\n\n";
        assert_eq!(read_groups(text), vec!["test1", "test2"]);
    }

    #[tokio::test]
    async fn populate_dedupes_literal_repeats_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut inv = Inventory::new().with_groups_dir(dir.path());
        inv.populate(&["test1".into(), "test2".into(), "test1".into()])
            .await
            .unwrap();
        let names: Vec<_> = inv.get_hosts().iter().map(|h| h.name.clone()).collect();
        assert_eq!(names, vec!["test1", "test2"]);
    }

    #[tokio::test]
    async fn populate_expands_a_plain_group_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("web"), "host1\nhost2\n# comment\n").unwrap();

        let mut inv = Inventory::new().with_groups_dir(dir.path());
        inv.populate(&["web".into()]).await.unwrap();
        let names: Vec<_> = inv.get_hosts().iter().map(|h| h.name.clone()).collect();
        assert_eq!(names, vec!["host1", "host2"]);
    }

    #[tokio::test]
    async fn populate_never_duplicates_across_overlapping_groups() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), "host1\nhost2\n").unwrap();
        std::fs::write(dir.path().join("b"), "host2\nhost3\n").unwrap();

        let mut inv = Inventory::new().with_groups_dir(dir.path());
        inv.populate(&["a".into(), "b".into()]).await.unwrap();
        let names: Vec<_> = inv.get_hosts().iter().map(|h| h.name.clone()).collect();
        assert_eq!(names, vec!["host1", "host2", "host3"]);
    }

    #[tokio::test]
    async fn populate_expands_an_executable_generator() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("gen");
        std::fs::write(&script, "#!/bin/sh\necho host1\necho host2\n").unwrap();
        let mut perms = std::fs::metadata(&script).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&script, perms).unwrap();

        let mut inv = Inventory::new().with_groups_dir(dir.path());
        inv.populate(&["gen".into()]).await.unwrap();
        let names: Vec<_> = inv.get_hosts().iter().map(|h| h.name.clone()).collect();
        assert_eq!(names, vec!["host1", "host2"]);
    }

    #[tokio::test]
    async fn populate_records_the_group_chain_a_host_was_found_through() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("web"), "prod\n").unwrap();
        std::fs::write(dir.path().join("prod"), "host1\n").unwrap();

        let mut inv = Inventory::new().with_groups_dir(dir.path());
        inv.populate(&["web".into()]).await.unwrap();
        let host = &inv.get_hosts()[0];
        assert_eq!(host.name, "host1");
        assert_eq!(host.groups, vec!["web".to_string(), "prod".to_string()]);
    }

    #[tokio::test]
    async fn non_regular_file_under_groups_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("notaplainfile")).unwrap();

        let mut inv = Inventory::new().with_groups_dir(dir.path());
        let err = inv.populate(&["notaplainfile".into()]).await.unwrap_err();
        assert!(matches!(err, JudoError::FatalInternal(_)));
    }
}
