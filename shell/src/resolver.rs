use std::path::Path;
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing::debug;

use crate::kind::ShellKind;

/// Overrides the derived git-bash location on Windows.
pub const GIT_BASH_PATH_ENV_VAR: &str = "AGENT_GIT_BASH_PATH";

/// The user's configured interactive shell, regardless of whether it is
/// suitable for running agent-issued commands. Resolved once per process.
pub fn preferred() -> &'static Path {
    static PREFERRED: OnceLock<PathBuf> = OnceLock::new();
    PREFERRED
        .get_or_init(|| {
            let shell = preferred_from(shell_env().as_deref());
            debug!(shell = %shell.display(), "resolved preferred shell");
            shell
        })
        .as_path()
}

/// The default execution shell for agent-issued commands: the user's
/// configured shell unless it is blacklisted as a default, otherwise the
/// platform fallback. Resolved once per process; never fails.
pub fn acceptable() -> &'static Path {
    static ACCEPTABLE: OnceLock<PathBuf> = OnceLock::new();
    ACCEPTABLE
        .get_or_init(|| {
            let shell = acceptable_from(shell_env().as_deref());
            debug!(shell = %shell.display(), "resolved acceptable shell");
            shell
        })
        .as_path()
}

fn shell_env() -> Option<String> {
    std::env::var("SHELL").ok().filter(|s| !s.is_empty())
}

fn preferred_from(shell_env: Option<&str>) -> PathBuf {
    match shell_env {
        Some(shell) => PathBuf::from(shell),
        None => fallback(),
    }
}

fn acceptable_from(shell_env: Option<&str>) -> PathBuf {
    match shell_env {
        Some(shell) if !ShellKind::from_path(Path::new(shell)).unsuitable_as_default() => {
            PathBuf::from(shell)
        }
        _ => fallback(),
    }
}

#[cfg(windows)]
fn fallback() -> PathBuf {
    if let Ok(bash) = std::env::var(GIT_BASH_PATH_ENV_VAR)
        && !bash.is_empty()
    {
        return PathBuf::from(bash);
    }
    if let Ok(git) = which::which("git")
        && let Some(bash) = git_bash_from_git(&git)
    {
        return bash;
    }
    match std::env::var("COMSPEC") {
        Ok(comspec) if !comspec.is_empty() => PathBuf::from(comspec),
        _ => PathBuf::from("cmd.exe"),
    }
}

#[cfg(target_os = "macos")]
fn fallback() -> PathBuf {
    PathBuf::from("/bin/zsh")
}

#[cfg(all(unix, not(target_os = "macos")))]
fn fallback() -> PathBuf {
    which::which("bash").unwrap_or_else(|_| PathBuf::from("/bin/sh"))
}

/// Derive the bash.exe that ships with git for Windows. git.exe typically
/// lives at `<root>/cmd/git.exe` with bash at `<root>/bin/bash.exe`; the
/// derived path only counts if that file exists and is non-empty.
#[cfg_attr(not(windows), allow(dead_code))]
fn git_bash_from_git(git: &Path) -> Option<PathBuf> {
    let root = git.parent()?.parent()?;
    let bash = root.join("bin").join("bash.exe");
    match std::fs::metadata(&bash) {
        Ok(meta) if meta.len() > 0 => Some(bash),
        _ => None,
    }
}
