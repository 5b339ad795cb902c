//! Platform-specific termination of a spawned command and its descendants.
//!
//! POSIX children are detached into their own process group at spawn time,
//! so termination signals the negative process-group id and reaches the
//! whole tree. Windows has no graceful equivalent in this context, so a
//! single forceful `taskkill /t` pass is used instead.
//!
//! Every failure here is logged and swallowed: the spawn still resolves
//! from whatever exit state is eventually observed.

use std::time::Duration;

use tokio::process::Child;
use tracing::debug;
use tracing::warn;

/// Delay between the graceful termination request and SIGKILL escalation.
pub(crate) const KILL_GRACE_WINDOW: Duration = Duration::from_millis(200);

/// Ask the child's process tree to terminate. Returns true when the caller
/// should arm the forced-kill escalation timer (POSIX only; the Windows
/// path is already forceful).
pub(crate) fn request_terminate(child: &Child) -> bool {
    let Some(pid) = child.id() else {
        return false;
    };

    #[cfg(unix)]
    {
        signal_tree(pid, libc::SIGTERM);
        true
    }

    #[cfg(windows)]
    {
        spawn_taskkill(pid);
        false
    }
}

/// Escalate after the grace window: the tree ignored SIGTERM.
#[cfg_attr(windows, allow(dead_code))]
pub(crate) fn force_kill(child: &Child) {
    let Some(pid) = child.id() else {
        return;
    };

    #[cfg(unix)]
    signal_tree(pid, libc::SIGKILL);

    #[cfg(windows)]
    let _ = pid;
}

/// Signal the child's whole process group, falling back to the immediate
/// child if the group can no longer be addressed. ESRCH is success: the
/// tree already exited. The fallback path cannot reach grandchildren that
/// re-parented out of the group; that is a known best-effort limitation.
#[cfg(unix)]
fn signal_tree(pid: u32, signal: libc::c_int) {
    let pid = pid as libc::pid_t;

    let mut result = {
        let pgid = unsafe { libc::getpgid(pid) };
        if pgid == -1 {
            -1
        } else {
            unsafe { libc::killpg(pgid, signal) }
        }
    };
    if result == -1 {
        result = unsafe { libc::kill(pid, signal) };
    }

    if result == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            debug!(pid, signal, "process tree already exited");
        } else {
            warn!(pid, signal, error = %err, "failed to signal process tree");
        }
    } else {
        debug!(pid, signal, "signaled process tree");
    }
}

/// `taskkill /f /t` is the recursive tree-kill facility Windows offers;
/// it has no graceful phase. Runs as a detached task; the engine does not
/// wait on it and learns the outcome through the child's own exit.
#[cfg(windows)]
fn spawn_taskkill(pid: u32) {
    tokio::spawn(async move {
        let status = tokio::process::Command::new("taskkill")
            .args(["/pid", &pid.to_string(), "/f", "/t"])
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await;
        match status {
            Ok(status) => debug!(pid, %status, "taskkill completed"),
            Err(error) => warn!(pid, %error, "failed to run taskkill"),
        }
    });
}
