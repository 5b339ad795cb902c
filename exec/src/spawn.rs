use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::io::BufReader;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::error::Result;
use crate::kill;

// I/O buffer sizing
const READ_CHUNK_SIZE: usize = 8192; // bytes per read
const AGGREGATE_BUFFER_INITIAL_CAPACITY: usize = 8 * 1024; // 8 KiB

/// How long to keep draining the pipes after the shell has exited. A
/// backgrounded descendant inherits the pipe write ends and can hold them
/// open indefinitely, so EOF must not gate result delivery.
const PIPE_DRAIN_WINDOW: Duration = Duration::from_millis(50);

/// Observer for raw combined-output chunks as they arrive. Purely
/// best-effort: a panicking observer is logged and ignored, and a slow one
/// only delays further chunk processing for its own spawn.
pub type OnOutput = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// One command execution request. Immutable once passed to [`spawn`].
#[derive(Clone)]
pub struct SpawnOptions {
    /// Shell syntax, opaque to this layer.
    pub command: String,
    /// Absolute path the child process starts in.
    pub cwd: PathBuf,
    /// Explicit shell executable; defaults to [`agent_shell::acceptable`].
    pub shell: Option<PathBuf>,
    /// Run the command after best-effort sourcing of the user's
    /// login/profile files, for shells that support it.
    pub source_profile: bool,
    /// Merged over the inherited process environment; overrides win.
    pub env: HashMap<String, String>,
    /// Wall-clock budget; elapsing triggers forced termination.
    pub timeout: Option<Duration>,
    /// May be triggered at any point, including before the spawn begins.
    pub cancel: Option<CancellationToken>,
    /// Live streaming observer for combined stdout/stderr chunks.
    pub on_output: Option<OnOutput>,
}

impl SpawnOptions {
    pub fn new(command: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            cwd: cwd.into(),
            shell: None,
            source_profile: false,
            env: HashMap::new(),
            timeout: None,
            cancel: None,
            on_output: None,
        }
    }
}

/// Outcome of one command execution.
///
/// `timed_out` and `aborted` record why termination was *requested*; both
/// can be true if timeout and cancellation fired before the process died.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnResult {
    /// Combined stdout/stderr text in arrival order. Per-stream order is
    /// preserved; interleaving across the two streams is not deterministic.
    pub output: String,
    /// Absent when the process was killed by a signal (or the platform
    /// reported no code) before a normal exit could be observed.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub aborted: bool,
}

/// Run a shell command to completion, streaming output as it arrives and
/// racing natural exit against cancellation and the timeout.
///
/// Resolves the shell (explicit override or [`agent_shell::acceptable`]),
/// builds the non-interactive argv, launches the child detached into its
/// own process group (POSIX), and suspends until the process is known to
/// have exited — whether naturally or by forced termination. Only a launch
/// failure is surfaced as an error; timeout and cancellation are normal
/// outcomes encoded in the result flags.
pub async fn spawn(options: SpawnOptions) -> Result<SpawnResult> {
    let SpawnOptions {
        command,
        cwd,
        shell,
        source_profile,
        env,
        timeout,
        cancel,
        on_output,
    } = options;

    let shell = shell.unwrap_or_else(|| agent_shell::acceptable().to_path_buf());
    let args = agent_shell::shell_args(&shell, &command, source_profile);
    let cancel = cancel.unwrap_or_default();

    debug!(shell = %shell.display(), %command, "spawning shell command");

    let mut cmd = Command::new(&shell);
    cmd.args(&args)
        .current_dir(&cwd)
        .envs(&env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // Backstop for a caller that drops the spawn future mid-flight:
        // the immediate child is still reaped.
        .kill_on_drop(true);

    #[cfg(unix)]
    unsafe {
        // Detach into a new process group so termination can signal the
        // whole tree without touching our own group. setpgid is
        // async-signal-safe, as required between fork and exec.
        cmd.pre_exec(|| {
            if libc::setpgid(0, 0) == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let mut child = cmd.spawn()?;

    let stdout_reader = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("stdout pipe was unexpectedly not available"))?;
    let stderr_reader = child
        .stderr
        .take()
        .ok_or_else(|| std::io::Error::other("stderr pipe was unexpectedly not available"))?;
    let mut stdout_reader = BufReader::new(stdout_reader);
    let mut stderr_reader = BufReader::new(stderr_reader);

    let mut output: Vec<u8> = Vec::with_capacity(AGGREGATE_BUFFER_INITIAL_CAPACITY);
    let mut tmp_stdout = [0u8; READ_CHUNK_SIZE];
    let mut tmp_stderr = [0u8; READ_CHUNK_SIZE];
    let mut stdout_open = true;
    let mut stderr_open = true;

    let mut timed_out = false;
    let mut aborted = false;
    let mut terminate_requested = false;
    let mut child_finished = false;
    let mut exit_status: Option<ExitStatus> = None;

    let deliver = |chunk: &[u8]| {
        if let Some(on_output) = &on_output
            && std::panic::catch_unwind(AssertUnwindSafe(|| on_output.as_ref()(chunk))).is_err()
        {
            warn!("output observer panicked; chunk dropped from stream");
        }
    };

    let timeout_fut = tokio::time::sleep(timeout.unwrap_or(Duration::MAX));
    tokio::pin!(timeout_fut);

    // Re-armed with the grace window whenever graceful termination has
    // been requested; fires the SIGKILL escalation.
    let mut escalation_armed = false;
    let escalate_fut = tokio::time::sleep(Duration::MAX);
    tokio::pin!(escalate_fut);

    // The caller may have cancelled before the process even launched; the
    // handle exists now, so request termination right away.
    if cancel.is_cancelled() {
        aborted = true;
        terminate_requested = true;
        if kill::request_terminate(&child) {
            escalate_fut
                .as_mut()
                .reset(tokio::time::Instant::now() + kill::KILL_GRACE_WINDOW);
            escalation_armed = true;
        }
    }

    // Drive both pipes, process exit, timeout, cancellation, and the kill
    // escalation concurrently. Output streaming stays live throughout. The
    // loop resolves on the child's exit, not on pipe EOF: a descendant the
    // shell left behind may never close its inherited pipe ends.
    while !child_finished {
        tokio::select! {
            // Caller cancellation; becomes a no-op once the process exited.
            _ = cancel.cancelled(), if !aborted => {
                aborted = true;
                if !terminate_requested {
                    terminate_requested = true;
                    debug!("cancellation requested; terminating process tree");
                    if kill::request_terminate(&child) {
                        escalate_fut
                            .as_mut()
                            .reset(tokio::time::Instant::now() + kill::KILL_GRACE_WINDOW);
                        escalation_armed = true;
                    }
                }
            }

            // Wall-clock budget elapsed.
            _ = &mut timeout_fut, if timeout.is_some() && !timed_out => {
                timed_out = true;
                if !terminate_requested {
                    terminate_requested = true;
                    debug!("timeout elapsed; terminating process tree");
                    if kill::request_terminate(&child) {
                        escalate_fut
                            .as_mut()
                            .reset(tokio::time::Instant::now() + kill::KILL_GRACE_WINDOW);
                        escalation_armed = true;
                    }
                }
            }

            // Grace window expired without an exit.
            _ = &mut escalate_fut, if escalation_armed => {
                escalation_armed = false;
                kill::force_kill(&child);
            }

            // Process exit. Terminal: ends the loop.
            res = child.wait() => {
                match res {
                    Ok(status) => exit_status = Some(status),
                    // Exit state is unknowable; resolve with what we have
                    // rather than fail a process that did launch.
                    Err(error) => warn!(%error, "failed to wait on child process"),
                }
                child_finished = true;
            }

            // Stdout chunk.
            read = stdout_reader.read(&mut tmp_stdout), if stdout_open => {
                match read {
                    Ok(0) => stdout_open = false,
                    Ok(n) => {
                        output.extend_from_slice(&tmp_stdout[..n]);
                        deliver(&tmp_stdout[..n]);
                    }
                    Err(error) => {
                        warn!(%error, "stdout read failed");
                        stdout_open = false;
                    }
                }
            }

            // Stderr chunk.
            read = stderr_reader.read(&mut tmp_stderr), if stderr_open => {
                match read {
                    Ok(0) => stderr_open = false,
                    Ok(n) => {
                        output.extend_from_slice(&tmp_stderr[..n]);
                        deliver(&tmp_stderr[..n]);
                    }
                    Err(error) => {
                        warn!(%error, "stderr read failed");
                        stderr_open = false;
                    }
                }
            }
        }
    }

    // Collect whatever output is already buffered in the pipes. Bounded:
    // the write ends may still be held open by an orphaned descendant.
    let drain_deadline = tokio::time::Instant::now() + PIPE_DRAIN_WINDOW;
    while stdout_open || stderr_open {
        tokio::select! {
            _ = tokio::time::sleep_until(drain_deadline) => break,

            read = stdout_reader.read(&mut tmp_stdout), if stdout_open => {
                match read {
                    Ok(0) | Err(_) => stdout_open = false,
                    Ok(n) => {
                        output.extend_from_slice(&tmp_stdout[..n]);
                        deliver(&tmp_stdout[..n]);
                    }
                }
            }

            read = stderr_reader.read(&mut tmp_stderr), if stderr_open => {
                match read {
                    Ok(0) | Err(_) => stderr_open = false,
                    Ok(n) => {
                        output.extend_from_slice(&tmp_stderr[..n]);
                        deliver(&tmp_stderr[..n]);
                    }
                }
            }
        }
    }

    let exit_code = exit_status.and_then(|status| status.code());
    debug!(
        ?exit_code,
        timed_out,
        aborted,
        output_len = output.len(),
        "shell command finished"
    );

    Ok(SpawnResult {
        output: String::from_utf8_lossy(&output).to_string(),
        exit_code,
        timed_out,
        aborted,
    })
}
