use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use agent_exec::SpawnError;
use agent_exec::SpawnOptions;
use agent_exec::spawn;
use anyhow::Context;
use anyhow::Result;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

fn options_in(dir: &tempfile::TempDir, command: &str) -> SpawnOptions {
    SpawnOptions::new(command, dir.path())
}

#[tokio::test]
async fn echo_round_trip() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let result = spawn(options_in(&dir, "echo hello")).await?;

    assert!(result.output.contains("hello"), "output: {}", result.output);
    assert_eq!(result.exit_code, Some(0));
    assert!(!result.timed_out);
    assert!(!result.aborted);
    Ok(())
}

#[tokio::test]
async fn captures_both_streams_and_declared_exit_code() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let result = spawn(options_in(&dir, "echo to-out; echo to-err 1>&2; exit 3")).await?;

    // Order between the two streams is unconstrained; presence is not.
    assert!(result.output.contains("to-out"), "output: {}", result.output);
    assert!(result.output.contains("to-err"), "output: {}", result.output);
    assert_eq!(result.exit_code, Some(3));
    Ok(())
}

#[tokio::test]
async fn env_overrides_are_visible_to_the_child() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut options = options_in(&dir, "echo value=$SPAWN_TEST_VAR");
    options.env = HashMap::from([("SPAWN_TEST_VAR".to_string(), "from-override".to_string())]);
    let result = spawn(options).await?;

    assert!(
        result.output.contains("value=from-override"),
        "output: {}",
        result.output
    );
    assert_eq!(result.exit_code, Some(0));
    Ok(())
}

#[tokio::test]
async fn explicit_shell_override_is_used() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut options = options_in(&dir, "echo via-sh");
    options.shell = Some(PathBuf::from("/bin/sh"));
    let result = spawn(options).await?;

    assert!(result.output.contains("via-sh"), "output: {}", result.output);
    assert_eq!(result.exit_code, Some(0));
    Ok(())
}

#[tokio::test]
async fn missing_shell_is_a_launch_failure() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut options = options_in(&dir, "echo unreachable");
    options.shell = Some(PathBuf::from("/nonexistent/agent-exec-test-shell"));

    let Err(error) = spawn(options).await else {
        anyhow::bail!("expected launch failure");
    };
    assert!(matches!(error, SpawnError::Launch(_)));
    Ok(())
}

#[tokio::test]
async fn fast_command_does_not_trip_the_timeout() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut options = options_in(&dir, "echo quick");
    options.timeout = Some(Duration::from_secs(5));
    let result = spawn(options).await?;

    assert_eq!(result.exit_code, Some(0));
    assert!(!result.timed_out);
    assert!(!result.aborted);
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn resolves_on_shell_exit_despite_backgrounded_descendant() -> Result<()> {
    let dir = tempfile::tempdir()?;
    // The backgrounded sleep inherits the output pipes and keeps their
    // write ends open long after the shell itself has exited; the call
    // must resolve on the exit, not wait for pipe EOF.
    let mut options = options_in(&dir, "sleep 3 & echo early-done");
    options.timeout = Some(Duration::from_secs(30));

    let start = Instant::now();
    let result = spawn(options).await?;

    assert!(
        start.elapsed() < Duration::from_secs(2),
        "spawn suspended {:?} past the shell's exit",
        start.elapsed()
    );
    assert!(
        result.output.contains("early-done"),
        "output: {}",
        result.output
    );
    assert_eq!(result.exit_code, Some(0));
    assert!(!result.timed_out);
    assert!(!result.aborted);
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn timeout_terminates_the_whole_tree() -> Result<()> {
    let dir = tempfile::tempdir()?;
    // Print the backgrounded descendant's pid so we can verify the group
    // kill reached it, not just the shell.
    let mut options = options_in(&dir, "sleep 30 & echo pid=$!; wait");
    options.timeout = Some(Duration::from_millis(300));

    let start = Instant::now();
    let result = spawn(options).await?;

    assert!(result.timed_out);
    assert!(!result.aborted);
    // Killed by signal, so no exit code was observed.
    assert_eq!(result.exit_code, None);
    assert!(
        start.elapsed() < Duration::from_secs(10),
        "spawn should return well before the sleep's natural runtime"
    );

    let pid: i32 = result
        .output
        .lines()
        .find_map(|line| line.strip_prefix("pid="))
        .context("missing pid line in output")?
        .trim()
        .parse()?;
    assert_process_gone(pid).await;
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn cancellation_mid_flight_aborts() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let cancel = CancellationToken::new();
    let mut options = options_in(&dir, "echo pid=$$; sleep 10");
    options.cancel = Some(cancel.clone());

    let start = Instant::now();
    let handle = tokio::spawn(spawn(options));
    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();
    let result = handle.await??;

    assert!(result.aborted);
    assert!(!result.timed_out);
    assert!(
        start.elapsed() < Duration::from_secs(5),
        "cancellation should end the spawn within the grace window"
    );

    let pid: i32 = result
        .output
        .lines()
        .find_map(|line| line.strip_prefix("pid="))
        .context("missing pid line in output")?
        .trim()
        .parse()?;
    assert_process_gone(pid).await;
    Ok(())
}

#[tokio::test]
async fn cancellation_before_spawn_aborts_immediately() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut options = options_in(&dir, "sleep 10");
    options.cancel = Some(cancel);

    let start = Instant::now();
    let result = spawn(options).await?;

    assert!(result.aborted);
    assert!(!result.timed_out);
    assert!(start.elapsed() < Duration::from_secs(5));
    Ok(())
}

#[tokio::test]
async fn observer_sees_the_same_bytes_as_the_aggregate() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let seen: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let mut options = options_in(&dir, "echo streamed");
    options.on_output = Some(Arc::new(move |chunk: &[u8]| {
        if let Ok(mut seen) = sink.lock() {
            seen.extend_from_slice(chunk);
        }
    }));
    let result = spawn(options).await?;

    let seen = seen
        .lock()
        .map_err(|_| anyhow::anyhow!("observer sink poisoned"))?;
    assert_eq!(String::from_utf8_lossy(&seen), result.output);
    assert!(result.output.contains("streamed"));
    Ok(())
}

#[tokio::test]
async fn panicking_observer_does_not_fail_the_spawn() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut options = options_in(&dir, "echo survived");
    options.on_output = Some(Arc::new(|_chunk: &[u8]| panic!("observer bug")));
    let result = spawn(options).await?;

    assert_eq!(result.exit_code, Some(0));
    assert!(result.output.contains("survived"), "output: {}", result.output);
    Ok(())
}

/// Poll until the pid is gone (ESRCH), tolerating the short window where
/// the process is dead but not yet reaped by init.
#[cfg(unix)]
async fn assert_process_gone(pid: i32) {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        let alive = unsafe { libc::kill(pid, 0) } == 0;
        if !alive {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "process {pid} still running after termination"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
