use devserve_core::{
    CompletionSignal, OutputSink, ProcessId, ServerOptions, SupervisorError, TaskOutcome,
};
use std::collections::HashMap;
use std::process::Stdio;
use tokio::process::Command;
use tokio_stream::StreamExt;
use tokio_util::codec::{BytesCodec, FramedRead, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Spawn the configured server process and wire up its watchers.
///
/// Watchers (delay timer, stdout monitor, stderr forwarder, exit waiter)
/// each hold a clone of the completion signal, so whichever observes
/// readiness or exit first wins; the rest become no-ops. All watchers run
/// until the child is done or `cancel` fires.
///
/// A spawn failure is reported through the completion signal - as the
/// configured fallback result when one is set, as a failure otherwise -
/// and returned for logging.
pub(crate) fn launch(
    options: &ServerOptions,
    args: &[String],
    env: HashMap<String, String>,
    completion: &CompletionSignal,
    cancel: &CancellationToken,
    stdout_sink: OutputSink,
    stderr_sink: OutputSink,
) -> Result<ProcessId, SupervisorError> {
    let matcher = options
        .output_matcher()
        .map_err(|e| SupervisorError::configuration(format!("invalid output pattern: {e}")))?;

    let mut command = Command::new(&options.cmd);
    command
        .args(args)
        .env_clear()
        .envs(env)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    // New process group, so descendants stay attributable to this child.
    #[cfg(unix)]
    command.process_group(0);

    #[cfg(windows)]
    command.creation_flags(0x08000000); // CREATE_NO_WINDOW

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            match &options.fallback {
                Some(fallback) => {
                    warn!(
                        command = %options.cmd,
                        error = %e,
                        "Command could not be launched, reporting fallback result"
                    );
                    completion.fire(TaskOutcome::Fallback(fallback.clone()));
                }
                None => {
                    completion.fire(TaskOutcome::SpawnFailed(e.to_string()));
                }
            }
            return Err(SupervisorError::SpawnFailed {
                command: options.cmd.clone(),
                source: e,
            });
        }
    };

    let Some(pid) = child.id() else {
        let e = std::io::Error::other("spawned process exited before a PID was observed");
        completion.fire(TaskOutcome::SpawnFailed(e.to_string()));
        return Err(SupervisorError::SpawnFailed {
            command: options.cmd.clone(),
            source: e,
        });
    };

    info!(pid = %pid, command = %options.cmd, args = ?args, "Spawned server process");

    // Delay-based readiness fires after the configured time, regardless of
    // other signals; the one-shot makes late triggers harmless.
    if let Some(delay) = options.delay_duration() {
        let completion = completion.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    debug!("Readiness delay elapsed");
                    completion.fire(TaskOutcome::Ready);
                }
            }
        });
    }

    // Stdout is teed line-by-line for the child's whole lifetime; the
    // readiness pattern, when set, is matched on each forwarded line.
    if let Some(stdout) = child.stdout.take() {
        let completion = completion.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut lines = FramedRead::new(stdout, LinesCodec::new());
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    frame = lines.next() => match frame {
                        Some(Ok(line)) => {
                            stdout_sink.write_line(&line).await;
                            if let Some(matcher) = &matcher {
                                if matcher.is_match(&line)
                                    && completion.fire(TaskOutcome::Ready)
                                {
                                    debug!(line = %line, "Readiness pattern matched in server output");
                                }
                            }
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "Error reading server stdout");
                            break;
                        }
                        None => break,
                    }
                }
            }
        });
    }

    // Stderr is forwarded byte-for-byte.
    if let Some(stderr) = child.stderr.take() {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut chunks = FramedRead::new(stderr, BytesCodec::new());
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    frame = chunks.next() => match frame {
                        Some(Ok(bytes)) => stderr_sink.write_bytes(&bytes).await,
                        Some(Err(e)) => {
                            warn!(error = %e, "Error reading server stderr");
                            break;
                        }
                        None => break,
                    }
                }
            }
        });
    }

    // Exit waiter: the child's status is passed through, success or not.
    let completion = completion.clone();
    let cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            status = child.wait() => match status {
                Ok(status) => {
                    debug!(status = %status, "Server process exited");
                    completion.fire(TaskOutcome::Exited(status));
                }
                Err(e) => {
                    warn!(error = %e, "Failed waiting on server process");
                    completion.fire(TaskOutcome::SpawnFailed(e.to_string()));
                }
            }
        }
    });

    Ok(pid)
}
