//! Local process execution with an optional timeout

use crate::command::CommandOutput;
use crate::error::{Error, Result};
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Run `argv` to completion, killing it if it outlives `timeout`.
///
/// Output pipes are drained on helper threads so a chatty child cannot
/// block on a full pipe while we wait for it.
pub fn run(
    argv: &[String],
    cwd: Option<&str>,
    stdin: Option<&[u8]>,
    timeout: Option<Duration>,
) -> Result<CommandOutput> {
    let (program, args) = argv.split_first().ok_or_else(|| Error::Io {
        operation: "spawn".to_string(),
        message: "empty command".to_string(),
    })?;
    let label = argv.join(" ");

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let mut child = command
        .spawn()
        .map_err(|e| Error::io(format!("spawn `{program}`"), &e))?;

    let writer = match (stdin, child.stdin.take()) {
        (Some(input), Some(mut pipe)) => {
            let input = input.to_vec();
            Some(thread::spawn(move || pipe.write_all(&input)))
        }
        _ => None,
    };
    let stdout_reader = child.stdout.take().map(spawn_reader);
    let stderr_reader = child.stderr.take().map(spawn_reader);

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if let Some(limit) = timeout
                    && started.elapsed() > limit
                {
                    let _ = child.kill();
                    let _ = child.wait();
                    log::debug!("Killed `{label}` after {}s", limit.as_secs());
                    return Err(Error::Timeout {
                        operation: label,
                        timeout: limit,
                    });
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => return Err(Error::io(format!("wait for `{program}`"), &e)),
        }
    };

    if let Some(handle) = writer {
        // A child that exits without reading stdin closes the pipe early
        let _ = handle.join();
    }
    let stdout = stdout_reader
        .and_then(|h| h.join().ok())
        .unwrap_or_default();
    let stderr = stderr_reader
        .and_then(|h| h.join().ok())
        .unwrap_or_default();

    Ok(CommandOutput {
        status: status.code(),
        stdout,
        stderr,
    })
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}
