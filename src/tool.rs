//! Blocking runner for external tools with an optional wall-clock limit.

use std::ffi::OsString;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::error::ToolError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs `program` with `args`, capturing stdout and stderr.
///
/// With a `timeout`, the child is killed and reaped once the limit passes
/// and `ToolError::Timeout` is returned. A non-zero exit is not an error
/// here; callers inspect `Output::status`.
pub fn run_tool(
    program: &Path,
    args: &[OsString],
    timeout: Option<Duration>,
) -> Result<Output, ToolError> {
    debug!("Running {:?} with {} args", program, args.len());
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ToolError::Spawn {
            program: program.to_path_buf(),
            source,
        })?;

    let Some(limit) = timeout else {
        return Ok(child.wait_with_output()?);
    };

    // Pipes are drained on their own threads so a chatty child cannot block
    // on a full pipe while we poll for its exit.
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    let deadline = Instant::now() + limit;

    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            warn!("{:?} exceeded {:?}, killing it", program, limit);
            if let Err(e) = child.kill() {
                warn!("Failed to kill {:?}: {}", program, e);
            }
            let _ = child.wait();
            return Err(ToolError::Timeout {
                program: program.to_path_buf(),
                secs: limit.as_secs(),
            });
        }
        thread::sleep(POLL_INTERVAL);
    };

    Ok(Output {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
    })
}

/// Diagnostic text of a finished tool, trimmed for inclusion in messages
pub fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}
