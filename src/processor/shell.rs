// src/processor/shell.rs
//
// Shared subprocess plumbing for the gm and OpenJPEG backends: stdin
// feeding, stderr draining on a separate thread, and uniform exit handling.

use crate::error::{CasabaError, Result};
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use tracing::{debug, warn};

/// Captured result of a finished child process.
#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: String,
}

/// Run `cmd`, optionally feeding `stdin`, and capture stdout.
///
/// stderr is drained on its own thread for the whole lifetime of the child.
/// Without that, a child emitting more diagnostics than the pipe buffer
/// holds blocks on write while we block on reading stdout, and both sides
/// deadlock. The child is always reaped, on success and on every error path.
pub fn run(mut cmd: Command, stdin: Option<&[u8]>, backend: &'static str) -> Result<CommandOutput> {
    debug!(backend, command = ?cmd, "invoking");

    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .map_err(|e| CasabaError::backend_invocation_failure(backend, format!("spawn: {e}")))?;

    let stderr_pipe = child.stderr.take();
    let stderr_thread = std::thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut pipe) = stderr_pipe {
            let _ = pipe.read_to_string(&mut buf);
        }
        buf
    });

    // Feed stdin on another thread so a child that fills its stdout pipe
    // before consuming all input cannot wedge us either. A broken pipe here
    // is benign: the child may legitimately exit without reading everything.
    let stdin_thread = stdin.map(|bytes| {
        let mut pipe = child.stdin.take();
        let bytes = bytes.to_vec();
        std::thread::spawn(move || {
            if let Some(ref mut pipe) = pipe {
                if let Err(e) = pipe.write_all(&bytes) {
                    if e.kind() != std::io::ErrorKind::BrokenPipe {
                        warn!(error = %e, "stdin write failed");
                    }
                }
            }
        })
    });

    let mut stdout = Vec::new();
    let read_result = match child.stdout.take() {
        Some(mut pipe) => pipe.read_to_end(&mut stdout).map(|_| ()),
        None => Ok(()),
    };

    if let Some(handle) = stdin_thread {
        let _ = handle.join();
    }
    let stderr = stderr_thread.join().unwrap_or_default();

    let status = child
        .wait()
        .map_err(|e| CasabaError::backend_invocation_failure(backend, format!("wait: {e}")))?;

    if let Err(e) = read_result {
        // A read error after the child completed plausibly (exit 0, output
        // produced) is a truncated trailing read, not a failed render.
        if status.success() && !stdout.is_empty() {
            warn!(backend, error = %e, "truncated read at EOF after successful exit");
        } else {
            return Err(CasabaError::backend_invocation_failure(
                backend,
                format!("reading output: {e}"),
            ));
        }
    }

    if !status.success() {
        let detail = if stderr.trim().is_empty() {
            format!("exited with {status}")
        } else {
            stderr.trim().to_string()
        };
        return Err(CasabaError::backend_invocation_failure(backend, detail));
    }
    if !stderr.trim().is_empty() {
        warn!(backend, stderr = %stderr.trim(), "diagnostics on successful exit");
    }

    Ok(CommandOutput { stdout, stderr })
}
