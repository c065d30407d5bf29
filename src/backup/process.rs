//! Running external programs (`ssh`, `rsync`, `sh`).
//!
//! Both output streams are drained on their own threads while the caller waits
//! for the child, so a chatty child cannot block on a full pipe.

use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use itertools::Itertools;
use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::thread::JoinHandle;
use tracing::Dispatch;

/// Captured result of a finished child process.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallOutput {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    /// `None` when the child was killed by a signal.
    pub exit_code: Option<i32>,
}

impl CallOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Turns a non-zero exit into [`Error::CommandFailed`].
    pub fn check<S: Into<String>>(self, command: S) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(Error::command_failed(
                command,
                self.exit_code,
                self.stderr.join("\n"),
            ))
        }
    }
}

/// Runs `program` with `args` to completion. A non-zero exit is not an error
/// here; use [`CallOutput::check`] where it should be.
pub fn call(program: &str, args: &[String], label: &str) -> Result<CallOutput> {
    tracing::debug!("Full command line: {} {}", program, args.iter().join(" "));

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let dispatch = tracing::dispatcher::get_default(Dispatch::clone);
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("child stdout was not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| std::io::Error::other("child stderr was not captured"))?;
    let stdout_handle = spawn_reader(stdout, "stdout", label, dispatch.clone());
    let stderr_handle = spawn_reader(stderr, "stderr", label, dispatch);

    let status = child.wait()?;
    tracing::debug!("{} finished with {}", label, status);

    Ok(CallOutput {
        stdout: join_reader(stdout_handle, label)?,
        stderr: join_reader(stderr_handle, label)?,
        exit_code: status.code(),
    })
}

fn spawn_reader<R: Read + Send + 'static>(
    reader: R,
    stream: &'static str,
    label: &str,
    dispatch: Dispatch,
) -> JoinHandle<std::io::Result<Vec<String>>> {
    let label = label.to_owned();
    std::thread::spawn(move || {
        tracing::dispatcher::with_default(&dispatch, || {
            let mut reader = BufReader::new(reader);
            let mut lines = Vec::new();
            let mut buf = Vec::new();
            while reader.read_until(b'\n', &mut buf)? > 0 {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\n', '\r'])
                    .to_owned();
                tracing::debug!("[ {} {} ] {}", label, stream, line);
                lines.push(line);
                buf.clear();
            }
            Ok(lines)
        })
    })
}

fn join_reader(handle: JoinHandle<std::io::Result<Vec<String>>>, label: &str) -> Result<Vec<String>> {
    handle
        .join()
        .map_err(|_| Error::thread_panic(format!("{label} output reader panicked")))?
        .map_err(Error::from)
}
