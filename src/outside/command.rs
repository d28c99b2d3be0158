use std::{
    io::{BufRead, BufReader, Read},
    process::{Command, ExitStatus, Output, Stdio},
    thread,
    time::{Duration, Instant},
};

use bitflags::bitflags;
use crossbeam_channel::RecvTimeoutError;
use miette::Diagnostic;
use thiserror::Error;
use tracing::{debug, trace, warn, Level};
use url::Url;

pub const YT_DL: &str = "youtube-dl";
pub const YT_DLP: &str = "yt-dlp";
pub const FFMPEG: &str = "ffmpeg";
pub const FFPROBE: &str = "ffprobe";
pub const FFXXX_DEFAULT_ARGS: [&str; 3] = ["-hide_banner", "-loglevel", "error"];

/// How often a running child is checked for exit and deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capture: u8 {
        const STDOUT = 0b0000010;
        const STDERR = 0b0000100;
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum CommandError {
    #[error("Could not execute {program}")]
    #[diagnostic(help("Is {program} installed and in the PATH?"))]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} did not finish within {}s and was killed", timeout.as_secs())]
    Timeout { program: String, timeout: Duration },

    #[error("{program} did run but was not successful ({status})")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("Lost track of the {program} process")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Run a command, returning its raw output handle.
///
/// IO handles will be captured only if the caller required it or if the log level is Debug.
/// In that last case, `stdout` and `stderr` will be logged.
///
/// If a timeout is given, the child is killed once it expires.
///
/// The function returns an error only if the command failed to execute or timed out.
/// If the program runs but returns a non-0 status code, it will not trigger an error.
pub fn run_command<F: FnOnce(&mut Command) -> &mut Command>(
    program: &str,
    f: F,
    capture: Capture,
    timeout: Option<Duration>,
) -> Result<Output, CommandError> {
    let mut cmd = Command::new(program);
    f(&mut cmd);
    execute(program, &mut cmd, capture, timeout, None)
}

/// Run the command and verify that it has returned a success status code.
///
/// `stderr` is always captured so a failure can be explained.
pub fn assert_success_command<F: FnOnce(&mut Command) -> &mut Command>(
    program: &str,
    f: F,
    capture: Capture,
    timeout: Option<Duration>,
) -> Result<Output, CommandError> {
    let res = run_command(program, f, capture | Capture::STDERR, timeout)?;
    ensure_success(program, res)
}

/// Run the command, handing every `stdout` line to `on_line` as soon as it is written.
///
/// The lines are not kept in the returned output.
pub fn run_streaming<F, L>(
    program: &str,
    f: F,
    timeout: Option<Duration>,
    mut on_line: L,
) -> Result<Output, CommandError>
where
    F: FnOnce(&mut Command) -> &mut Command,
    L: FnMut(&str),
{
    let mut cmd = Command::new(program);
    f(&mut cmd);
    let res = execute(program, &mut cmd, Capture::STDERR, timeout, Some(&mut on_line))?;
    ensure_success(program, res)
}

fn ensure_success(program: &str, res: Output) -> Result<Output, CommandError> {
    if res.status.success() {
        Ok(res)
    } else {
        Err(CommandError::Failed {
            program: program.to_owned(),
            status: res.status,
            stderr: String::from_utf8_lossy(&res.stderr).into_owned(),
        })
    }
}

/// The command line with the credentials of any URL argument masked.
fn loggable(cmd: &Command) -> String {
    let mut line = cmd.get_program().to_string_lossy().into_owned();
    for arg in cmd.get_args() {
        let arg = arg.to_string_lossy();
        line.push(' ');
        match Url::parse(&arg) {
            Ok(mut url) if !url.username().is_empty() || url.password().is_some() => {
                let _ = url.set_password(None);
                let _ = url.set_username("***");
                line.push_str(url.as_str());
            }
            _ => line.push_str(&arg),
        }
    }
    line
}

fn execute(
    program: &str,
    cmd: &mut Command,
    capture: Capture,
    timeout: Option<Duration>,
    mut on_line: Option<&mut dyn FnMut(&str)>,
) -> Result<Output, CommandError> {
    let is_debug = tracing::enabled!(Level::DEBUG);
    let keep_stdout = is_debug || capture.contains(Capture::STDOUT);
    let keep_stderr = is_debug || capture.contains(Capture::STDERR);
    let get_io = |capture| {
        if capture {
            Stdio::piped()
        } else {
            Stdio::null()
        }
    };

    cmd.stdin(Stdio::null())
        .stdout(get_io(keep_stdout || on_line.is_some()))
        .stderr(get_io(keep_stderr));

    debug!("Executing command: {}", loggable(cmd));
    let mut child = cmd.spawn().map_err(|source| CommandError::Spawn {
        program: program.to_owned(),
        source,
    })?;

    // Both pipes are drained on their own threads so a chatty child can never
    // block on a full pipe while we wait for it
    let stderr_reader = child.stderr.take().map(|mut stderr| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf);
            buf
        })
    });

    let (line_tx, lines) = crossbeam_channel::unbounded::<String>();
    if let Some(stdout) = child.stdout.take() {
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines().map_while(Result::ok) {
                if line_tx.send(line).is_err() {
                    break;
                }
            }
        });
    } else {
        drop(line_tx);
    }

    let mut stdout = Vec::new();
    let mut handle_line = |line: String| {
        if let Some(on_line) = on_line.as_mut() {
            on_line(&line);
        }
        if keep_stdout {
            stdout.extend_from_slice(line.as_bytes());
            stdout.push(b'\n');
        }
    };

    let deadline = timeout.map(|timeout| Instant::now() + timeout);
    let status = loop {
        let wait_err = |source| CommandError::Wait {
            program: program.to_owned(),
            source,
        };

        if let Some(status) = child.try_wait().map_err(wait_err)? {
            break status;
        }

        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            warn!("{program} exceeded its time budget, killing it");
            let _ = child.kill();
            let _ = child.wait();
            return Err(CommandError::Timeout {
                program: program.to_owned(),
                timeout: timeout.unwrap_or_default(),
            });
        }

        match lines.recv_timeout(POLL_INTERVAL) {
            Ok(line) => handle_line(line),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => thread::sleep(POLL_INTERVAL),
        }
    };

    // The reader thread stops at EOF, which closes the channel
    for line in lines.iter() {
        handle_line(line);
    }

    let stderr = stderr_reader
        .and_then(|reader| reader.join().ok())
        .unwrap_or_default();

    if is_debug {
        debug!("status: {status}");
        debug!("stdout: {} bytes long", stdout.len());
        trace!("stdout: {:?}", String::from_utf8_lossy(&stdout));
        debug!("stderr: {} bytes long", stderr.len());
        trace!("stderr: {:?}", String::from_utf8_lossy(&stderr));
    }

    Ok(Output {
        status,
        stdout,
        stderr,
    })
}
