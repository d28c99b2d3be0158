use std::{
    ffi::OsStr,
    fmt::Debug,
    path::Path,
    process::{Command, Output},
    sync::OnceLock,
    time::Duration,
};

use regex::Regex;
use tracing::debug;

use super::command::{
    assert_success_command, Capture, CommandError, YT_DL, YT_DLP,
};
use crate::{
    proxy::ProxyEndpoint,
    result::{Error, Result},
    types::VideoMetadata,
};

/// Smallest progressive (audio + video) stream, preferring MP4.
const LOWEST_QUALITY_FORMAT: &str =
    "worst[ext=mp4][vcodec!=none][acodec!=none]/worst[vcodec!=none][acodec!=none]/worst";

/// Failure reported by a [`VideoHost`].
///
/// A structured signal is kept whenever the host exposes one,
/// free text is only the fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostFailure {
    /// The host answered with an HTTP error status
    Status { code: u16, message: String },

    /// The host did not answer in time
    TimedOut,

    /// Anything else, described by the error text
    Message(String),
}

/// Interface for fetching videos from the video host
pub trait VideoHost: Sync + Debug {
    /// Get the video metadata without downloading any media.
    fn get_metadata(
        &self,
        url: &str,
        proxy: Option<&ProxyEndpoint>,
    ) -> std::result::Result<VideoMetadata, HostFailure>;

    /// Download the smallest stream carrying both audio and video to `dest`.
    fn download_lowest_quality(
        &self,
        url: &str,
        proxy: Option<&ProxyEndpoint>,
        dest: &Path,
    ) -> std::result::Result<(), HostFailure>;
}

/// Time budgets for the `yt-dlp` invocations
#[derive(Debug, Clone, Copy)]
pub struct YtdlTimeouts {
    pub metadata: Duration,
    pub download: Duration,
    pub socket: Duration,
}

/// Interface for the [yt-dlp](https://github.com/yt-dlp/yt-dlp) program
#[derive(Debug)]
pub struct Ytdl {
    program: &'static str,
    timeouts: YtdlTimeouts,
}

impl Ytdl {
    /// Verify that the `yt-dlp` or `youtube-dl` binaries are reachable
    pub fn new(timeouts: YtdlTimeouts) -> Result<Self> {
        let version_check = |program| {
            assert_success_command(
                program,
                |cmd| cmd.arg("--version"),
                Capture::empty(),
                Some(Duration::from_secs(30)),
            )
        };

        // Check `yt-dlp`
        if version_check(YT_DLP).is_ok() {
            Ok(Self {
                program: YT_DLP,
                timeouts,
            })
        } else if version_check(YT_DL).is_ok() {
            // Check `youtube-dl`
            Ok(Self {
                program: YT_DL,
                timeouts,
            })
        } else {
            Err(Error::Miette(miette::miette!(
                "Neither yt-dlp nor youtube-dl found"
            )))
        }
    }

    /// Run the command and turn any failure into a [`HostFailure`].
    fn run_classified<F>(
        &self,
        f: F,
        capture: Capture,
        timeout: Duration,
        proxy: Option<&ProxyEndpoint>,
    ) -> std::result::Result<Output, HostFailure>
    where
        F: FnOnce(&mut Command) -> &mut Command,
    {
        let socket_timeout = self.timeouts.socket.as_secs().max(1).to_string();
        assert_success_command(
            self.program,
            |cmd| {
                cmd.arg("-q")
                    .arg("--no-warnings")
                    .arg("--no-playlist")
                    .args(["--socket-timeout", &socket_timeout]);
                if let Some(proxy) = proxy {
                    cmd.args(["--proxy", proxy.as_str()]);
                }
                f(cmd)
            },
            capture,
            Some(timeout),
        )
        .map_err(host_failure)
    }
}

impl VideoHost for Ytdl {
    fn get_metadata(
        &self,
        url: &str,
        proxy: Option<&ProxyEndpoint>,
    ) -> std::result::Result<VideoMetadata, HostFailure> {
        let res = self.run_classified(
            |cmd| cmd.arg("--skip-download").arg("-j").arg("--").arg(url),
            Capture::STDOUT,
            self.timeouts.metadata,
            proxy,
        )?;

        let output = String::from_utf8_lossy(&res.stdout);
        serde_json::from_str(&output)
            .map_err(|err| HostFailure::Message(format!("Could not parse metadata JSON: {err}")))
    }

    fn download_lowest_quality(
        &self,
        url: &str,
        proxy: Option<&ProxyEndpoint>,
        dest: &Path,
    ) -> std::result::Result<(), HostFailure> {
        // `-o` takes an output template, a literal '%' must be doubled
        let template = dest.to_string_lossy().replace('%', "%%");
        debug!("Downloading {url} to {}", dest.display());

        self.run_classified(
            |cmd| {
                cmd.arg("--no-continue") // Or else fails when file already exists, even an empty one
                    .args(["-f", LOWEST_QUALITY_FORMAT])
                    .args([OsStr::new("-o"), OsStr::new(&template)])
                    .arg("--")
                    .arg(url)
            },
            Capture::empty(),
            self.timeouts.download,
            proxy,
        )?;

        Ok(())
    }
}

static HTTP_ERROR_RE: OnceLock<Regex> = OnceLock::new();

fn http_error_re() -> &'static Regex {
    HTTP_ERROR_RE.get_or_init(|| Regex::new(r"HTTP Error (?P<code>[1-5][0-9]{2})").unwrap())
}

fn host_failure(err: CommandError) -> HostFailure {
    match err {
        CommandError::Timeout { .. } => HostFailure::TimedOut,
        CommandError::Failed { stderr, .. } => parse_stderr(&stderr),
        err => HostFailure::Message(err.to_string()),
    }
}

/// Extract the error lines of a `yt-dlp` run, and its HTTP status if it printed one.
pub(crate) fn parse_stderr(stderr: &str) -> HostFailure {
    let error_lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("ERROR:"))
        .collect();
    let message = if error_lines.is_empty() {
        stderr.trim().to_owned()
    } else {
        error_lines.join("\n")
    };

    let code = http_error_re()
        .captures(&message)
        .and_then(|cap| cap.name("code"))
        .and_then(|code| code.as_str().parse().ok());

    match code {
        Some(code) => HostFailure::Status { code, message },
        None => HostFailure::Message(message),
    }
}
