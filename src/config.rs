//! Layered settings: built-in defaults, an optional TOML file, then
//! `SPLICETUBE_*` environment variables. Command line flags are applied
//! on top by [`crate::cli::Args::apply_to`].

use std::{
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use config::{
    builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File, FileFormat,
};
use miette::{bail, miette, Context, IntoDiagnostic, Result};
use serde::Deserialize;
use tracing::Level;

use crate::{
    outside::YtdlTimeouts,
    proxy::ProxyEndpoint,
    splicer::EncodeSettings,
    types::{Bitrate, EditRule, VideoUrl},
};

/// Prefix of the environment variables read as settings
pub const ENV_PREFIX: &str = "SPLICETUBE";

/// `max_video_length` value disabling the duration check
pub const UNLIMITED_LENGTH: i64 = -1;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    /// Longest accepted video in seconds, `-1` for no limit
    pub max_video_length: i64,
    /// The promotional clip spliced into every video
    pub insert_clip: PathBuf,
    /// Where downloads and combined videos are written
    pub video_folder: PathBuf,
    pub bitrate: Bitrate,
    pub audio_bitrate: Bitrate,
    pub frame_rate: u32,
    pub edit_rule: EditRule,
    /// Proxy candidates, tried in order
    pub proxy_conns: Vec<String>,
    /// A video known to be available, used to check proxies
    pub reference_video_url: String,
    /// Service answering with the caller's public IP address
    pub ip_echo_url: String,
    pub probe_timeout_secs: u64,
    pub probe_workers: usize,
    pub metadata_timeout_secs: u64,
    pub download_timeout_secs: u64,
    pub encode_timeout_secs: u64,
    pub socket_timeout_secs: u64,
    #[serde(default)]
    pub read_rate: Option<f64>,
    #[serde(default)]
    pub workers: Option<usize>,
    pub log_level: String,
}

impl Settings {
    /// Read the settings from the defaults, the file and the process environment.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        Self::load_from(file, environment())
    }

    fn load_from(file: Option<&Path>, env: Environment) -> Result<Self> {
        let mut builder = defaults()
            .into_diagnostic()
            .wrap_err("Invalid default settings")?;

        if let Some(file) = file {
            builder = builder.add_source(File::from(file).format(FileFormat::Toml).required(true));
        }

        let settings: Settings = builder
            .add_source(env)
            .build()
            .into_diagnostic()
            .wrap_err("Could not read the settings")?
            .try_deserialize()
            .into_diagnostic()
            .wrap_err("Invalid settings")?;

        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_video_length < UNLIMITED_LENGTH {
            bail!(
                "max_video_length must be positive or {UNLIMITED_LENGTH}, got {}",
                self.max_video_length
            );
        }
        if self.frame_rate == 0 {
            bail!("frame_rate must be positive");
        }
        if self.workers == Some(0) || self.probe_workers == 0 {
            bail!("The number of workers must be positive");
        }
        for (name, secs) in [
            ("probe_timeout_secs", self.probe_timeout_secs),
            ("metadata_timeout_secs", self.metadata_timeout_secs),
            ("download_timeout_secs", self.download_timeout_secs),
            ("encode_timeout_secs", self.encode_timeout_secs),
            ("socket_timeout_secs", self.socket_timeout_secs),
        ] {
            if secs == 0 {
                bail!("{name} must be positive");
            }
        }
        if let Some(rate) = self.read_rate {
            if !(rate.is_finite() && rate > 0.0) {
                bail!("read_rate must be a positive number, got {rate}");
            }
        }
        for candidate in self.proxy_conns.iter().filter(|c| !c.trim().is_empty()) {
            ProxyEndpoint::from_candidate(candidate.trim())
                .map_err(|_| miette!("Malformed proxy in proxy_conns: {candidate:?}"))?;
        }
        VideoUrl::parse(&self.reference_video_url)
            .map_err(|_| miette!("reference_video_url is not a video URL"))?;
        self.log_level()?;
        Ok(())
    }

    /// `None` when the duration is not limited.
    pub fn max_duration(&self) -> Option<u64> {
        u64::try_from(self.max_video_length).ok()
    }

    /// Request workers, defaulting to the available parallelism.
    pub fn workers(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            thread::available_parallelism().map_or(1, |n| n.get())
        })
    }

    pub fn log_level(&self) -> Result<Level> {
        self.log_level
            .parse()
            .map_err(|_| miette!("Unknown log level {:?}", self.log_level))
    }

    pub fn encode_settings(&self) -> EncodeSettings {
        EncodeSettings {
            bitrate: self.bitrate,
            audio_bitrate: self.audio_bitrate,
            frame_rate: self.frame_rate,
            read_rate: self.read_rate,
        }
    }

    pub fn ytdl_timeouts(&self) -> YtdlTimeouts {
        YtdlTimeouts {
            metadata: Duration::from_secs(self.metadata_timeout_secs),
            download: Duration::from_secs(self.download_timeout_secs),
            socket: Duration::from_secs(self.socket_timeout_secs),
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn encode_timeout(&self) -> Duration {
        Duration::from_secs(self.encode_timeout_secs)
    }
}

fn defaults() -> std::result::Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("max_video_length", 300)?
        .set_default("insert_clip", "walterfrosch.mp4")?
        .set_default("video_folder", "videos")?
        .set_default("bitrate", "5000k")?
        .set_default("audio_bitrate", "192k")?
        .set_default("frame_rate", 30)?
        .set_default("edit_rule", "lead-in")?
        .set_default("proxy_conns", Vec::<String>::new())?
        .set_default(
            "reference_video_url",
            "https://www.youtube.com/watch?v=tPEE9ZwTmy0",
        )?
        .set_default("ip_echo_url", "https://ipconfig.io")?
        .set_default("probe_timeout_secs", 10)?
        .set_default("probe_workers", 4)?
        .set_default("metadata_timeout_secs", 60)?
        .set_default("download_timeout_secs", 600)?
        .set_default("encode_timeout_secs", 900)?
        .set_default("socket_timeout_secs", 20)?
        .set_default("log_level", "info")
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("proxy_conns")
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, fs};

    use indoc::indoc;

    use super::*;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        environment().source(Some(vars))
    }

    #[test]
    fn defaults_are_usable() {
        let settings = Settings::load_from(None, env(&[])).unwrap();
        assert_eq!(settings.max_duration(), Some(300));
        assert_eq!(settings.insert_clip, PathBuf::from("walterfrosch.mp4"));
        assert_eq!(settings.video_folder, PathBuf::from("videos"));
        assert_eq!(settings.bitrate, Bitrate::from_kbps(5000));
        assert_eq!(settings.audio_bitrate, Bitrate::from_kbps(192));
        assert_eq!(settings.edit_rule, EditRule::LeadIn);
        assert!(settings.proxy_conns.is_empty());
        assert_eq!(settings.read_rate, None);
        assert!(settings.workers() >= 1);
        assert_eq!(settings.log_level().unwrap(), Level::INFO);
    }

    #[test]
    fn environment_overrides_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("splicetube.toml");
        fs::write(
            &file,
            indoc! {r#"
                max_video_length = 120
                bitrate = "2M"
                edit_rule = "middle"
                workers = 2
            "#},
        )
        .unwrap();

        let settings = Settings::load_from(
            Some(&file),
            env(&[
                ("SPLICETUBE_MAX_VIDEO_LENGTH", "-1"),
                ("SPLICETUBE_PROXY_CONNS", "10.0.0.1:3128,socks5://10.0.0.2:1080"),
            ]),
        )
        .unwrap();

        assert_eq!(settings.max_duration(), None);
        assert_eq!(settings.bitrate, Bitrate::from_kbps(2000));
        assert_eq!(settings.edit_rule, EditRule::Middle);
        assert_eq!(settings.workers(), 2);
        assert_eq!(
            settings.proxy_conns,
            ["10.0.0.1:3128", "socks5://10.0.0.2:1080"]
        );
    }

    #[test]
    fn invalid_values_fail_at_load() {
        for vars in [
            [("SPLICETUBE_MAX_VIDEO_LENGTH", "-2")],
            [("SPLICETUBE_BITRATE", "fast")],
            [("SPLICETUBE_WORKERS", "0")],
            [("SPLICETUBE_PROXY_CONNS", "ftp://nope")],
            [("SPLICETUBE_LOG_LEVEL", "loud")],
            [("SPLICETUBE_ENCODE_TIMEOUT_SECS", "0")],
        ] {
            assert!(Settings::load_from(None, env(&vars)).is_err(), "{vars:?}");
        }
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("missing.toml");
        assert!(Settings::load_from(Some(&file), env(&[])).is_err());
    }
}
