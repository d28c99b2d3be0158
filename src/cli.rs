use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::{config::Settings, types::EditRule};

macro_rules! arg_env {
    ($v:literal) => {
        concat!("SPLICETUBE_", $v)
    };
}

/// Download web videos, splice a promotional clip into them,
/// and re-encode the result ready to be served.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Args {
    /// A TOML file with the settings.
    /// Environment variables and command line flags take precedence over it
    #[arg(long, global = true, env = arg_env!("CONFIG"))]
    pub config: Option<PathBuf>,

    /// The most verbose level of the logs to print
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// The path to the output directory
    #[arg(long, global = true)]
    pub out: Option<PathBuf>,

    /// The path to the clip spliced into every video
    #[arg(long, global = true)]
    pub insert: Option<PathBuf>,

    /// The longest accepted video, in seconds. `-1` accepts any length
    #[arg(long, global = true, allow_hyphen_values = true)]
    pub max_duration: Option<i64>,

    /// Where the clip goes in the video
    #[arg(long, global = true, value_enum)]
    pub edit_rule: Option<EditRule>,

    /// The number of videos processed at the same time
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Process every URL and print one JSON line per URL, in the same order
    Process {
        /// The video URLs
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Select a proxy among the configured candidates and print it
    ProbeProxies,
}

impl Args {
    /// Override the settings with the flags given on the command line.
    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(level) = &self.log_level {
            settings.log_level.clone_from(level);
        }
        if let Some(out) = &self.out {
            settings.video_folder.clone_from(out);
        }
        if let Some(insert) = &self.insert {
            settings.insert_clip.clone_from(insert);
        }
        if let Some(max_duration) = self.max_duration {
            settings.max_video_length = max_duration;
        }
        if let Some(rule) = self.edit_rule {
            settings.edit_rule = rule;
        }
        if let Some(workers) = self.workers {
            settings.workers = Some(workers);
        }
    }
}
