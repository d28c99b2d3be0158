use clap::ValueEnum;
use serde::Deserialize;

/// Where the insert clip goes in the combined video.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EditRule {
    /// Keep the first tenth of the main video, then play the insert clip
    #[default]
    LeadIn,
    /// Play the insert clip halfway through the main video
    Middle,
}
